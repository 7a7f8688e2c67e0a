//! Preparation configuration
//!
//! Three tiers, lowest precedence first:
//! 1. Defaults document (embedded, or `--defaults PATH`)
//! 2. Override document (`<work-dir>/config.yaml`, or `-c PATH`)
//! 3. Command-line flags

pub mod defaults;
mod effective;
mod settings;

pub use defaults::{builtin_schema, schema_from_file, DEFAULTS_YAML};
pub use effective::{EffectiveConfig, SCHEMA_ID, SCHEMA_VERSION};
pub use settings::{Ions, PeriodicBox, PrepSettings, Salts, Solutes, Solvent};

/// File name of the override document inside the working area
pub const OVERRIDE_FILE_NAME: &str = "config.yaml";

/// File name written by `--generate-yaml-template`
pub const TEMPLATE_FILE_NAME: &str = "sample_config.yaml";
