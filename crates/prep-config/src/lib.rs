//! Closed-schema configuration resolution
//!
//! A defaults document establishes the set of recognized fields and their
//! types. An optional override document and command-line values are merged
//! on top of it (defaults < override < command line), the result is checked
//! against the schema, and the resolved tree can be written back as YAML.

pub mod error;
pub mod merge;
pub mod node;
pub mod path;
pub mod persist;
pub mod schema;
pub mod source;
pub mod validate;

pub use error::{ConfigError, UnknownField};
pub use merge::{deep_merge, merge_layers, resolve, ResolvedConfig};
pub use node::{ConfigNode, NodeError, Scalar, ScalarKind};
pub use path::{FieldPath, PathError};
pub use persist::{to_yaml_string, write_document, write_new_document, OverrideDocument};
pub use schema::{Constraint, FieldSpec, FieldType, Schema};
pub use source::{digest_bytes, ConfigSource, Tier};
pub use validate::{validate, violations, Violation};
