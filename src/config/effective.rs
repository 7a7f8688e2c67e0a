//! Effective configuration with full provenance
//!
//! The effective config captures the resolved and validated tree plus
//! information about where each value came from.

use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use prep_config::{
    resolve, to_yaml_string, validate, write_document, ConfigError, ConfigNode, ConfigSource,
    FieldPath, OverrideDocument, ResolvedConfig, Schema, Tier, Violation,
};
use tracing::{debug, info};

use super::settings::PrepSettings;

/// Schema version for effective_config
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "tinker-prep/effective_config@1";

/// Effective configuration with full provenance
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub schema_version: u32,
    pub schema_id: String,

    /// When this config was computed
    pub created_at: DateTime<Utc>,

    resolved: ResolvedConfig,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    /// Resolve and validate the three tiers
    ///
    /// Nothing is written; see [`EffectiveConfig::persist`].
    pub fn build(
        schema: &Schema,
        overrides: &OverrideDocument,
        cli: &ConfigNode,
    ) -> Result<Self, ConfigError> {
        let mut sources = vec![schema.source().clone()];
        if let Some(source) = &overrides.source {
            sources.push(source.clone());
        }
        if !cli.is_empty() {
            sources.push(ConfigSource::command_line());
        }
        for source in &sources {
            debug!("Config source: {}", source.describe());
        }

        let resolved = resolve(schema, &overrides.node, cli)?;
        validate(schema, resolved.tree())?;

        Ok(Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            resolved,
            sources,
        })
    }

    pub fn tree(&self) -> &ConfigNode {
        self.resolved.tree()
    }

    pub fn resolved(&self) -> &ResolvedConfig {
        &self.resolved
    }

    /// Typed settings view
    pub fn settings(&self) -> Result<PrepSettings, ConfigError> {
        self.resolved.deserialize().map_err(|e| ConfigError::Validation {
            violations: vec![Violation::new(
                FieldPath::root(),
                format!("configuration does not match the preparation settings: {}", e),
            )],
        })
    }

    /// Write the full resolved tree to `path`
    pub fn persist(&self, path: &Path) -> Result<(), ConfigError> {
        write_document(self.tree(), path)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Resolved document as YAML
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        to_yaml_string(self.tree())
    }

    /// One line per field: value and the tier that supplied it
    pub fn provenance_report(&self) -> String {
        let mut out = String::new();
        for (path, tier) in self.resolved.provenance() {
            let value = self
                .resolved
                .get(path)
                .map(ToString::to_string)
                .unwrap_or_default();
            let _ = writeln!(out, "{} = {}  [{}]", path, value, tier);
        }
        out
    }

    /// Fields whose final value did not come from the defaults document
    pub fn overridden(&self) -> Vec<(&FieldPath, Tier)> {
        self.resolved
            .provenance()
            .iter()
            .filter(|(_, tier)| **tier != Tier::Default)
            .map(|(path, tier)| (path, *tier))
            .collect()
    }
}
