//! Configuration-stage error taxonomy

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::path::FieldPath;
use crate::source::Tier;
use crate::validate::Violation;

/// A field referenced by a document or flag that the schema does not declare
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownField {
    pub tier: Tier,
    pub path: FieldPath,
}

impl fmt::Display for UnknownField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' (from {})", self.path, self.tier)
    }
}

/// Errors raised while loading, resolving, validating or persisting configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot load defaults document {origin}: {reason}")]
    SchemaLoad { origin: String, reason: String },

    #[error("cannot load override document {}: {reason}", .path.display())]
    OverrideLoad { path: PathBuf, reason: String },

    #[error("unknown configuration field(s): {}", join(.fields))]
    UnknownField { fields: Vec<UnknownField> },

    #[error("configuration has {} violation(s):\n{}", .violations.len(), lines(.violations))]
    Validation { violations: Vec<Violation> },

    #[error("cannot write configuration to {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot serialize configuration: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

impl ConfigError {
    pub(crate) fn schema(origin: impl Into<String>, reason: impl fmt::Display) -> Self {
        ConfigError::SchemaLoad {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn override_load(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        ConfigError::OverrideLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Paths named by the error, for callers that want to highlight them
    pub fn field_paths(&self) -> Vec<&FieldPath> {
        match self {
            ConfigError::UnknownField { fields } => fields.iter().map(|f| &f.path).collect(),
            ConfigError::Validation { violations } => {
                violations.iter().flat_map(|v| v.paths.iter()).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn join(fields: &[UnknownField]) -> String {
    fields
        .iter()
        .map(UnknownField::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn lines(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("  - {}", v))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_field_message_names_path_and_tier() {
        let err = ConfigError::UnknownField {
            fields: vec![UnknownField {
                tier: Tier::Override,
                path: FieldPath::parse("boxx.size").unwrap(),
            }],
        };
        let msg = err.to_string();
        assert!(msg.contains("boxx.size"));
        assert!(msg.contains("override document"));
    }

    #[test]
    fn test_validation_message_lists_every_violation() {
        let err = ConfigError::Validation {
            violations: vec![
                Violation::new(FieldPath::parse("box.type").unwrap(), "must be one of [cuboid]"),
                Violation::new(FieldPath::parse("box.size").unwrap(), "must be > 0"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 violation(s)"));
        assert!(msg.contains("box.type"));
        assert!(msg.contains("box.size"));
        assert_eq!(err.field_paths().len(), 2);
    }
}
