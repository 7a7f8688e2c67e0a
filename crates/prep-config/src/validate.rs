//! Typed validation of a resolved configuration tree
//!
//! Validation collects every violation instead of stopping at the first one,
//! so a single run reports everything that needs fixing.

use std::fmt;

use crate::error::ConfigError;
use crate::node::{ConfigNode, Scalar};
use crate::path::FieldPath;
use crate::schema::{Constraint, FieldSpec, Schema};

/// One failed check
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    /// Offending field(s); cross-field checks name every participant
    pub paths: Vec<FieldPath>,
    pub reason: String,
}

impl Violation {
    pub fn new(path: FieldPath, reason: impl Into<String>) -> Self {
        Self {
            paths: vec![path],
            reason: reason.into(),
        }
    }

    pub fn across(paths: Vec<FieldPath>, reason: impl Into<String>) -> Self {
        Self {
            paths,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.paths.iter().map(FieldPath::dotted).collect();
        write!(f, "{}: {}", names.join(", "), self.reason)
    }
}

/// Check a fully resolved tree against the schema
pub fn validate(schema: &Schema, tree: &ConfigNode) -> Result<(), ConfigError> {
    let violations = violations(schema, tree);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation { violations })
    }
}

/// Every violation in `tree`, in field order
pub fn violations(schema: &Schema, tree: &ConfigNode) -> Vec<Violation> {
    let mut out = Vec::new();
    for spec in schema.fields() {
        let Some(value) = tree.get(&spec.path) else {
            out.push(Violation::new(spec.path.clone(), "no value resolved"));
            continue;
        };
        if !spec.ty.matches(value) {
            out.push(Violation::new(
                spec.path.clone(),
                format!("expected {}, found {}", spec.ty, describe(value)),
            ));
            continue;
        }
        for constraint in &spec.constraints {
            check(spec, constraint, value, tree, &mut out);
        }
    }
    out
}

fn describe(value: &ConfigNode) -> String {
    match value {
        ConfigNode::List(_) => format!("list {}", value),
        ConfigNode::Scalar(s) => format!("{} {}", s.kind(), value),
        ConfigNode::Map(_) => "mapping".to_string(),
    }
}

fn scalars(value: &ConfigNode) -> &[Scalar] {
    match value {
        ConfigNode::Scalar(s) => std::slice::from_ref(s),
        ConfigNode::List(items) => items,
        ConfigNode::Map(_) => &[],
    }
}

fn check(
    spec: &FieldSpec,
    constraint: &Constraint,
    value: &ConfigNode,
    tree: &ConfigNode,
    out: &mut Vec<Violation>,
) {
    let path = &spec.path;
    match constraint {
        Constraint::OneOf(allowed) => {
            for item in scalars(value) {
                let s = item.as_str().unwrap_or_default();
                if !allowed.iter().any(|a| a == s) {
                    out.push(Violation::new(
                        path.clone(),
                        format!("'{}' is not one of [{}]", s, allowed.join(", ")),
                    ));
                }
            }
        }
        Constraint::NonNegative => {
            for item in scalars(value) {
                if item.as_f64().is_some_and(|x| x < 0.0) {
                    out.push(Violation::new(
                        path.clone(),
                        format!("{} must not be negative", item),
                    ));
                }
            }
        }
        Constraint::Positive => {
            for item in scalars(value) {
                if item.as_f64().is_some_and(|x| x <= 0.0 || x.is_nan()) {
                    out.push(Violation::new(path.clone(), format!("{} must be > 0", item)));
                }
            }
        }
        Constraint::PathLike => {
            for item in scalars(value) {
                let s = item.as_str().unwrap_or_default();
                if s.is_empty() {
                    out.push(Violation::new(path.clone(), "path must not be empty"));
                } else if s.contains('\0') {
                    out.push(Violation::new(
                        path.clone(),
                        format!("path '{}' contains a NUL byte", s.escape_default()),
                    ));
                }
            }
        }
        Constraint::FileStem => {
            let s = scalars(value)
                .first()
                .and_then(Scalar::as_str)
                .unwrap_or_default();
            if s.is_empty() || s == "." || s == ".." || s.contains(['/', '\\', '\0']) {
                out.push(Violation::new(
                    path.clone(),
                    format!("'{}' is not a plain file name", s.escape_default()),
                ));
            }
        }
        Constraint::SameLength(other) => {
            let Some(other_items) = tree.get(other).and_then(ConfigNode::as_list) else {
                return;
            };
            let len = scalars(value).len();
            if len != other_items.len() {
                out.push(Violation::across(
                    vec![path.clone(), other.clone()],
                    format!(
                        "lengths differ ({} has {}, {} has {})",
                        path,
                        len,
                        other,
                        other_items.len()
                    ),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULTS: &str = "\
output_prefix: my_system
box:
  type: cuboid
  size: 64.0
ions:
  salts:
    names: [K+, Cl-]
    concentrations: [0.15, 0.15]
solutes:
  protein: []
";

    fn schema() -> Schema {
        Schema::from_yaml_str(DEFAULTS, "test")
            .unwrap()
            .constrain("output_prefix", Constraint::FileStem)
            .unwrap()
            .constrain("box.type", Constraint::OneOf(vec!["cuboid".into()]))
            .unwrap()
            .constrain("box.size", Constraint::Positive)
            .unwrap()
            .constrain("ions.salts.concentrations", Constraint::NonNegative)
            .unwrap()
            .constrain(
                "ions.salts.names",
                Constraint::SameLength(FieldPath::parse("ions.salts.concentrations").unwrap()),
            )
            .unwrap()
            .constrain("solutes.protein", Constraint::PathLike)
            .unwrap()
    }

    fn tree(src: &str) -> ConfigNode {
        ConfigNode::from_yaml(serde_yaml::from_str(src).unwrap()).unwrap()
    }

    fn with(src: &str) -> ConfigNode {
        let mut base = schema().defaults().clone();
        for (path, value) in tree(src).leaves() {
            base.set(&path, value.clone()).unwrap();
        }
        base
    }

    #[test]
    fn test_defaults_are_valid() {
        let schema = schema();
        assert!(validate(&schema, schema.defaults()).is_ok());
    }

    #[test]
    fn test_integer_accepted_for_float_field() {
        assert!(violations(&schema(), &with("box:\n  size: 70\n")).is_empty());
    }

    #[test]
    fn test_type_mismatch_reported_once() {
        let found = violations(&schema(), &with("box:\n  size: big\n"));
        assert_eq!(found.len(), 1);
        assert!(found[0].reason.contains("expected float"));
    }

    #[test]
    fn test_missing_value_reported() {
        let found = violations(&schema(), &tree("box:\n  type: cuboid\n"));
        assert!(found.iter().any(|v| v.paths[0].dotted() == "box.size"));
    }

    #[test]
    fn test_enumeration_and_range() {
        let found = violations(&schema(), &with("box:\n  type: sphere\n  size: -1.0\n"));
        assert_eq!(found.len(), 2);
        assert!(found[0].to_string().contains("box.size: -1.0 must be > 0"));
        assert!(found[1].to_string().contains("'sphere' is not one of [cuboid]"));
    }

    #[test]
    fn test_negative_concentration() {
        let found = violations(&schema(), &with("ions:\n  salts:\n    concentrations: [0.1, -0.2]\n"));
        assert_eq!(found.len(), 1);
        assert!(found[0].reason.contains("-0.2"));
    }

    #[test]
    fn test_parallel_lists_must_match_length() {
        let found = violations(&schema(), &with("ions:\n  salts:\n    names: [K+, Cl-, Mg+2]\n"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].paths.len(), 2);
        let msg = found[0].to_string();
        assert!(msg.contains("ions.salts.names"));
        assert!(msg.contains("ions.salts.concentrations"));
    }

    #[test]
    fn test_file_stem_rejects_separators() {
        for bad in ["out/run", "..", ""] {
            let src = format!("output_prefix: '{}'\n", bad);
            assert_eq!(violations(&schema(), &with(&src)).len(), 1, "{bad}");
        }
    }

    #[test]
    fn test_empty_path_rejected() {
        let found = violations(&schema(), &with("solutes:\n  protein: ['']\n"));
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_all_violations_collected() {
        let err = validate(
            &schema(),
            &with("box:\n  type: sphere\n  size: 0.0\noutput_prefix: a/b\n"),
        )
        .unwrap_err();
        match err {
            ConfigError::Validation { violations } => assert_eq!(violations.len(), 3),
            other => panic!("unexpected error: {other}"),
        }
    }
}
