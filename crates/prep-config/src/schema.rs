//! Schema/defaults loader
//!
//! The defaults document is the schema: every leaf it contains is a
//! recognized field, the type of each field is inferred from its default
//! value, and nothing outside that set may be referenced by later tiers.
//! Constraints and help text are attached afterwards by the application.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use crate::error::{ConfigError, UnknownField};
use crate::node::{ConfigNode, Scalar, ScalarKind};
use crate::path::FieldPath;
use crate::source::{ConfigSource, Tier};

/// Declared type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Scalar(ScalarKind),
    List(ScalarKind),
}

impl FieldType {
    /// Infer the type of a default value
    ///
    /// Lists mixing integers and floats are float lists; an empty list is a
    /// list of strings.
    pub fn infer(node: &ConfigNode) -> Result<Self, String> {
        match node {
            ConfigNode::Scalar(s) => Ok(FieldType::Scalar(s.kind())),
            ConfigNode::List(items) => {
                let mut kind: Option<ScalarKind> = None;
                for item in items {
                    kind = Some(match (kind, item.kind()) {
                        (None, k) => k,
                        (Some(a), b) if a == b => a,
                        (Some(ScalarKind::Int), ScalarKind::Float)
                        | (Some(ScalarKind::Float), ScalarKind::Int) => ScalarKind::Float,
                        (Some(a), b) => {
                            return Err(format!("list mixes {} and {} values", a, b));
                        }
                    });
                }
                Ok(FieldType::List(kind.unwrap_or(ScalarKind::Str)))
            }
            ConfigNode::Map(_) => Err("a mapping is not a field value".to_string()),
        }
    }

    pub fn element_kind(&self) -> ScalarKind {
        match self {
            FieldType::Scalar(k) | FieldType::List(k) => *k,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, FieldType::List(_))
    }

    /// Whether `node` has this type; integers are accepted for floats
    pub fn matches(&self, node: &ConfigNode) -> bool {
        match (self, node) {
            (FieldType::Scalar(kind), ConfigNode::Scalar(s)) => kind_accepts(*kind, s),
            (FieldType::List(kind), ConfigNode::List(items)) => {
                items.iter().all(|s| kind_accepts(*kind, s))
            }
            _ => false,
        }
    }

    /// Widen integers to floats where the field is float-typed
    pub fn coerce(&self, node: ConfigNode) -> ConfigNode {
        if self.element_kind() != ScalarKind::Float {
            return node;
        }
        match node {
            ConfigNode::Scalar(s) => ConfigNode::Scalar(widen(s)),
            ConfigNode::List(items) => ConfigNode::List(items.into_iter().map(widen).collect()),
            other => other,
        }
    }
}

fn kind_accepts(kind: ScalarKind, scalar: &Scalar) -> bool {
    scalar.kind() == kind || (kind == ScalarKind::Float && scalar.kind() == ScalarKind::Int)
}

fn widen(scalar: Scalar) -> Scalar {
    match scalar {
        Scalar::Int(i) => Scalar::Float(i as f64),
        other => other,
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Scalar(k) => write!(f, "{}", k),
            FieldType::List(k) => write!(f, "list of {}", k),
        }
    }
}

/// A validation rule attached to a field
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// String value (or every list element) must be one of the given values
    OneOf(Vec<String>),
    /// Numeric value (or every list element) must be >= 0
    NonNegative,
    /// Numeric value (or every list element) must be > 0
    Positive,
    /// String value (or every list element) must be a well-formed path
    PathLike,
    /// String value must be usable as a bare file name stem
    FileStem,
    /// List must have the same length as the list at the given path
    SameLength(FieldPath),
}

impl Constraint {
    fn applies_to(&self, ty: FieldType) -> bool {
        match self {
            Constraint::OneOf(_) | Constraint::PathLike => ty.element_kind() == ScalarKind::Str,
            Constraint::FileStem => ty == FieldType::Scalar(ScalarKind::Str),
            Constraint::NonNegative | Constraint::Positive => matches!(
                ty.element_kind(),
                ScalarKind::Int | ScalarKind::Float
            ),
            Constraint::SameLength(_) => ty.is_list(),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::OneOf(allowed) => write!(f, "one of [{}]", allowed.join(", ")),
            Constraint::NonNegative => f.write_str(">= 0"),
            Constraint::Positive => f.write_str("> 0"),
            Constraint::PathLike => f.write_str("path"),
            Constraint::FileStem => f.write_str("file name stem"),
            Constraint::SameLength(other) => write!(f, "same length as {}", other),
        }
    }
}

/// A recognized configuration field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub path: FieldPath,
    pub ty: FieldType,
    pub default: ConfigNode,
    pub help: Option<String>,
    pub constraints: Vec<Constraint>,
}

/// The closed set of recognized fields, established by a defaults document
#[derive(Debug, Clone)]
pub struct Schema {
    fields: BTreeMap<FieldPath, FieldSpec>,
    defaults: ConfigNode,
    source: ConfigSource,
}

impl Schema {
    /// Load the defaults document at `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let origin = path.display().to_string();
        let bytes = fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ConfigError::schema(&origin, "file not found"),
            _ => ConfigError::schema(&origin, e),
        })?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|e| ConfigError::schema(&origin, format!("invalid UTF-8: {}", e)))?;
        let source = ConfigSource::file(Tier::Default, path, &bytes);
        Self::parse(text, origin, source)
    }

    /// Parse a defaults document held in memory (e.g. embedded in the binary)
    pub fn from_yaml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let source = ConfigSource::embedded(Tier::Default, text.as_bytes());
        Self::parse(text, origin.to_string(), source)
    }

    fn parse(text: &str, origin: String, source: ConfigSource) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Err(ConfigError::schema(origin, "document is empty"));
        }
        let value: serde_yaml::Value = serde_yaml::from_str(text)
            .map_err(|e| ConfigError::schema(&origin, format!("YAML parse error: {}", e)))?;
        let node = ConfigNode::from_yaml_strict(value).map_err(|e| ConfigError::schema(&origin, e))?;
        Self::from_node(node, &origin, source)
    }

    /// Build a schema from an already-parsed defaults tree
    pub fn from_node(
        defaults: ConfigNode,
        origin: &str,
        source: ConfigSource,
    ) -> Result<Self, ConfigError> {
        if defaults.as_map().is_none() {
            return Err(ConfigError::schema(origin, "top level must be a mapping"));
        }
        if let Some(branch) = defaults.empty_branches().first() {
            return Err(ConfigError::schema(
                origin,
                format!("'{}' is an empty mapping and declares no fields", branch),
            ));
        }

        let mut fields = BTreeMap::new();
        let mut flags: BTreeMap<String, FieldPath> = BTreeMap::new();
        for (path, value) in defaults.leaves() {
            let ty = FieldType::infer(value)
                .map_err(|reason| ConfigError::schema(origin, format!("'{}': {}", path, reason)))?;

            if let Some(previous) = flags.insert(path.flag_name(), path.clone()) {
                return Err(ConfigError::schema(
                    origin,
                    format!(
                        "'{}' and '{}' map to the same flag --{}",
                        previous,
                        path,
                        path.flag_name()
                    ),
                ));
            }

            fields.insert(
                path.clone(),
                FieldSpec {
                    path,
                    ty,
                    default: value.clone(),
                    help: None,
                    constraints: Vec::new(),
                },
            );
        }

        if fields.is_empty() {
            return Err(ConfigError::schema(origin, "document declares no fields"));
        }

        debug!("Schema loaded from {}: {} field(s)", origin, fields.len());
        Ok(Self {
            fields,
            defaults,
            source,
        })
    }

    /// Attach a constraint to a declared field
    pub fn constrain(mut self, path: &str, constraint: Constraint) -> Result<Self, ConfigError> {
        let origin = self.origin();
        let field_path = self.resolve_path(path)?;

        if let Constraint::SameLength(other) = &constraint {
            let other_spec = self.fields.get(other).ok_or_else(|| {
                ConfigError::schema(
                    &origin,
                    format!("constraint on '{}' references undeclared field '{}'", path, other),
                )
            })?;
            if !other_spec.ty.is_list() {
                return Err(ConfigError::schema(
                    &origin,
                    format!("'{}' is not a list and cannot be length-matched", other),
                ));
            }
        }

        let spec = self
            .fields
            .get_mut(&field_path)
            .ok_or_else(|| ConfigError::schema(&origin, format!("'{}' is not declared", path)))?;
        if !constraint.applies_to(spec.ty) {
            return Err(ConfigError::schema(
                origin,
                format!("constraint '{}' does not apply to {} field '{}'", constraint, spec.ty, path),
            ));
        }
        spec.constraints.push(constraint);
        Ok(self)
    }

    /// Attach help text to a declared field
    pub fn describe(mut self, path: &str, help: &str) -> Result<Self, ConfigError> {
        let origin = self.origin();
        let field_path = self.resolve_path(path)?;
        let spec = self
            .fields
            .get_mut(&field_path)
            .ok_or_else(|| ConfigError::schema(&origin, format!("'{}' is not declared", path)))?;
        spec.help = Some(help.to_string());
        Ok(self)
    }

    fn resolve_path(&self, path: &str) -> Result<FieldPath, ConfigError> {
        let field_path =
            FieldPath::parse(path).map_err(|e| ConfigError::schema(self.origin(), e))?;
        if !self.fields.contains_key(&field_path) {
            return Err(ConfigError::schema(
                self.origin(),
                format!("'{}' is not declared", path),
            ));
        }
        Ok(field_path)
    }

    fn origin(&self) -> String {
        match &self.source.path {
            Some(path) => path.display().to_string(),
            None => "(built-in)".to_string(),
        }
    }

    pub fn field(&self, path: &FieldPath) -> Option<&FieldSpec> {
        self.fields.get(path)
    }

    /// All fields in path order
    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The defaults document as loaded
    pub fn defaults(&self) -> &ConfigNode {
        &self.defaults
    }

    pub fn source(&self) -> &ConfigSource {
        &self.source
    }

    /// Leaf paths of `node` that are not declared fields
    ///
    /// A value placed where the schema has a mapping (or a mapping placed
    /// where the schema has a value) surfaces as an unknown path too, since
    /// no declared field lives at that address.
    pub fn unknown_fields(&self, node: &ConfigNode, tier: Tier) -> Vec<UnknownField> {
        node.leaves()
            .into_iter()
            .filter(|(path, _)| !self.fields.contains_key(path))
            .map(|(path, _)| UnknownField { tier, path })
            .collect()
    }

    /// Fail with `UnknownField` if `node` references undeclared fields
    pub fn reject_unknown(&self, node: &ConfigNode, tier: Tier) -> Result<(), ConfigError> {
        let fields = self.unknown_fields(node, tier);
        if fields.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::UnknownField { fields })
        }
    }
}
