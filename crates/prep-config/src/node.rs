//! Tagged configuration tree
//!
//! `ConfigNode` is the in-memory form of every configuration document:
//! a nested mapping whose leaves are scalars or flat lists of scalars.
//! Conversion from YAML is explicit so that unsupported shapes (nested
//! lists, mappings inside lists, non-string keys, tags) are rejected with the
//! path where they occur instead of being carried through the merge.

use std::collections::BTreeMap;
use std::fmt;

use serde_yaml::{Mapping, Number, Value};

use crate::path::{FieldPath, SEPARATOR};

/// Kind of a scalar value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    Str,
}

impl ScalarKind {
    pub fn name(&self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int => "integer",
            ScalarKind::Float => "float",
            ScalarKind::Str => "string",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single scalar value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Scalar::Bool(_) => ScalarKind::Bool,
            Scalar::Int(_) => ScalarKind::Int,
            Scalar::Float(_) => ScalarKind::Float,
            Scalar::Str(_) => ScalarKind::Str,
        }
    }

    /// Numeric value of an integer or float scalar
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    fn to_yaml(&self) -> Value {
        match self {
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::Number(Number::from(*i)),
            Scalar::Float(f) => Value::Number(Number::from(*f)),
            Scalar::Str(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{:?}", x),
            Scalar::Str(s) => f.write_str(s),
        }
    }
}

/// Errors from building or editing a configuration tree
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NodeError {
    #[error("'{path}': mapping keys must be strings")]
    NonStringKey { path: FieldPath },

    #[error("'{path}': key '{key}' must not be empty or contain '{sep}'", sep = SEPARATOR)]
    InvalidKey { path: FieldPath, key: String },

    #[error("'{path}': value is null")]
    Null { path: FieldPath },

    #[error("'{path}': lists may only contain scalars")]
    NestedInList { path: FieldPath },

    #[error("'{path}': tagged values are not supported")]
    Tagged { path: FieldPath },

    #[error("'{path}': number {value} is out of range")]
    NumberOutOfRange { path: FieldPath, value: String },

    #[error("'{path}': cannot descend into a {found} value")]
    NotAMapping { path: FieldPath, found: &'static str },
}

/// A configuration tree or subtree
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigNode {
    Scalar(Scalar),
    List(Vec<Scalar>),
    Map(BTreeMap<String, ConfigNode>),
}

impl Default for ConfigNode {
    fn default() -> Self {
        ConfigNode::empty()
    }
}

impl ConfigNode {
    /// An empty mapping
    pub fn empty() -> Self {
        ConfigNode::Map(BTreeMap::new())
    }

    /// Convert a YAML value, treating null mapping entries as absent
    ///
    /// This is the reading used for partial documents, where `key: ~`
    /// means "not set here". A null document is an empty mapping.
    pub fn from_yaml(value: Value) -> Result<Self, NodeError> {
        Ok(Self::convert(value, &FieldPath::root(), false)?.unwrap_or_else(Self::empty))
    }

    /// Convert a YAML value, rejecting nulls anywhere in the tree
    pub fn from_yaml_strict(value: Value) -> Result<Self, NodeError> {
        Self::convert(value, &FieldPath::root(), true)?.ok_or(NodeError::Null {
            path: FieldPath::root(),
        })
    }

    fn convert(value: Value, path: &FieldPath, strict: bool) -> Result<Option<Self>, NodeError> {
        match value {
            Value::Null => {
                if strict {
                    Err(NodeError::Null { path: path.clone() })
                } else {
                    Ok(None)
                }
            }
            Value::Sequence(items) => {
                let mut scalars = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    let item_path = path.child(&index.to_string());
                    match Self::convert_scalar(item, &item_path)? {
                        Some(scalar) => scalars.push(scalar),
                        None => return Err(NodeError::NestedInList { path: path.clone() }),
                    }
                }
                Ok(Some(ConfigNode::List(scalars)))
            }
            Value::Mapping(mapping) => {
                let mut map = BTreeMap::new();
                for (key, child) in mapping {
                    let key = match key {
                        Value::String(s) => s,
                        _ => return Err(NodeError::NonStringKey { path: path.clone() }),
                    };
                    if key.is_empty() || key.contains(SEPARATOR) {
                        return Err(NodeError::InvalidKey {
                            path: path.clone(),
                            key,
                        });
                    }
                    let child_path = path.child(&key);
                    if let Some(node) = Self::convert(child, &child_path, strict)? {
                        map.insert(key, node);
                    }
                }
                Ok(Some(ConfigNode::Map(map)))
            }
            Value::Tagged(_) => Err(NodeError::Tagged { path: path.clone() }),
            scalar => Ok(Self::convert_scalar(scalar, path)?.map(ConfigNode::Scalar)),
        }
    }

    /// Convert a scalar YAML value; `None` means the value is not a scalar
    fn convert_scalar(value: Value, path: &FieldPath) -> Result<Option<Scalar>, NodeError> {
        match value {
            Value::Bool(b) => Ok(Some(Scalar::Bool(b))),
            Value::String(s) => Ok(Some(Scalar::Str(s))),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Some(Scalar::Int(i)))
                } else if n.is_f64() {
                    match n.as_f64() {
                        Some(f) => Ok(Some(Scalar::Float(f))),
                        None => Err(NodeError::NumberOutOfRange {
                            path: path.clone(),
                            value: n.to_string(),
                        }),
                    }
                } else {
                    Err(NodeError::NumberOutOfRange {
                        path: path.clone(),
                        value: n.to_string(),
                    })
                }
            }
            Value::Tagged(_) => Err(NodeError::Tagged { path: path.clone() }),
            Value::Null => Err(NodeError::Null { path: path.clone() }),
            Value::Sequence(_) | Value::Mapping(_) => Ok(None),
        }
    }

    /// Convert back to a YAML value
    pub fn to_yaml(&self) -> Value {
        match self {
            ConfigNode::Scalar(s) => s.to_yaml(),
            ConfigNode::List(items) => Value::Sequence(items.iter().map(Scalar::to_yaml).collect()),
            ConfigNode::Map(map) => {
                let mut mapping = Mapping::new();
                for (key, child) in map {
                    mapping.insert(Value::String(key.clone()), child.to_yaml());
                }
                Value::Mapping(mapping)
            }
        }
    }

    /// Short name of the node's shape, used in messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            ConfigNode::Scalar(s) => s.kind().name(),
            ConfigNode::List(_) => "list",
            ConfigNode::Map(_) => "mapping",
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, ConfigNode>> {
        match self {
            ConfigNode::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            ConfigNode::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Scalar]> {
        match self {
            ConfigNode::List(items) => Some(items),
            _ => None,
        }
    }

    /// True for a mapping with no entries
    pub fn is_empty(&self) -> bool {
        matches!(self, ConfigNode::Map(map) if map.is_empty())
    }

    /// Look up the node at `path`
    pub fn get(&self, path: &FieldPath) -> Option<&ConfigNode> {
        let mut current = self;
        for segment in path.segments() {
            current = current.as_map()?.get(segment)?;
        }
        Some(current)
    }

    /// Place `node` at `path`, creating intermediate mappings as needed
    pub fn set(&mut self, path: &FieldPath, node: ConfigNode) -> Result<(), NodeError> {
        if path.is_root() {
            *self = node;
            return Ok(());
        }
        Self::set_in(self, path.segments(), FieldPath::root(), node)
    }

    fn set_in(
        target: &mut ConfigNode,
        segments: &[String],
        walked: FieldPath,
        node: ConfigNode,
    ) -> Result<(), NodeError> {
        let found = target.kind_name();
        let ConfigNode::Map(map) = target else {
            return Err(NodeError::NotAMapping { path: walked, found });
        };
        match segments {
            [last] => {
                map.insert(last.clone(), node);
                Ok(())
            }
            [head, rest @ ..] => {
                let child = map.entry(head.clone()).or_insert_with(ConfigNode::empty);
                Self::set_in(child, rest, walked.child(head), node)
            }
            [] => Ok(()),
        }
    }

    /// Every non-mapping node with its path, in path order
    pub fn leaves(&self) -> Vec<(FieldPath, &ConfigNode)> {
        let mut out = Vec::new();
        self.collect_leaves(FieldPath::root(), &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, path: FieldPath, out: &mut Vec<(FieldPath, &'a ConfigNode)>) {
        match self {
            ConfigNode::Map(map) => {
                for (key, child) in map {
                    child.collect_leaves(path.child(key), out);
                }
            }
            leaf => out.push((path, leaf)),
        }
    }

    /// Paths of mappings that contain no entries (excluding the root)
    pub fn empty_branches(&self) -> Vec<FieldPath> {
        let mut out = Vec::new();
        self.collect_empty_branches(FieldPath::root(), &mut out);
        out
    }

    fn collect_empty_branches(&self, path: FieldPath, out: &mut Vec<FieldPath>) {
        if let ConfigNode::Map(map) = self {
            if map.is_empty() && !path.is_root() {
                out.push(path);
                return;
            }
            for (key, child) in map {
                child.collect_empty_branches(path.child(key), out);
            }
        }
    }
}

impl fmt::Display for ConfigNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigNode::Scalar(s) => write!(f, "{}", s),
            ConfigNode::List(items) => {
                let parts: Vec<String> = items.iter().map(Scalar::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            ConfigNode::Map(map) => write!(f, "{{{} entries}}", map.len()),
        }
    }
}
