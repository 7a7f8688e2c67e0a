//! Dotted field paths
//!
//! A `FieldPath` is the single canonical address of a configuration field.
//! The dotted form (`ions.salts.names`) is used in documents, logs and error
//! messages; the flag form (`ions-salts-names`) is used on the command line.

use std::fmt;
use std::str::FromStr;

/// Separator between segments in the dotted form
pub const SEPARATOR: char = '.';

/// Separator between segments in the flag form
pub const FLAG_SEPARATOR: char = '-';

/// Errors from parsing a dotted path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("field path is empty")]
    Empty,

    #[error("field path '{0}' contains an empty segment")]
    EmptySegment(String),
}

/// Address of a node inside a configuration tree
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// The empty path, addressing the document root
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a dotted path such as `box.size`
    pub fn parse(dotted: &str) -> Result<Self, PathError> {
        if dotted.is_empty() {
            return Err(PathError::Empty);
        }
        let segments: Vec<String> = dotted.split(SEPARATOR).map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(PathError::EmptySegment(dotted.to_string()));
        }
        Ok(Self(segments))
    }

    /// Path of a direct child of this node
    pub fn child(&self, key: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(key.to_string());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Last segment, if any
    pub fn leaf_key(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Path with the last segment removed
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Dotted form, e.g. `ions.salts.names`
    pub fn dotted(&self) -> String {
        self.0.join(&SEPARATOR.to_string())
    }

    /// Command-line form without the leading dashes, e.g. `ions-salts-names`
    ///
    /// Only `.` is rewritten; underscores inside a key are kept as-is.
    pub fn flag_name(&self) -> String {
        self.0.join(&FLAG_SEPARATOR.to_string())
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dotted())
    }
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
