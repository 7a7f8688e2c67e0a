//! Configuration tiers and source provenance

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One of the three configuration sources, in increasing precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Default,
    Override,
    Cli,
}

impl Tier {
    pub fn label(&self) -> &'static str {
        match self {
            Tier::Default => "defaults document",
            Tier::Override => "override document",
            Tier::Cli => "command line",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A contributing config source with provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSource {
    pub tier: Tier,

    /// File path (None for embedded documents and the command line)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// SHA-256 of the raw document bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl ConfigSource {
    pub fn file(tier: Tier, path: &Path, bytes: &[u8]) -> Self {
        Self {
            tier,
            path: Some(path.to_path_buf()),
            digest: Some(digest_bytes(bytes)),
        }
    }

    pub fn embedded(tier: Tier, bytes: &[u8]) -> Self {
        Self {
            tier,
            path: None,
            digest: Some(digest_bytes(bytes)),
        }
    }

    pub fn command_line() -> Self {
        Self {
            tier: Tier::Cli,
            path: None,
            digest: None,
        }
    }

    /// Short description for log lines
    pub fn describe(&self) -> String {
        match &self.path {
            Some(path) => format!("{} ({})", self.tier, path.display()),
            None => format!("{} (built-in)", self.tier),
        }
    }
}

/// Hex SHA-256 of a byte slice
pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
