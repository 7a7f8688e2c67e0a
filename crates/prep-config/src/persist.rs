//! Reading override documents and writing resolved configuration

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;
use crate::node::ConfigNode;
use crate::source::{ConfigSource, Tier};

/// A partial override document
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideDocument {
    pub node: ConfigNode,
    /// None when the document did not exist
    pub source: Option<ConfigSource>,
}

impl OverrideDocument {
    /// Load the override document at `path`
    ///
    /// A missing file is an empty document. An empty file is also empty,
    /// and null entries are treated as not set.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No override document at {}", path.display());
                return Ok(Self {
                    node: ConfigNode::empty(),
                    source: None,
                });
            }
            Err(e) => return Err(ConfigError::override_load(path, e)),
        };
        if path.is_dir() {
            return Err(ConfigError::override_load(path, "is a directory"));
        }

        let text = std::str::from_utf8(&bytes)
            .map_err(|e| ConfigError::override_load(path, format!("invalid UTF-8: {}", e)))?;
        let node = if text.trim().is_empty() {
            ConfigNode::empty()
        } else {
            let value: serde_yaml::Value = serde_yaml::from_str(text)
                .map_err(|e| ConfigError::override_load(path, format!("YAML parse error: {}", e)))?;
            ConfigNode::from_yaml(value).map_err(|e| ConfigError::override_load(path, e))?
        };
        if node.as_map().is_none() {
            return Err(ConfigError::override_load(
                path,
                format!("top level must be a mapping, found {}", node.kind_name()),
            ));
        }

        Ok(Self {
            node,
            source: Some(ConfigSource::file(Tier::Override, path, &bytes)),
        })
    }
}

/// Serialize a tree as a YAML document
pub fn to_yaml_string(node: &ConfigNode) -> Result<String, ConfigError> {
    Ok(serde_yaml::to_string(&node.to_yaml())?)
}

/// Write `node` to `path`, replacing any existing file
///
/// The document is written next to the target and renamed into place so an
/// interrupted write never leaves a truncated file behind.
pub fn write_document(node: &ConfigNode, path: &Path) -> Result<(), ConfigError> {
    let persistence = |source| ConfigError::Persistence {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(persistence)?;
    }

    let text = to_yaml_string(node)?;
    let temp = temp_path(path);
    let result = fs::write(&temp, text).and_then(|()| fs::rename(&temp, path));
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result.map_err(persistence)?;

    debug!("Wrote configuration to {}", path.display());
    Ok(())
}

/// Write `node` to `path`, failing if the file already exists
pub fn write_new_document(node: &ConfigNode, path: &Path) -> Result<(), ConfigError> {
    let persistence = |source| ConfigError::Persistence {
        path: path.to_path_buf(),
        source,
    };
    let text = to_yaml_string(node)?;
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(persistence)?;
    file.write_all(text.as_bytes()).map_err(persistence)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::FieldPath;
    use tempfile::TempDir;

    fn node(src: &str) -> ConfigNode {
        ConfigNode::from_yaml(serde_yaml::from_str(src).unwrap()).unwrap()
    }

    #[test]
    fn test_missing_document_is_empty() {
        let dir = TempDir::new().unwrap();
        let doc = OverrideDocument::load(&dir.path().join("config.yaml")).unwrap();
        assert!(doc.node.is_empty());
        assert!(doc.source.is_none());
    }

    #[test]
    fn test_empty_file_is_empty_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "").unwrap();

        let doc = OverrideDocument::load(&path).unwrap();
        assert!(doc.node.is_empty());
        assert!(doc.source.is_some());
    }

    #[test]
    fn test_null_entries_fall_through() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "box:\n  size: ~\n  type: cuboid\n").unwrap();

        let doc = OverrideDocument::load(&path).unwrap();
        assert!(doc.node.get(&FieldPath::parse("box.size").unwrap()).is_none());
        assert!(doc.node.get(&FieldPath::parse("box.type").unwrap()).is_some());
    }

    #[test]
    fn test_malformed_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "box: [unterminated\n").unwrap();

        let err = OverrideDocument::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::OverrideLoad { .. }));
    }

    #[test]
    fn test_non_mapping_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "- a\n- b\n").unwrap();

        let err = OverrideDocument::load(&path).unwrap_err();
        assert!(err.to_string().contains("top level must be a mapping"));
    }

    #[test]
    fn test_directory_is_load_error() {
        let dir = TempDir::new().unwrap();
        let err = OverrideDocument::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::OverrideLoad { .. }));
    }

    #[test]
    fn test_write_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let tree = node("box:\n  size: 70.0\n  type: cuboid\nions:\n  names: [K+]\n");

        write_document(&tree, &path).unwrap();
        let doc = OverrideDocument::load(&path).unwrap();
        assert_eq!(doc.node, tree);
        assert!(!dir.path().join("nested").join("config.yaml.tmp").exists());
    }

    #[test]
    fn test_yaml_string_reloads() {
        let tree = node("box:\n  size: 70.0\nions:\n  names: [K+, Cl-]\n");
        let text = to_yaml_string(&tree).unwrap();
        assert_eq!(node(&text), tree);
    }

    #[test]
    fn test_serializer_error_is_reported() {
        let source = serde_yaml::from_str::<serde_yaml::Value>("[unclosed").unwrap_err();
        let err = ConfigError::from(source);
        assert!(matches!(err, ConfigError::Serialize(_)));
        assert!(err.to_string().starts_with("cannot serialize configuration: "));
    }

    #[test]
    fn test_write_new_refuses_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample_config.yaml");
        fs::write(&path, "keep: me\n").unwrap();

        let err = write_new_document(&node("a: 1\n"), &path).unwrap_err();
        assert!(matches!(err, ConfigError::Persistence { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep: me\n");
    }

    #[test]
    fn test_write_to_unwritable_location() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();

        let err = write_document(&node("a: 1\n"), &blocker.join("config.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Persistence { .. }));
    }
}
