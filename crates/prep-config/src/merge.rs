//! Tier merge and resolution
//!
//! Layers are combined with:
//! - Mappings: deep-merge by key
//! - Lists: REPLACE (last wins)
//! - Scalars: override (last wins)
//!
//! Nulls never reach the merge; partial documents drop them on load, so an
//! absent key always falls through to the tier below.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{ConfigError, UnknownField};
use crate::node::ConfigNode;
use crate::path::FieldPath;
use crate::schema::Schema;
use crate::source::Tier;

/// Deep merge two trees, `overlay` taking precedence
pub fn deep_merge(base: ConfigNode, overlay: ConfigNode) -> ConfigNode {
    match (base, overlay) {
        (ConfigNode::Map(mut base_map), ConfigNode::Map(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            ConfigNode::Map(base_map)
        }

        // Lists, scalars and shape changes: overlay wins
        (_, overlay) => overlay,
    }
}

/// Merge layers in order (first is base, last has highest precedence)
pub fn merge_layers(layers: Vec<ConfigNode>) -> ConfigNode {
    layers.into_iter().fold(ConfigNode::empty(), deep_merge)
}

/// A fully resolved tree plus the tier that supplied each field
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    tree: ConfigNode,
    provenance: BTreeMap<FieldPath, Tier>,
}

impl ResolvedConfig {
    pub fn tree(&self) -> &ConfigNode {
        &self.tree
    }

    pub fn get(&self, path: &FieldPath) -> Option<&ConfigNode> {
        self.tree.get(path)
    }

    /// Tier that supplied the value at `path`
    pub fn tier_of(&self, path: &FieldPath) -> Option<Tier> {
        self.provenance.get(path).copied()
    }

    pub fn provenance(&self) -> &BTreeMap<FieldPath, Tier> {
        &self.provenance
    }

    pub fn into_tree(self) -> ConfigNode {
        self.tree
    }

    /// Deserialize the tree into a typed settings struct
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_yaml::Error> {
        serde_yaml::from_value(self.tree.to_yaml())
    }
}

/// Resolve defaults, override document and command-line values into one tree
///
/// Unknown fields from both partial tiers are reported together. The result
/// is not validated; pass it to [`crate::validate`] for that.
pub fn resolve(
    schema: &Schema,
    overrides: &ConfigNode,
    cli: &ConfigNode,
) -> Result<ResolvedConfig, ConfigError> {
    let mut unknown: Vec<UnknownField> = schema.unknown_fields(overrides, Tier::Override);
    unknown.extend(schema.unknown_fields(cli, Tier::Cli));
    if !unknown.is_empty() {
        return Err(ConfigError::UnknownField { fields: unknown });
    }

    let merged = merge_layers(vec![
        schema.defaults().clone(),
        overrides.clone(),
        cli.clone(),
    ]);

    let mut tree = ConfigNode::empty();
    let mut provenance = BTreeMap::new();
    for spec in schema.fields() {
        let Some(value) = merged.get(&spec.path) else {
            continue;
        };
        let tier = if cli.get(&spec.path).is_some() {
            Tier::Cli
        } else if overrides.get(&spec.path).is_some() {
            Tier::Override
        } else {
            Tier::Default
        };
        let value = if spec.ty.matches(value) {
            spec.ty.coerce(value.clone())
        } else {
            value.clone()
        };
        tree.set(&spec.path, value)
            .map_err(|e| ConfigError::schema("(resolution)", e))?;
        provenance.insert(spec.path.clone(), tier);
    }

    for (path, tier) in provenance.iter().filter(|(_, t)| **t != Tier::Default) {
        if let Some(value) = tree.get(path) {
            debug!("{} = {} (from {})", path, value, tier);
        }
    }

    Ok(ResolvedConfig { tree, provenance })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Scalar;

    const DEFAULTS: &str = "\
timeout_seconds: 3600
box:
  type: cuboid
  size: 64.0
ions:
  salts:
    names: [K+, Cl-]
    concentrations: [0.15, 0.15]
";

    fn yaml(src: &str) -> ConfigNode {
        ConfigNode::from_yaml(serde_yaml::from_str(src).unwrap()).unwrap()
    }

    fn path(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    fn schema() -> Schema {
        Schema::from_yaml_str(DEFAULTS, "test").unwrap()
    }

    #[test]
    fn test_scalar_override() {
        let result = deep_merge(yaml("timeout: 100\n"), yaml("timeout: 200\n"));
        assert_eq!(
            result.get(&path("timeout")),
            Some(&ConfigNode::Scalar(Scalar::Int(200)))
        );
    }

    #[test]
    fn test_mapping_deep_merge() {
        let result = deep_merge(
            yaml("box:\n  type: cuboid\n  size: 64.0\n"),
            yaml("box:\n  size: 70.0\n"),
        );
        assert_eq!(result.get(&path("box.size")).unwrap().to_string(), "70.0");
        assert_eq!(result.get(&path("box.type")).unwrap().to_string(), "cuboid");
    }

    #[test]
    fn test_list_replace() {
        let result = deep_merge(yaml("names: [K+, Cl-]\n"), yaml("names: [Na+]\n"));
        assert_eq!(result.get(&path("names")).unwrap().to_string(), "[Na+]");
    }

    #[test]
    fn test_merge_layers() {
        let result = merge_layers(vec![
            yaml("timeout: 100\nbox:\n  size: 1.0\n"),
            yaml("timeout: 200\n"),
            yaml("box:\n  size: 2.0\n"),
        ]);
        assert_eq!(result.get(&path("timeout")).unwrap().to_string(), "200");
        assert_eq!(result.get(&path("box.size")).unwrap().to_string(), "2.0");
    }

    #[test]
    fn test_resolve_precedence_and_provenance() {
        let resolved = resolve(
            &schema(),
            &yaml("box:\n  size: 70.0\n"),
            &yaml("box:\n  size: 77.0\n"),
        )
        .unwrap();
        assert_eq!(resolved.get(&path("box.size")).unwrap().to_string(), "77.0");
        assert_eq!(resolved.tier_of(&path("box.size")), Some(Tier::Cli));
        assert_eq!(resolved.tier_of(&path("box.type")), Some(Tier::Default));
    }

    #[test]
    fn test_resolve_without_partial_tiers_equals_defaults() {
        let schema = schema();
        let resolved = resolve(&schema, &ConfigNode::empty(), &ConfigNode::empty()).unwrap();
        assert_eq!(resolved.tree(), schema.defaults());
    }

    #[test]
    fn test_resolve_widens_integers() {
        let resolved = resolve(&schema(), &yaml("box:\n  size: 70\n"), &ConfigNode::empty()).unwrap();
        assert_eq!(
            resolved.get(&path("box.size")),
            Some(&ConfigNode::Scalar(Scalar::Float(70.0)))
        );
    }

    #[test]
    fn test_resolve_reports_unknown_from_both_tiers() {
        let err = resolve(
            &schema(),
            &yaml("boxx:\n  size: 70.0\n"),
            &yaml("ions:\n  salt: [K+]\n"),
        )
        .unwrap_err();
        match err {
            ConfigError::UnknownField { fields } => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].tier, Tier::Override);
                assert_eq!(fields[1].tier, Tier::Cli);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_deserialize_typed() {
        #[derive(serde::Deserialize)]
        struct BoxSettings {
            size: f64,
        }
        #[derive(serde::Deserialize)]
        struct Settings {
            timeout_seconds: u64,
            #[serde(rename = "box")]
            boxed: BoxSettings,
        }

        let resolved = resolve(&schema(), &yaml("box:\n  size: 70\n"), &ConfigNode::empty()).unwrap();
        let settings: Settings = resolved.deserialize().unwrap();
        assert_eq!(settings.timeout_seconds, 3600);
        assert_eq!(settings.boxed.size, 70.0);
    }
}
