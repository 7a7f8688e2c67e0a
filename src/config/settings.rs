//! Typed view of the resolved configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Resolved preparation settings
///
/// Deserialized from a validated tree, so enumerations and ranges have
/// already been checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepSettings {
    pub tinker_path: PathBuf,
    pub amoeba_prm: PathBuf,
    pub output_prefix: String,
    pub timeout_seconds: u64,
    pub solutes: Solutes,
    pub solvent: Solvent,
    pub ions: Ions,
    #[serde(rename = "box")]
    pub periodic_box: PeriodicBox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solutes {
    pub protein: Vec<PathBuf>,
    pub nucleic_acid: Vec<PathBuf>,
}

impl Solutes {
    /// All solute files, proteins first
    pub fn all(&self) -> Vec<&PathBuf> {
        self.protein.iter().chain(self.nucleic_acid.iter()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solvent {
    pub name: String,
    pub box_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ions {
    pub neutralizers: Vec<String>,
    pub salts: Salts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Salts {
    pub names: Vec<String>,
    pub concentrations: Vec<f64>,
}

impl Salts {
    /// (ion, concentration) pairs
    pub fn pairs(&self) -> impl Iterator<Item = (&str, f64)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.concentrations.iter().copied())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicBox {
    #[serde(rename = "type")]
    pub shape: String,
    pub size: f64,
}

impl PeriodicBox {
    /// Box volume in Å³
    pub fn volume(&self) -> f64 {
        self.size * self.size * self.size
    }
}
