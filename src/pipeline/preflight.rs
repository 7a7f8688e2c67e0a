//! Input checks run before any external program
//!
//! All problems are collected so a single run reports every missing file.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::PrepSettings;
use crate::tinker::{ion_description, ParameterFile, WATER_HYDROGEN, WATER_OXYGEN};

/// Everything a preparation run reads, resolved and checked
#[derive(Debug, Clone)]
pub struct CheckedInputs {
    pub tinker_path: PathBuf,
    pub amoeba_prm: PathBuf,
    pub box_file: PathBuf,
    pub solute: PathBuf,
    pub params: ParameterFile,
}

/// Preflight failure listing every problem found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightError {
    pub problems: Vec<String>,
}

impl fmt::Display for PreflightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "preflight found {} problem(s)", self.problems.len())?;
        for problem in &self.problems {
            write!(f, "\n  - {problem}")?;
        }
        Ok(())
    }
}

impl std::error::Error for PreflightError {}

/// Resolve a configured path against the invocation directory
pub fn resolve_path(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Check the referenced files and the ion setup
pub fn check(settings: &PrepSettings, base_dir: &Path) -> Result<CheckedInputs, PreflightError> {
    let mut problems = Vec::new();

    let tinker_path = resolve_path(base_dir, &settings.tinker_path);
    if !tinker_path.is_dir() {
        problems.push(format!(
            "tinker_path {} is not a directory",
            tinker_path.display()
        ));
    }

    let box_file = resolve_path(base_dir, &settings.solvent.box_file);
    if !box_file.is_file() {
        problems.push(format!(
            "solvent.box_file {} does not exist",
            box_file.display()
        ));
    }

    let solute = check_solutes(settings, base_dir, &mut problems);

    let amoeba_prm = resolve_path(base_dir, &settings.amoeba_prm);
    let params = if amoeba_prm.is_file() {
        match ParameterFile::load(&amoeba_prm) {
            Ok(params) => {
                check_atom_types(settings, &params, &mut problems);
                Some(params)
            }
            Err(e) => {
                problems.push(format!("cannot read amoeba_prm {}: {e}", amoeba_prm.display()));
                None
            }
        }
    } else {
        problems.push(format!("amoeba_prm {} does not exist", amoeba_prm.display()));
        None
    };

    match (solute, params) {
        (Some(solute), Some(params)) if problems.is_empty() => Ok(CheckedInputs {
            tinker_path,
            amoeba_prm,
            box_file,
            solute,
            params,
        }),
        _ => Err(PreflightError { problems }),
    }
}

fn check_solutes(
    settings: &PrepSettings,
    base_dir: &Path,
    problems: &mut Vec<String>,
) -> Option<PathBuf> {
    let solutes = settings.solutes.all();
    match solutes.len() {
        0 => {
            problems.push(
                "no solute given (set solutes.protein or solutes.nucleic_acid)".to_string(),
            );
            return None;
        }
        1 => {}
        n => problems.push(format!(
            "{n} solutes given; combining more than one solute is not supported"
        )),
    }

    let mut first = None;
    for solute in solutes {
        let path = resolve_path(base_dir, solute);
        let is_pdb = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdb"));
        if !is_pdb {
            problems.push(format!("solute {} is not a .pdb file", path.display()));
        } else if !path.is_file() {
            problems.push(format!("solute {} does not exist", path.display()));
        }
        first.get_or_insert(path);
    }
    first
}

fn check_atom_types(settings: &PrepSettings, params: &ParameterFile, problems: &mut Vec<String>) {
    for description in [WATER_OXYGEN, WATER_HYDROGEN] {
        if params.find_atom_type(description).is_none() {
            problems.push(format!("amoeba_prm has no atom type for \"{description}\""));
        }
    }

    let neutralizers = settings.ions.neutralizers.iter().map(|n| (n, true));
    let salts = settings.ions.salts.names.iter().map(|n| (n, false));
    for (ion, needs_charge) in neutralizers.chain(salts) {
        let description = ion_description(ion);
        match params.find_atom_type(&description) {
            None => problems.push(format!(
                "ion {ion}: amoeba_prm has no atom type for \"{description}\""
            )),
            Some(atom_type) if needs_charge && params.find_atom_charge(&atom_type).is_none() => {
                problems.push(format!(
                    "ion {ion}: amoeba_prm has no multipole charge for atom type {atom_type}"
                ))
            }
            Some(_) => {}
        }
    }
}
