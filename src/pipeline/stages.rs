//! Individual preparation stages
//!
//! Every program runs inside the run directory and receives bare file
//! names. `xyzedit` writes its result next to the input as `<file>_2`,
//! which is renamed to `<stem><suffix>.xyz` so the final file name spells
//! out the transformations applied.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::tinker::{self, menu, KeyFile, ParameterFile};
use crate::toolchain::{Invocation, ToolError, ToolOutput, Toolchain};

/// Avogadro's number (1/mol)
pub const AVOGADRO: f64 = 6.022e23;

/// Litres per cubic ångström
pub const LITRES_PER_CUBIC_ANGSTROM: f64 = 1e-27;

/// Input sent to leave an `xyzedit` menu after listing it
const LISTING_INPUT: &str = "\n\n";

/// Errors from a single stage
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("{program} did not produce {}", .path.display())]
    MissingOutput { program: String, path: PathBuf },

    #[error("{program} menu has no entry \"{label}\"")]
    MenuOption { program: String, label: String },

    #[error("analyze output reports no total charge")]
    NoCharge,

    #[error("amoeba_prm has no atom type for \"{0}\"")]
    AtomType(String),

    #[error("amoeba_prm has no charge for atom type {0}")]
    IonCharge(String),

    #[error("no neutralizer carries a charge opposite to the system charge {0}")]
    NoNeutralizer(i64),

    #[error("{} holds no solute atoms", .0.display())]
    NoSolute(PathBuf),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StageError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StageError::Tool(e) if e.is_cancelled())
    }

    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| StageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Counter-ion chosen to neutralize the system
#[derive(Debug, Clone, PartialEq)]
pub struct Neutralizer {
    pub ion: String,
    pub atom_type: String,
    pub count: u64,
}

/// First neutralizer whose charge has the opposite sign of `charge`
pub fn choose_neutralizer(
    params: &ParameterFile,
    neutralizers: &[String],
    charge: i64,
) -> Result<Neutralizer, StageError> {
    for ion in neutralizers {
        let description = tinker::ion_description(ion);
        let atom_type = params
            .find_atom_type(&description)
            .ok_or(StageError::AtomType(description))?;
        let ion_charge = params
            .find_atom_charge(&atom_type)
            .ok_or_else(|| StageError::IonCharge(atom_type.clone()))?;

        if ion_charge * (charge as f64) < 0.0 {
            let count = (charge as f64 / ion_charge).abs().trunc() as u64;
            return Ok(Neutralizer {
                ion: ion.clone(),
                atom_type,
                count,
            });
        }
    }
    Err(StageError::NoNeutralizer(charge))
}

/// Ions needed for a concentration (mol/L) in a box volume (Å³)
pub fn salt_count(concentration: f64, volume: f64) -> u64 {
    (concentration * volume * LITRES_PER_CUBIC_ANGSTROM * AVOGADRO).floor() as u64
}

/// What the stages share: the toolchain, the run directory and its key file
pub struct StageContext<T> {
    toolchain: T,
    run_dir: PathBuf,
    key_path: PathBuf,
    params: ParameterFile,
}

impl<T: Toolchain> StageContext<T> {
    pub fn new(toolchain: T, run_dir: &Path, key_path: &Path, params: ParameterFile) -> Self {
        Self {
            toolchain,
            run_dir: run_dir.to_path_buf(),
            key_path: key_path.to_path_buf(),
            params,
        }
    }

    pub fn params(&self) -> &ParameterFile {
        &self.params
    }

    /// `pdbxyz`: copy the solute in, convert it, copy the result to `<prefix>.xyz`
    pub fn convert(&self, solute: &Path, prefix: &str) -> Result<PathBuf, StageError> {
        let pdb = self.import(solute)?;
        self.invoke("pdbxyz", &pdb, LISTING_INPUT)?;

        let converted = pdb.with_extension("xyz");
        self.expect_output("pdbxyz", &converted)?;

        let system = self.run_dir.join(format!("{prefix}.xyz"));
        if converted != system {
            fs::copy(&converted, &system).map_err(StageError::io(&system))?;
        }
        Ok(system)
    }

    pub fn align(&self, xyz: &Path) -> Result<PathBuf, StageError> {
        let [option] = self.menu_options(xyz, [menu::ALIGN])?;
        self.invoke("xyzedit", xyz, &format!("{option}\n\n"))?;
        self.take_versioned(xyz, "_aligned")
    }

    /// Import the solvent box, retype its water atoms, align it and trim it
    /// to a cube of `size` Å
    pub fn build_box(&self, box_file: &Path, size: f64) -> Result<PathBuf, StageError> {
        let water_o = self.atom_type(tinker::WATER_OXYGEN)?;
        let water_h = self.atom_type(tinker::WATER_HYDROGEN)?;
        let solvent = self.import(box_file)?;

        let [replace, align, trim] =
            self.menu_options(&solvent, [menu::REPLACE_TYPE, menu::ALIGN, menu::TRIM_BOX])?;
        let input = format!(
            "{replace}\n1,{water_o}\n{replace}\n2,{water_h}\n{align}\n{trim}\n{size},{size},{size}\n\n"
        );
        self.invoke("xyzedit", &solvent, &input)?;
        self.take_versioned(&solvent, "_trimmed")
    }

    /// Soak the system in the trimmed box and record the box edges in the key file
    pub fn solvate(&self, xyz: &Path, solvent: &Path, size: f64) -> Result<PathBuf, StageError> {
        let [soak] = self.menu_options(xyz, [menu::SOAK])?;
        self.invoke("xyzedit", xyz, &format!("{soak}\n{}\n\n", file_name(solvent)))?;
        let solvated = self.take_versioned(xyz, "_solvated")?;

        let mut key = KeyFile::load(&self.key_path).map_err(StageError::io(&self.key_path))?;
        for axis in ["a-axis", "b-axis", "c-axis"] {
            key.set(axis, &size.to_string());
        }
        key.write(&self.key_path).map_err(StageError::io(&self.key_path))?;
        Ok(solvated)
    }

    /// Net charge reported by `analyze`
    pub fn total_charge(&self, xyz: &Path) -> Result<i64, StageError> {
        let output = self.invoke("analyze", xyz, "M\n")?;
        let charge = tinker::total_charge(&output.stdout).ok_or(StageError::NoCharge)?;
        info!("System charge is {}", charge);
        Ok(charge)
    }

    /// Place `count` ions of `atom_type` around every non-water atom
    pub fn place_ions(
        &self,
        xyz: &Path,
        atom_type: &str,
        count: u64,
        suffix: &str,
    ) -> Result<PathBuf, StageError> {
        let solute = self.solute_selection(xyz)?;
        let [place] = self.menu_options(xyz, [menu::PLACE_IONS])?;
        let input = format!("{place}\n{solute}\n{atom_type},{count}\n\n");
        self.invoke("xyzedit", xyz, &input)?;
        self.take_versioned(xyz, suffix)
    }

    /// Atoms of `xyz` that are not water, ions placed earlier included
    pub fn solute_selection(&self, xyz: &Path) -> Result<String, StageError> {
        let water = [
            self.atom_type(tinker::WATER_OXYGEN)?,
            self.atom_type(tinker::WATER_HYDROGEN)?,
        ];
        let atoms = tinker::read_atoms(xyz).map_err(StageError::io(xyz))?;
        tinker::solute_selection(&atoms, &water).ok_or_else(|| StageError::NoSolute(xyz.to_path_buf()))
    }

    pub fn atom_type(&self, description: &str) -> Result<String, StageError> {
        self.params
            .find_atom_type(description)
            .ok_or_else(|| StageError::AtomType(description.to_string()))
    }

    fn invoke(&self, program: &str, xyz: &Path, stdin: &str) -> Result<ToolOutput, StageError> {
        let invocation = Invocation::new(program, &self.run_dir)
            .arg(file_name(xyz))
            .arg("-k")
            .arg(file_name(&self.key_path))
            .stdin(stdin);
        info!("Running {}", invocation);
        Ok(self.toolchain.run(&invocation)?)
    }

    /// List the `xyzedit` menu for `xyz` and look up entries by label
    fn menu_options<const N: usize>(
        &self,
        xyz: &Path,
        labels: [&str; N],
    ) -> Result<[u32; N], StageError> {
        let listing = self.invoke("xyzedit", xyz, LISTING_INPUT)?;
        let mut options = [0; N];
        for (slot, label) in options.iter_mut().zip(labels) {
            *slot = tinker::menu_option(&listing.stdout, label).ok_or_else(|| {
                StageError::MenuOption {
                    program: "xyzedit".to_string(),
                    label: label.to_string(),
                }
            })?;
            debug!("xyzedit option {} is \"{}\"", slot, label);
        }
        Ok(options)
    }

    /// Copy an input file into the run directory
    fn import(&self, source: &Path) -> Result<PathBuf, StageError> {
        let target = self.run_dir.join(file_name(source));
        if !target.exists() {
            fs::copy(source, &target).map_err(StageError::io(source))?;
        }
        Ok(target)
    }

    /// Rename the `<file>_2` written for `input` to `<stem><suffix>.xyz`
    fn take_versioned(&self, input: &Path, suffix: &str) -> Result<PathBuf, StageError> {
        let written = self.run_dir.join(format!("{}_2", file_name(input)));
        self.expect_output("xyzedit", &written)?;

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let renamed = self.run_dir.join(format!("{stem}{suffix}.xyz"));
        fs::rename(&written, &renamed).map_err(StageError::io(&written))?;
        debug!("Renamed {} to {}", written.display(), renamed.display());
        Ok(renamed)
    }

    fn expect_output(&self, program: &str, path: &Path) -> Result<(), StageError> {
        if path.is_file() {
            Ok(())
        } else {
            Err(StageError::MissingOutput {
                program: program.to_string(),
                path: path.to_path_buf(),
            })
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRM: &str = "\
atom  349  349  O    \"AMOEBA Water O\"     8  15.999  2
atom  350  350  H    \"AMOEBA Water H\"     1   1.008  1
atom  352  352  Na+  \"Sodium Ion Na+\"     11  22.990  0
atom  363  363  Cl-  \"Chloride Ion Cl-\"   17  35.453  0
atom  355  355  Mg+  \"Magnesium Ion Mg+2\" 12  24.305  0
multipole  352   1.00000
multipole  363  -1.00000
multipole  355   2.00000
";

    /// Toolchain for stages that never start a program
    struct NoPrograms;

    impl Toolchain for NoPrograms {
        fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
            panic!("unexpected run of {}", invocation.program)
        }
    }

    fn names(ions: &[&str]) -> Vec<String> {
        ions.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_choose_neutralizer_opposite_sign() {
        let params = ParameterFile::parse(PRM);
        let ions = names(&["Na+", "Cl-"]);

        let negative = choose_neutralizer(&params, &ions, -4).unwrap();
        assert_eq!(negative.ion, "Na+");
        assert_eq!(negative.atom_type, "352");
        assert_eq!(negative.count, 4);

        let positive = choose_neutralizer(&params, &ions, 3).unwrap();
        assert_eq!(positive.ion, "Cl-");
        assert_eq!(positive.count, 3);
    }

    #[test]
    fn test_choose_neutralizer_first_match_wins() {
        let params = ParameterFile::parse(PRM);
        let chosen = choose_neutralizer(&params, &names(&["Mg2+", "Na+"]), -5).unwrap();
        assert_eq!(chosen.ion, "Mg2+");
        assert_eq!(chosen.count, 2);

        let chosen = choose_neutralizer(&params, &names(&["Na+", "Mg2+"]), -5).unwrap();
        assert_eq!(chosen.ion, "Na+");
        assert_eq!(chosen.count, 5);
    }

    #[test]
    fn test_choose_neutralizer_none_opposite() {
        let params = ParameterFile::parse(PRM);
        let err = choose_neutralizer(&params, &names(&["Na+"]), 2).unwrap_err();
        assert!(matches!(err, StageError::NoNeutralizer(2)));
    }

    #[test]
    fn test_choose_neutralizer_unknown_ion() {
        let params = ParameterFile::parse(PRM);
        let err = choose_neutralizer(&params, &names(&["K+"]), -1).unwrap_err();
        assert_eq!(err.to_string(), "amoeba_prm has no atom type for \"Ion K\"");
    }

    #[test]
    fn test_solute_selection_skips_water() {
        let temp_dir = tempfile::tempdir().unwrap();
        let key = temp_dir.path().join("a.key");
        let ctx = StageContext::new(NoPrograms, temp_dir.path(), &key, ParameterFile::parse(PRM));

        let solvated = temp_dir.path().join("solvated.xyz");
        fs::write(
            &solvated,
            "5  test\n 1  N  0 0 0  207\n 2  C  0 0 0  8\n 3  O  0 0 0  349\n 4  H  0 0 0  350\n 5  Na+  0 0 0  352\n",
        )
        .unwrap();
        assert_eq!(ctx.solute_selection(&solvated).unwrap(), "-1,2,5");

        let water = temp_dir.path().join("water.xyz");
        fs::write(&water, "2  water\n 1  O  0 0 0  349\n 2  H  0 0 0  350\n").unwrap();
        assert!(matches!(ctx.solute_selection(&water), Err(StageError::NoSolute(_))));
    }

    #[test]
    fn test_salt_count() {
        // 0.15 mol/L in a 64 Å cube
        assert_eq!(salt_count(0.15, 64.0 * 64.0 * 64.0), 23);
        assert_eq!(salt_count(0.0, 262144.0), 0);
        assert_eq!(salt_count(0.001, 1000.0), 0);
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name(Path::new("/w/run/my_system.xyz")), "my_system.xyz");
        assert_eq!(file_name(Path::new("/")), "");
    }
}
