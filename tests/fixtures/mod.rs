//! Shared fixtures for integration tests
//!
//! - A scratch project directory with a parameter file, solvent box and solute
//! - A fake Tinker toolchain that writes the files real programs would

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tinker_prep::config::{PrepSettings, DEFAULTS_YAML};
use tinker_prep::signal::SignalState;
use tinker_prep::{Invocation, RunLayout, ToolError, ToolOutput, Toolchain};

/// Atoms written by the fake `pdbxyz`
pub const SOLUTE_ATOMS: usize = 12;

/// Water atoms the fake `xyzedit` soak adds after the solute
pub const WATER_ATOMS: [&str; 6] = ["349", "350", "350", "349", "350", "350"];

/// Menu numbers printed by the fake `xyzedit`
pub const OPT_REPLACE: u32 = 7;
pub const OPT_ALIGN: u32 = 18;
pub const OPT_TRIM: u32 = 24;
pub const OPT_SOAK: u32 = 27;
pub const OPT_PLACE: u32 = 28;

pub const PRM: &str = "\
forcefield  AMOEBA-BIO-2018

atom   349  349  O    \"AMOEBA Water O\"     8  15.999  2
atom   350  350  H    \"AMOEBA Water H\"     1   1.008  1
atom   352  352  Na+  \"Sodium Ion Na+\"    11  22.990  0
atom   353  353  K+   \"Potassium Ion K+\"  19  39.098  0
atom   363  363  Cl-  \"Chloride Ion Cl-\"  17  35.453  0

multipole  352   1.00000
multipole  353   1.00000
multipole  363  -1.00000
";

fn menu() -> String {
    format!(
        " The Tinker XYZ File Editing Utility Can :\n\n\
         \x20   ({OPT_REPLACE}) Replace Old Atom Type with a New Type\n\
         \x20  ({OPT_ALIGN}) Translate and Rotate to Inertial Frame\n\
         \x20  ({OPT_TRIM}) Trim a Periodic Box to a Smaller Size\n\
         \x20  ({OPT_SOAK}) Soak Current Molecule in Box of Solvent\n\
         \x20  ({OPT_PLACE}) Place Monoatomic Ions around a Solute\n\n\
         \x20Number of the Desired Choice [<Enter>=Exit] :\n"
    )
}

/// Project directory with every input a run needs
pub struct Project {
    pub dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("bin")).unwrap();
        fs::write(dir.path().join("amoeba.prm"), PRM).unwrap();
        fs::write(dir.path().join("water.xyz"), "648  water box\n").unwrap();
        fs::write(dir.path().join("crambin.pdb"), "ATOM      1  N   THR A   1\nEND\n").unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Built-in defaults pointed at the project files
    pub fn settings(&self) -> PrepSettings {
        let mut settings: PrepSettings = serde_yaml::from_str(DEFAULTS_YAML).unwrap();
        settings.tinker_path = PathBuf::from("bin");
        settings.amoeba_prm = PathBuf::from("amoeba.prm");
        settings.solvent.box_file = PathBuf::from("water.xyz");
        settings.solutes.protein = vec![PathBuf::from("crambin.pdb")];
        settings
    }

    pub fn layout(&self) -> RunLayout {
        RunLayout::new(self.path(), Path::new("temp"), Path::new("out"))
    }

    /// The single run directory inside the working area
    pub fn run_dir(&self) -> PathBuf {
        let mut runs: Vec<PathBuf> = fs::read_dir(self.path().join("temp"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.is_dir())
            .collect();
        assert_eq!(runs.len(), 1, "expected exactly one run directory");
        runs.remove(0)
    }
}

type Rule = Box<dyn Fn(&Invocation) -> bool + Send + Sync>;

/// Fake Tinker programs
///
/// `pdbxyz` writes `<stem>.xyz` and `analyze` reports `charge`. `xyzedit`
/// prints its menu for an empty input and otherwise writes `<file>_2`,
/// appending water for a soak and the requested ions for a placement.
pub struct FakeTinker {
    pub charge: f64,
    invocations: Mutex<Vec<Invocation>>,
    fail_when: Option<Rule>,
    skip_output_when: Option<Rule>,
    interrupt: Option<(Rule, Arc<SignalState>)>,
}

impl FakeTinker {
    pub fn new() -> Self {
        Self {
            charge: -3.0,
            invocations: Mutex::new(Vec::new()),
            fail_when: None,
            skip_output_when: None,
            interrupt: None,
        }
    }

    pub fn with_charge(mut self, charge: f64) -> Self {
        self.charge = charge;
        self
    }

    /// Exit non-zero for every matching invocation
    pub fn failing_when(mut self, rule: impl Fn(&Invocation) -> bool + Send + Sync + 'static) -> Self {
        self.fail_when = Some(Box::new(rule));
        self
    }

    /// Exit zero but write nothing for matching invocations
    pub fn silent_when(mut self, rule: impl Fn(&Invocation) -> bool + Send + Sync + 'static) -> Self {
        self.skip_output_when = Some(Box::new(rule));
        self
    }

    /// Deliver an interrupt to `signal` while a matching invocation runs
    pub fn interrupting_when(
        mut self,
        signal: Arc<SignalState>,
        rule: impl Fn(&Invocation) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.interrupt = Some((Box::new(rule), signal));
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    /// Invocations of `program`, leaving out `xyzedit` menu listings
    pub fn edits(&self, program: &str) -> Vec<Invocation> {
        self.invocations()
            .into_iter()
            .filter(|i| i.program == program)
            .filter(|i| !(i.program == "xyzedit" && i.stdin == "\n\n"))
            .collect()
    }

    fn write_output(&self, invocation: &Invocation) {
        let input = invocation.work_dir.join(&invocation.args[0]);
        match invocation.program.as_str() {
            "pdbxyz" => {
                let solute = vec!["1"; SOLUTE_ATOMS];
                fs::write(input.with_extension("xyz"), append_atoms("0  crambin\n", &solute)).unwrap();
            }
            "xyzedit" => {
                let content = fs::read_to_string(&input).unwrap();
                let lines: Vec<&str> = invocation.stdin.lines().collect();
                let content = match lines.first().and_then(|l| l.parse::<u32>().ok()) {
                    Some(OPT_SOAK) => append_atoms(&content, &WATER_ATOMS),
                    Some(OPT_PLACE) => {
                        let (atom_type, count) = lines[2].split_once(',').unwrap();
                        append_atoms(&content, &vec![atom_type; count.parse().unwrap()])
                    }
                    _ => content,
                };
                let output = invocation.work_dir.join(format!("{}_2", invocation.args[0]));
                fs::write(output, content).unwrap();
            }
            _ => {}
        }
    }
}

impl Toolchain for FakeTinker {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
        self.invocations.lock().unwrap().push(invocation.clone());

        if let Some((rule, signal)) = &self.interrupt {
            if rule(invocation) {
                signal.handle_signal();
            }
        }

        if self.fail_when.as_ref().is_some_and(|rule| rule(invocation)) {
            return Err(ToolError::Failed {
                program: invocation.program.clone(),
                status: Some(1),
                stderr: format!("{} -- simulated failure", invocation.program.to_uppercase()),
            });
        }

        match invocation.program.as_str() {
            "xyzedit" if invocation.stdin == "\n\n" => return Ok(ToolOutput::from_stdout(menu())),
            "analyze" => {
                return Ok(ToolOutput::from_stdout(format!(
                    "\n Total Electric Charge :{:>16.5} Electrons\n",
                    self.charge
                )))
            }
            _ => {}
        }

        if !self.skip_output_when.as_ref().is_some_and(|rule| rule(invocation)) {
            self.write_output(invocation);
        }
        Ok(ToolOutput::default())
    }
}

/// Tinker XYZ text with atoms of `types` added after the existing ones
fn append_atoms(content: &str, types: &[&str]) -> String {
    let mut lines = content.lines();
    let header = lines.next().unwrap_or_default();
    let mut fields = header.split_whitespace();
    let count: usize = fields.next().unwrap().parse().unwrap();
    let title: Vec<&str> = fields.collect();

    let mut out = format!("{:>6}  {}\n", count + types.len(), title.join(" "));
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    for (offset, atom_type) in types.iter().enumerate() {
        let index = count + offset + 1;
        out.push_str(&format!("{index:>6}  X     0.000000    0.000000    0.000000  {atom_type:>5}\n"));
    }
    out
}

/// Matches the `xyzedit` call that uses menu entry `option`
pub fn uses_option(option: u32) -> impl Fn(&Invocation) -> bool + Send + Sync + 'static {
    move |inv: &Invocation| inv.program == "xyzedit" && inv.stdin.starts_with(&format!("{option}\n"))
}
