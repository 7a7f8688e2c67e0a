//! Preparation pipeline
//!
//! Drives the Tinker stages in a fixed order, each consuming the previous
//! stage's output:
//! - convert (pdbxyz)
//! - align
//! - build_box
//! - solvate
//! - neutralize
//! - add_salt:<ion> per salt
//!
//! A failed stage halts the run. Nothing in the working area is deleted, so
//! the files of completed stages stay available for inspection.

mod preflight;
mod stages;

pub use preflight::{check as preflight, resolve_path, CheckedInputs, PreflightError};
pub use stages::{choose_neutralizer, salt_count, Neutralizer, StageContext, StageError};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, info_span, warn};

use crate::config::PrepSettings;
use crate::signal::SignalState;
use crate::state::{RunStateData, RunStateError};
use crate::summary::{ExitCode, FailureKind};
use crate::tinker::{self, KeyFile};
use crate::toolchain::Toolchain;

/// Orchestration errors
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("{0}")]
    Preflight(#[from] PreflightError),

    #[error("stage {stage} failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: StageError,
    },

    #[error("run cancelled {}", describe_cancel(.stage))]
    Cancelled { stage: Option<String> },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("run state error: {0}")]
    State(#[from] RunStateError),
}

fn describe_cancel(stage: &Option<String>) -> String {
    match stage {
        Some(stage) => format!("during stage {stage}"),
        None => "before the next stage".to_string(),
    }
}

impl OrchestrationError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            OrchestrationError::Preflight(_) => FailureKind::Preflight,
            OrchestrationError::Cancelled { .. } => FailureKind::Cancelled,
            OrchestrationError::Stage { .. }
            | OrchestrationError::Io { .. }
            | OrchestrationError::State(_) => FailureKind::Stage,
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        self.failure_kind().exit_code()
    }

    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| OrchestrationError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, OrchestrationError>;

/// Where a run reads and writes
#[derive(Debug, Clone)]
pub struct RunLayout {
    /// Relative configured paths are resolved against this directory
    pub base_dir: PathBuf,
    /// Working area; each run gets its own subdirectory
    pub work_dir: PathBuf,
    /// Receives `<prefix>_final.xyz` and `<prefix>_final.key`
    pub output_dir: PathBuf,
}

impl RunLayout {
    pub fn new(base_dir: &Path, work_dir: &Path, output_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            work_dir: resolve_path(base_dir, work_dir),
            output_dir: resolve_path(base_dir, output_dir),
        }
    }
}

/// Files produced by a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepOutcome {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub final_structure: PathBuf,
    pub final_key: PathBuf,
}

/// What a stage body reports
enum StageOutcome {
    Produced(PathBuf),
    Skipped(String),
}

/// Sequences the preparation stages for one run
pub struct Orchestrator<T> {
    settings: PrepSettings,
    layout: RunLayout,
    toolchain: T,
    signal: Arc<SignalState>,
    run_id: String,
    run_dir: PathBuf,
}

impl<T: Toolchain> Orchestrator<T> {
    pub fn new(settings: PrepSettings, layout: RunLayout, toolchain: T) -> Self {
        let run_id = ulid::Ulid::new().to_string().to_lowercase();
        let run_dir = layout.work_dir.join(&run_id);
        Self {
            settings,
            layout,
            toolchain,
            signal: Arc::new(SignalState::new()),
            run_id,
            run_dir,
        }
    }

    /// Share cancellation state with the signal handler
    pub fn with_signal_state(mut self, signal: Arc<SignalState>) -> Self {
        self.signal = signal;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run directory inside the working area (created by [`Orchestrator::run`])
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Check inputs, then run every stage
    pub fn run(self) -> PipelineResult<PrepOutcome> {
        let inputs = preflight(&self.settings, &self.layout.base_dir)?;
        let Orchestrator {
            settings,
            layout,
            toolchain,
            signal,
            run_id,
            run_dir,
        } = self;

        fs::create_dir_all(&run_dir).map_err(OrchestrationError::io(&run_dir))?;
        info!("Run {} in {}", run_id, run_dir.display());

        let key_path = run_dir.join(format!("{}.key", settings.output_prefix));
        let mut key = KeyFile::new();
        key.set("parameters", &inputs.amoeba_prm.to_string_lossy());
        key.write(&key_path).map_err(OrchestrationError::io(&key_path))?;

        let mut run = StageRunner {
            state: RunStateData::new(run_id.clone()),
            run_dir: run_dir.clone(),
            signal,
        };
        run.state.start()?;
        run.save();

        let ctx = StageContext::new(toolchain, &run_dir, &key_path, inputs.params.clone());
        let result = drive(&mut run, &ctx, &settings, &inputs).and_then(|structure| {
            run.check_cancelled()?;
            finalize(&structure, &key_path, &layout.output_dir, &settings.output_prefix)
        });

        match result {
            Ok((final_structure, final_key)) => {
                run.state.set_final_output(&final_structure);
                run.state.succeed()?;
                run.save();
                info!("Prepared system written to {}", final_structure.display());
                Ok(PrepOutcome {
                    run_id,
                    run_dir,
                    final_structure,
                    final_key,
                })
            }
            Err(e) => {
                let transition = match &e {
                    OrchestrationError::Cancelled { .. } => run.state.cancel(),
                    _ => run.state.fail(),
                };
                if let Err(state_err) = transition {
                    warn!("Cannot record run outcome: {}", state_err);
                }
                run.save();
                Err(e)
            }
        }
    }
}

/// Run the stages in order; returns the final structure
fn drive<T: Toolchain>(
    run: &mut StageRunner,
    ctx: &StageContext<T>,
    settings: &PrepSettings,
    inputs: &CheckedInputs,
) -> PipelineResult<PathBuf> {
    let prefix = settings.output_prefix.as_str();
    let size = settings.periodic_box.size;

    let system = run.produce("convert", || ctx.convert(&inputs.solute, prefix))?;
    let aligned = run.produce("align", || ctx.align(&system))?;

    let solvent = run.produce("build_box", || ctx.build_box(&inputs.box_file, size))?;
    let mut current = run.produce("solvate", || ctx.solvate(&aligned, &solvent, size))?;

    let neutralized = run.stage("neutralize", || {
        let charge = ctx.total_charge(&current)?;
        if charge == 0 {
            return Ok(StageOutcome::Skipped("system is already neutral".to_string()));
        }
        let chosen = choose_neutralizer(ctx.params(), &settings.ions.neutralizers, charge)?;
        if chosen.count == 0 {
            return Ok(StageOutcome::Skipped(format!(
                "charge {charge} is smaller than one {} ion",
                chosen.ion
            )));
        }
        info!("Adding {} {} to offset charge {}", chosen.count, chosen.ion, charge);
        ctx.place_ions(&current, &chosen.atom_type, chosen.count, "_neutralized")
            .map(StageOutcome::Produced)
    })?;
    if let Some(path) = neutralized {
        current = path;
    }

    let volume = settings.periodic_box.volume();
    for (ion, concentration) in settings.ions.salts.pairs() {
        let name = format!("add_salt:{ion}");
        let added = run.stage(&name, || {
            let count = salt_count(concentration, volume);
            if count == 0 {
                return Ok(StageOutcome::Skipped(format!(
                    "{concentration} mol/L of {ion} is less than one ion"
                )));
            }
            let atom_type = ctx.atom_type(&tinker::ion_description(ion))?;
            info!("Adding {} {} for {} mol/L", count, ion, concentration);
            ctx.place_ions(&current, &atom_type, count, &format!("_{ion}_added"))
                .map(StageOutcome::Produced)
        })?;
        if let Some(path) = added {
            current = path;
        }
    }

    Ok(current)
}

/// Copy the final structure and key file to the output directory
fn finalize(
    structure: &Path,
    key: &Path,
    output_dir: &Path,
    prefix: &str,
) -> PipelineResult<(PathBuf, PathBuf)> {
    fs::create_dir_all(output_dir).map_err(OrchestrationError::io(output_dir))?;
    let final_structure = output_dir.join(format!("{prefix}_final.xyz"));
    let final_key = output_dir.join(format!("{prefix}_final.key"));
    fs::copy(structure, &final_structure).map_err(OrchestrationError::io(&final_structure))?;
    fs::copy(key, &final_key).map_err(OrchestrationError::io(&final_key))?;
    Ok((final_structure, final_key))
}

/// Wraps each stage with cancellation checks, a span and progress records
struct StageRunner {
    state: RunStateData,
    run_dir: PathBuf,
    signal: Arc<SignalState>,
}

impl StageRunner {
    fn check_cancelled(&self) -> PipelineResult<()> {
        if self.signal.is_cancel_requested() {
            warn!("Cancellation requested; not starting further stages");
            return Err(OrchestrationError::Cancelled { stage: None });
        }
        Ok(())
    }

    /// Run a stage that must produce a file
    fn produce<F>(&mut self, name: &str, body: F) -> PipelineResult<PathBuf>
    where
        F: FnOnce() -> Result<PathBuf, StageError>,
    {
        self.stage(name, || body().map(StageOutcome::Produced))?
            .ok_or_else(|| OrchestrationError::Stage {
                stage: name.to_string(),
                source: StageError::MissingOutput {
                    program: name.to_string(),
                    path: PathBuf::new(),
                },
            })
    }

    /// Run a stage; `None` when it was skipped
    fn stage<F>(&mut self, name: &str, body: F) -> PipelineResult<Option<PathBuf>>
    where
        F: FnOnce() -> Result<StageOutcome, StageError>,
    {
        self.check_cancelled()?;

        let span = info_span!("stage", name = %name);
        let _entered = span.enter();
        self.signal.set_current_stage(Some(name));
        self.state.begin_stage(name)?;
        self.save();

        let outcome = body();
        self.signal.set_current_stage(None);

        let result = match outcome {
            Ok(StageOutcome::Produced(path)) => {
                info!("Stage {} produced {}", name, path.display());
                self.state.complete_stage(&path)?;
                Ok(Some(path))
            }
            Ok(StageOutcome::Skipped(reason)) => {
                info!("Stage {} skipped: {}", name, reason);
                self.state.skip_stage(&reason)?;
                Ok(None)
            }
            Err(e) if e.is_cancelled() => {
                self.state.cancel_stage(&e.to_string())?;
                Err(OrchestrationError::Cancelled {
                    stage: Some(name.to_string()),
                })
            }
            Err(e) => {
                error!("Stage {} failed: {}", name, e);
                self.state.fail_stage(&e.to_string())?;
                Err(OrchestrationError::Stage {
                    stage: name.to_string(),
                    source: e,
                })
            }
        };
        self.save();
        result
    }

    /// Rewrite run_state.json; a failed write does not stop the run
    fn save(&self) {
        if let Err(e) = self.state.write_to_run_dir(&self.run_dir) {
            error!(
                "Cannot write run state in {}: {}",
                self.run_dir.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_resolves_relative_dirs() {
        let layout = RunLayout::new(Path::new("/home/u/proj"), Path::new("temp"), Path::new("."));
        assert_eq!(layout.work_dir, PathBuf::from("/home/u/proj/temp"));
        assert_eq!(layout.output_dir, PathBuf::from("/home/u/proj/."));

        let layout = RunLayout::new(Path::new("/home/u"), Path::new("/scratch/w"), Path::new("out"));
        assert_eq!(layout.work_dir, PathBuf::from("/scratch/w"));
        assert_eq!(layout.output_dir, PathBuf::from("/home/u/out"));
    }

    #[test]
    fn test_exit_codes() {
        let preflight = OrchestrationError::Preflight(PreflightError {
            problems: vec!["no solute given".to_string()],
        });
        assert_eq!(preflight.failure_kind(), FailureKind::Preflight);
        assert_eq!(preflight.exit_code(), ExitCode::Preflight);

        let cancelled = OrchestrationError::Cancelled { stage: None };
        assert_eq!(cancelled.exit_code(), ExitCode::Cancelled);
        assert_eq!(cancelled.to_string(), "run cancelled before the next stage");

        let stage = OrchestrationError::Stage {
            stage: "solvate".to_string(),
            source: StageError::NoCharge,
        };
        assert_eq!(stage.failure_kind(), FailureKind::Stage);
        assert_eq!(stage.exit_code(), ExitCode::StageFailed);
        assert!(stage.to_string().starts_with("stage solvate failed"));
    }

    #[test]
    fn test_run_ids_are_unique() {
        let layout = RunLayout::new(Path::new("/tmp"), Path::new("temp"), Path::new("."));
        let settings: PrepSettings =
            serde_yaml::from_str(crate::config::DEFAULTS_YAML).unwrap();
        let a = Orchestrator::new(settings.clone(), layout.clone(), NoTools);
        let b = Orchestrator::new(settings, layout, NoTools);

        assert_ne!(a.run_id(), b.run_id());
        assert_eq!(a.run_dir().parent(), Some(Path::new("/tmp/temp")));
        assert_eq!(a.run_id(), a.run_id().to_lowercase());
    }

    struct NoTools;

    impl Toolchain for NoTools {
        fn run(
            &self,
            invocation: &crate::toolchain::Invocation,
        ) -> Result<crate::toolchain::ToolOutput, crate::toolchain::ToolError> {
            Err(crate::toolchain::ToolError::NotFound {
                program: invocation.program.clone(),
                path: PathBuf::new(),
            })
        }
    }
}
