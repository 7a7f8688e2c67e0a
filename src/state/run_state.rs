//! Run progress record
//!
//! Run states: QUEUED → RUNNING → {SUCCEEDED | FAILED | CANCELLED}
//!
//! The record is rewritten to `run_state.json` in the run directory after
//! every transition, so a crashed or interrupted run shows how far it got.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{next_seq, now_rfc3339, TerminalState};

/// Schema version for run_state.json
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "tinker-prep/run_state@1";

/// File name inside the run directory
pub const RUN_STATE_FILENAME: &str = "run_state.json";

/// Run state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Run directory created, no stage started yet
    Queued,
    /// Stages are executing
    Running,
    /// Every stage finished or was skipped
    Succeeded,
    /// A stage failed
    Failed,
    /// Stopped by an interrupt
    Cancelled,
}

impl TerminalState for RunState {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Succeeded | RunState::Failed | RunState::Cancelled
        )
    }
}

impl RunState {
    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: RunState) -> bool {
        match (self, target) {
            // From QUEUED
            (RunState::Queued, RunState::Running) => true,
            (RunState::Queued, RunState::Cancelled) => true,
            (RunState::Queued, RunState::Failed) => true,

            // From RUNNING
            (RunState::Running, RunState::Succeeded) => true,
            (RunState::Running, RunState::Failed) => true,
            (RunState::Running, RunState::Cancelled) => true,

            // Terminal states cannot transition
            _ => false,
        }
    }
}

/// Outcome of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageState {
    Running,
    Succeeded,
    /// Nothing to do (e.g. the system is already neutral)
    Skipped,
    Failed,
    /// The running program was killed on interrupt
    Cancelled,
}

impl TerminalState for StageState {
    fn is_terminal(&self) -> bool {
        !matches!(self, StageState::Running)
    }
}

/// One stage entry in run_state.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name (`convert`, `align`, `add_salt:K+`, ...)
    pub name: String,

    pub state: StageState,

    /// File the stage produced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    pub started_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Failure message, or the reason a stage was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Run state artifact data (run_state.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStateData {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// Run identifier
    pub run_id: String,

    /// Current state
    pub state: RunState,

    /// When the run was created
    pub created_at: DateTime<Utc>,

    /// When the state was last updated
    pub updated_at: DateTime<Utc>,

    /// Stages in execution order
    #[serde(default)]
    pub stages: Vec<StageRecord>,

    /// Final structure copied to the output directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_output: Option<PathBuf>,

    /// Monotonic sequence counter for ordering
    pub seq: u64,
}

/// Errors for run state operations
#[derive(Debug, thiserror::Error)]
pub enum RunStateError {
    #[error("Invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: RunState, to: RunState },

    #[error("No stage is running")]
    NoRunningStage,

    #[error("Stage {0} is still running")]
    StageRunning(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl RunStateData {
    /// Create a new run in QUEUED state
    pub fn new(run_id: String) -> Self {
        let now = now_rfc3339();
        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            run_id,
            state: RunState::Queued,
            created_at: now,
            updated_at: now,
            stages: Vec::new(),
            final_output: None,
            seq: next_seq(),
        }
    }

    /// Transition to a new state
    pub fn transition(&mut self, new_state: RunState) -> Result<(), RunStateError> {
        if !self.state.can_transition_to(new_state) {
            return Err(RunStateError::InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }

        self.state = new_state;
        self.touch();
        Ok(())
    }

    /// Start the run (QUEUED → RUNNING)
    pub fn start(&mut self) -> Result<(), RunStateError> {
        self.transition(RunState::Running)
    }

    /// Mark run as succeeded
    pub fn succeed(&mut self) -> Result<(), RunStateError> {
        if let Some(stage) = self.running_stage() {
            return Err(RunStateError::StageRunning(stage.name.clone()));
        }
        self.transition(RunState::Succeeded)
    }

    /// Mark run as failed
    pub fn fail(&mut self) -> Result<(), RunStateError> {
        self.transition(RunState::Failed)
    }

    /// Cancel the run
    pub fn cancel(&mut self) -> Result<(), RunStateError> {
        self.transition(RunState::Cancelled)
    }

    /// Record the start of a stage
    pub fn begin_stage(&mut self, name: &str) -> Result<(), RunStateError> {
        if let Some(stage) = self.running_stage() {
            return Err(RunStateError::StageRunning(stage.name.clone()));
        }
        self.stages.push(StageRecord {
            name: name.to_string(),
            state: StageState::Running,
            output: None,
            started_at: now_rfc3339(),
            finished_at: None,
            message: None,
        });
        self.touch();
        Ok(())
    }

    /// Mark the running stage as finished with its output file
    pub fn complete_stage(&mut self, output: &Path) -> Result<(), RunStateError> {
        self.finish_stage(StageState::Succeeded, Some(output), None)
    }

    /// Mark the running stage as skipped
    pub fn skip_stage(&mut self, reason: &str) -> Result<(), RunStateError> {
        self.finish_stage(StageState::Skipped, None, Some(reason))
    }

    /// Mark the running stage as failed
    pub fn fail_stage(&mut self, error: &str) -> Result<(), RunStateError> {
        self.finish_stage(StageState::Failed, None, Some(error))
    }

    /// Mark the running stage as killed on interrupt
    pub fn cancel_stage(&mut self, reason: &str) -> Result<(), RunStateError> {
        self.finish_stage(StageState::Cancelled, None, Some(reason))
    }

    fn finish_stage(
        &mut self,
        state: StageState,
        output: Option<&Path>,
        message: Option<&str>,
    ) -> Result<(), RunStateError> {
        let stage = self
            .stages
            .last_mut()
            .filter(|s| s.state == StageState::Running)
            .ok_or(RunStateError::NoRunningStage)?;
        stage.state = state;
        stage.output = output.map(Path::to_path_buf);
        stage.message = message.map(str::to_string);
        stage.finished_at = Some(now_rfc3339());
        self.touch();
        Ok(())
    }

    pub fn running_stage(&self) -> Option<&StageRecord> {
        self.stages
            .last()
            .filter(|s| s.state == StageState::Running)
    }

    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn set_final_output(&mut self, path: &Path) {
        self.final_output = Some(path.to_path_buf());
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = now_rfc3339();
        self.seq = next_seq();
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Write atomically to file (write-then-rename)
    pub fn write_to_file(&self, path: &Path) -> Result<(), RunStateError> {
        let json = self.to_json()?;

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &json)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Load from file
    pub fn from_file(path: &Path) -> Result<Self, RunStateError> {
        let json = fs::read_to_string(path)?;
        Ok(Self::from_json(&json)?)
    }

    /// Write to run directory as run_state.json
    pub fn write_to_run_dir(&self, run_dir: &Path) -> Result<(), RunStateError> {
        self.write_to_file(&run_dir.join(RUN_STATE_FILENAME))
    }
}
