//! Failure taxonomy and stable exit codes

use prep_config::ConfigError;
use serde::{Deserialize, Serialize};

/// Failure kind - categorizes the cause of a failed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Command line could not be parsed
    Usage,
    /// Defaults document missing or malformed
    SchemaLoad,
    /// Override document malformed
    OverrideLoad,
    /// Override document or flag names an undeclared field
    UnknownField,
    /// Resolved values violate constraints
    Validation,
    /// Template could not be written
    Template,
    /// Working area locked by another run
    WorkDirBusy,
    /// Referenced input files missing or unsupported setup
    Preflight,
    /// External stage failed or timed out
    Stage,
    /// Run was interrupted
    Cancelled,
}

impl FailureKind {
    /// Get the stable exit code for this failure kind
    pub fn exit_code(&self) -> ExitCode {
        match self {
            FailureKind::Usage => ExitCode::Usage,
            FailureKind::SchemaLoad => ExitCode::SchemaLoad,
            FailureKind::OverrideLoad => ExitCode::OverrideLoad,
            FailureKind::UnknownField => ExitCode::UnknownField,
            FailureKind::Validation => ExitCode::Validation,
            FailureKind::Template => ExitCode::Template,
            FailureKind::WorkDirBusy => ExitCode::WorkDirBusy,
            FailureKind::Preflight => ExitCode::Preflight,
            FailureKind::Stage => ExitCode::StageFailed,
            FailureKind::Cancelled => ExitCode::Cancelled,
        }
    }

    /// Short description, printed ahead of the error detail
    pub fn description(&self) -> &'static str {
        match self {
            FailureKind::Usage => "Invalid command line",
            FailureKind::SchemaLoad => "Defaults document could not be loaded",
            FailureKind::OverrideLoad => "Override document could not be loaded",
            FailureKind::UnknownField => "Unknown configuration field",
            FailureKind::Validation => "Configuration is invalid",
            FailureKind::Template => "Template could not be written",
            FailureKind::WorkDirBusy => "Working area is in use",
            FailureKind::Preflight => "Preflight check failed",
            FailureKind::Stage => "Preparation stage failed",
            FailureKind::Cancelled => "Run cancelled",
        }
    }
}

impl From<&ConfigError> for FailureKind {
    /// Persistence errors only abort a run when writing the template;
    /// serialization errors abort whichever command emits a document
    fn from(err: &ConfigError) -> Self {
        match err {
            ConfigError::SchemaLoad { .. } => FailureKind::SchemaLoad,
            ConfigError::OverrideLoad { .. } => FailureKind::OverrideLoad,
            ConfigError::UnknownField { .. } => FailureKind::UnknownField,
            ConfigError::Validation { .. } => FailureKind::Validation,
            ConfigError::Persistence { .. } => FailureKind::Template,
            ConfigError::Serialize(_) => FailureKind::Template,
        }
    }
}

/// Stable process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Command-line usage error
    Usage = 2,
    /// Defaults document missing or malformed
    SchemaLoad = 10,
    /// Override document malformed
    OverrideLoad = 11,
    /// Unknown field in override document or command line
    UnknownField = 12,
    /// Validation failure
    Validation = 13,
    /// Template generation failure
    Template = 14,
    /// Working area lock held by another run
    WorkDirBusy = 20,
    /// Preflight failure
    Preflight = 30,
    /// External stage failure (including timeout)
    StageFailed = 50,
    /// Run was cancelled
    Cancelled = 80,
}

impl ExitCode {
    /// Get the integer value of the exit code
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }
}
