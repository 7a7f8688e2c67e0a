//! Failure taxonomy and process exit codes

mod failure;

pub use failure::{ExitCode, FailureKind};
