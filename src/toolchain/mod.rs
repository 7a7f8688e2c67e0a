//! External toolchain seam
//!
//! The orchestrator never spawns processes itself. It describes each Tinker
//! program call as an [`Invocation`] and hands it to a [`Toolchain`], so a
//! fake toolchain can stand in for the real binaries in tests.

mod process;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use process::ProcessToolchain;

/// One call of an external program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name inside the toolchain directory (e.g. `xyzedit`)
    pub program: String,
    pub args: Vec<String>,
    /// Text fed to the program's standard input
    pub stdin: String,
    /// Directory the program runs in
    pub work_dir: PathBuf,
}

impl Invocation {
    pub fn new(program: impl Into<String>, work_dir: &Path) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: String::new(),
            work_dir: work_dir.to_path_buf(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = input.into();
        self
    }

    /// Command line for log messages
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Captured output of a successful invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn from_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

/// Errors from running an external program
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{program} not found at {}", .path.display())]
    NotFound { program: String, path: PathBuf },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {}: {}", exit_status(*.status), .stderr.trim())]
    Failed {
        program: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("{program} timed out after {seconds}s and was killed")]
    TimedOut { program: String, seconds: u64 },

    #[error("{program} was killed on interrupt")]
    Cancelled { program: String },

    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl ToolError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ToolError::Cancelled { .. })
    }
}

fn exit_status(status: Option<i32>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

/// Runs external programs on behalf of the orchestrator
pub trait Toolchain {
    /// Run the program to completion
    ///
    /// A non-zero exit is an error carrying the program's stderr.
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError>;
}

impl<T: Toolchain + ?Sized> Toolchain for &T {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
        (**self).run(invocation)
    }
}
