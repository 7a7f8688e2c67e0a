//! tinker-prep - molecular dynamics system preparation
//!
//! Resolves a three-tier configuration (defaults document, override
//! document, command-line flags) and drives the Tinker toolchain through
//! conversion, alignment, solvation and ion placement.

pub mod app;
pub mod cli;
pub mod config;
pub mod lock;
pub mod logging;
pub mod pipeline;
pub mod signal;
pub mod state;
pub mod summary;
pub mod timeout;
pub mod tinker;
pub mod toolchain;

pub use config::{EffectiveConfig, PrepSettings};
pub use pipeline::{OrchestrationError, Orchestrator, PrepOutcome, RunLayout};
pub use summary::ExitCode;
pub use toolchain::{Invocation, ProcessToolchain, ToolError, ToolOutput, Toolchain};
