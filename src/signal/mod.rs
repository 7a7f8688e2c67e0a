//! Signal handling for graceful shutdown (SIGINT/SIGTERM)
//!
//! On the first SIGINT or SIGTERM the run is marked for cancellation; the
//! orchestrator checks the flag before starting each stage, records the run
//! as CANCELLED and exits with code 80.
//!
//! On a second signal the running Tinker program is killed as well, so a
//! hung stage does not hold the run open.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tracing::warn;

/// Signal handler state
#[derive(Debug, Default)]
pub struct SignalState {
    /// First signal received (stop before the next stage)
    cancel_requested: AtomicBool,
    /// Second signal received (kill the running program)
    kill_requested: AtomicBool,
    signal_count: AtomicU8,
    /// Stage currently running, for the interrupt message
    current_stage: Mutex<Option<String>>,
}

impl SignalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Check if the running external program should be killed
    pub fn is_kill_requested(&self) -> bool {
        self.kill_requested.load(Ordering::SeqCst)
    }

    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    /// Handle a signal (SIGINT/SIGTERM)
    ///
    /// Returns the appropriate action to take
    pub fn handle_signal(&self) -> SignalAction {
        let count = self.signal_count.fetch_add(1, Ordering::SeqCst);

        if count == 0 {
            self.cancel_requested.store(true, Ordering::SeqCst);
            SignalAction::CancelAfterStage
        } else if count == 1 {
            self.kill_requested.store(true, Ordering::SeqCst);
            SignalAction::KillRunningProgram
        } else {
            SignalAction::Ignore
        }
    }

    pub fn set_current_stage(&self, stage: Option<&str>) {
        if let Ok(mut current) = self.current_stage.lock() {
            *current = stage.map(str::to_string);
        }
    }

    pub fn current_stage(&self) -> Option<String> {
        self.current_stage.lock().ok().and_then(|s| s.clone())
    }
}

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: finish the running stage, start no more
    CancelAfterStage,
    /// Second signal: kill the running program
    KillRunningProgram,
    /// Third+ signal: ignore
    Ignore,
}

/// Installs the process signal handler over a shared state
pub struct SignalHandler {
    state: Arc<SignalState>,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self {
            state: Arc::new(SignalState::new()),
        }
    }

    pub fn state(&self) -> Arc<SignalState> {
        Arc::clone(&self.state)
    }

    /// Install handlers for SIGINT and SIGTERM
    ///
    /// Must be called at most once per process.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let state = Arc::clone(&self.state);
        ctrlc::set_handler(move || {
            let stage = state.current_stage().unwrap_or_else(|| "setup".to_string());
            match state.handle_signal() {
                SignalAction::CancelAfterStage => {
                    warn!("Interrupt received during {stage}; stopping after the current stage (interrupt again to kill it)");
                }
                SignalAction::KillRunningProgram => {
                    warn!("Second interrupt received; killing {stage}");
                }
                SignalAction::Ignore => {}
            }
        })
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_state_initial() {
        let state = SignalState::new();
        assert!(!state.is_cancel_requested());
        assert!(!state.is_kill_requested());
        assert_eq!(state.signal_count(), 0);
    }

    #[test]
    fn test_first_signal_requests_cancellation() {
        let state = SignalState::new();
        let action = state.handle_signal();

        assert_eq!(action, SignalAction::CancelAfterStage);
        assert!(state.is_cancel_requested());
        assert!(!state.is_kill_requested());
    }

    #[test]
    fn test_second_signal_requests_kill() {
        let state = SignalState::new();

        state.handle_signal();
        let action = state.handle_signal();

        assert_eq!(action, SignalAction::KillRunningProgram);
        assert!(state.is_cancel_requested());
        assert!(state.is_kill_requested());
    }

    #[test]
    fn test_third_signal_ignored() {
        let state = SignalState::new();

        state.handle_signal();
        state.handle_signal();
        let action = state.handle_signal();

        assert_eq!(action, SignalAction::Ignore);
        assert_eq!(state.signal_count(), 3);
    }

    #[test]
    fn test_current_stage() {
        let state = SignalState::new();
        state.set_current_stage(Some("solvate"));
        assert_eq!(state.current_stage().as_deref(), Some("solvate"));

        state.set_current_stage(None);
        assert!(state.current_stage().is_none());
    }

    #[test]
    fn test_handler_shares_state() {
        let handler = SignalHandler::new();
        let state = handler.state();
        state.handle_signal();
        assert!(handler.state().is_cancel_requested());
    }
}
