//! Run progress state machine
//!
//! Run states: QUEUED → RUNNING → {SUCCEEDED | FAILED | CANCELLED}, with a
//! record per stage.

mod run_state;

pub use run_state::{
    RunState, RunStateData, RunStateError, StageRecord, StageState, RUN_STATE_FILENAME,
};

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global sequence counter for ordering events within a single machine
static SEQUENCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Get the next sequence number for ordering
pub fn next_seq() -> u64 {
    SEQUENCE_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Get current UTC timestamp in RFC 3339 format
pub fn now_rfc3339() -> DateTime<Utc> {
    Utc::now()
}

/// Check if a state is terminal (no further transitions possible)
pub trait TerminalState {
    fn is_terminal(&self) -> bool;
}
