use std::time::Duration;

use thiserror::Error;

/// Mining errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MiningError {
    /// No worker found a valid nonce before the deadline
    #[error("mining timed out after {elapsed:?} without a valid nonce")]
    TimedOut { elapsed: Duration },

    /// Every worker exited without delivering a block
    #[error("all mining workers exited without a result")]
    AllWorkersFailed,

    #[error("invalid mining configuration: {0}")]
    InvalidConfig(String),
}

impl MiningError {
    /// Whether starting a fresh round may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MiningError::TimedOut { .. } | MiningError::AllWorkersFailed
        )
    }
}

/// The fast stop flag and the tree walk disagree after a round drained.
/// Logged, never returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("termination inconsistency: stop flag={stop_flag}, tree confirmed={tree_confirmed}")]
pub struct TerminationInconsistency {
    pub stop_flag: bool,
    pub tree_confirmed: bool,
}
