//! Concurrent proof-of-work mining with tree-based termination detection,
//! plus a wait-for graph deadlock detector.

pub mod coordinator;
pub mod deadlock;
pub mod error;
pub mod pow;
pub mod termination;

pub use coordinator::{
    DEFAULT_TIMEOUT, MiningCoordinator, RoundReport, RoundStats, default_worker_count,
};
pub use deadlock::{DeadlockDetector, DeadlockReport, ProcessId, ResourceId};
pub use error::{MiningError, TerminationInconsistency};
pub use pow::{CancelSignal, MineOutcome, NonceSchedule, mine};
pub use termination::{Color, NodeSnapshot, TerminationTree};
