pub mod block;
pub mod model;

pub use block::{Block, MAX_DIFFICULTY, meets_difficulty};
pub use model::{Blockchain, LedgerError};

/// Default Proof-of-Work difficulty (number of leading zeros).
pub const DEFAULT_DIFFICULTY: u32 = 4;

/// Highest difficulty accepted over the API (keep low in dev to avoid long waits)
pub const DIFF_MAX: u32 = 6;

/// Recipient of the reward transaction for blocks mined by this node.
pub const MINER_ADDRESS: &str = "miner";
