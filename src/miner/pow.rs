//! Nonce search for a single worker.
//!
//! A worker owns its candidate block outright and mutates only the nonce and
//! the cached hash. Cancellation is cooperative: the cheap check runs on every
//! nonce, the heavier one every [`CANCEL_CHECK_INTERVAL`] nonces.

use log::debug;

use crate::blockchain::{Block, meets_difficulty};

/// Nonces hashed between two heavy cancellation checks.
pub const CANCEL_CHECK_INTERVAL: u64 = 1_000;

/// Cooperative cancellation source consulted by [`mine`].
pub trait CancelSignal {
    /// Cheap check, run before every hash.
    fn is_cancelled(&self) -> bool;

    /// Heavier check, run every [`CANCEL_CHECK_INTERVAL`] hashes.
    fn checkpoint(&self) -> bool {
        self.is_cancelled()
    }
}

impl<F> CancelSignal for F
where
    F: Fn() -> bool,
{
    fn is_cancelled(&self) -> bool {
        self()
    }
}

/// Disjoint nonce sequence for one worker: `start, start + stride, ...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceSchedule {
    pub start: u64,
    pub stride: u64,
}

impl NonceSchedule {
    /// Every nonce from zero.
    pub fn single() -> Self {
        Self {
            start: 0,
            stride: 1,
        }
    }

    /// Worker `worker` of `workers` takes every `workers`-th nonce.
    pub fn for_worker(worker: usize, workers: usize) -> Self {
        Self {
            start: worker as u64,
            stride: workers.max(1) as u64,
        }
    }
}

/// Result of one nonce search.
#[derive(Debug, Clone)]
pub enum MineOutcome {
    Found { block: Block, hashes: u64 },
    Cancelled { hashes: u64 },
}

impl MineOutcome {
    pub fn hashes(&self) -> u64 {
        match self {
            MineOutcome::Found { hashes, .. } | MineOutcome::Cancelled { hashes } => *hashes,
        }
    }

    pub fn into_block(self) -> Option<Block> {
        match self {
            MineOutcome::Found { block, .. } => Some(block),
            MineOutcome::Cancelled { .. } => None,
        }
    }
}

/// Search nonces until the block's hash meets `block.difficulty` or `cancel`
/// fires. A cancelled search stops hashing immediately.
pub fn mine<C>(mut block: Block, schedule: NonceSchedule, cancel: &C) -> MineOutcome
where
    C: CancelSignal + ?Sized,
{
    block.nonce = schedule.start;
    let mut hashes: u64 = 0;

    loop {
        if cancel.is_cancelled()
            || (hashes > 0 && hashes % CANCEL_CHECK_INTERVAL == 0 && cancel.checkpoint())
        {
            return MineOutcome::Cancelled { hashes };
        }

        block.hash = block.compute_hash();
        hashes += 1;

        if meets_difficulty(&block.hash, block.difficulty) {
            debug!(
                "found nonce={} for block #{} after {} hashes",
                block.nonce, block.index, hashes
            );
            return MineOutcome::Found { block, hashes };
        }

        block.nonce = block.nonce.wrapping_add(schedule.stride);
    }
}
