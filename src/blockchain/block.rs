use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::transaction::Transaction;

/// Longest difficulty a hex-encoded SHA-256 digest can satisfy.
pub const MAX_DIFFICULTY: u32 = 64;

/// A single block in the blockchain holding a list of transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: i64, // Unix timestamp (UTC)
    pub previous_hash: String,
    pub nonce: u64,   // Proof-of-Work nonce
    pub hash: String, // Cached hash of the block
    pub difficulty: u32,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create the genesis block (first block in the chain).
    pub fn genesis() -> Self {
        Self::new(0, String::from("0"), Vec::new(), 0)
    }

    /// Create a new candidate block (not mined yet).
    pub fn new(
        index: u64,
        previous_hash: String,
        transactions: Vec<Transaction>,
        difficulty: u32,
    ) -> Self {
        Self::new_with_timestamp(
            index,
            previous_hash,
            transactions,
            difficulty,
            Utc::now().timestamp(),
        )
    }

    pub fn new_with_timestamp(
        index: u64,
        previous_hash: String,
        transactions: Vec<Transaction>,
        difficulty: u32,
        timestamp: i64,
    ) -> Self {
        let mut block = Self {
            index,
            timestamp,
            previous_hash,
            nonce: 0,
            hash: String::new(),
            difficulty,
            transactions,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Compute the SHA-256 hash of this block from index, timestamp,
    /// previous hash, nonce and the concatenated transaction ids
    /// (excluding the `hash` field itself).
    pub fn compute_hash(&self) -> String {
        let tx_ids: String = self.transactions.iter().map(|tx| tx.id.as_str()).collect();
        let preimage = format!(
            "{}:{}:{}:{}:{}",
            self.index, self.timestamp, self.previous_hash, self.nonce, tx_ids
        );
        let mut hasher = Sha256::new();
        hasher.update(preimage.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Validate that the block's cached `hash` matches its content and
    /// satisfies its own PoW difficulty. (Does NOT validate chain linkage.)
    pub fn is_valid(&self) -> bool {
        self.hash == self.compute_hash() && meets_difficulty(&self.hash, self.difficulty)
    }
}

/// True when the first `difficulty` hex characters of `hash` are all `'0'`.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|c| c == b'0')
}
