use thiserror::Error;

use super::Block;
use crate::transaction::Transaction;

/// Reasons a mined block is refused by the ledger.
#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("stale block: expected index {expected}, got {got}")]
    StaleIndex { expected: u64, got: u64 },

    #[error("block does not extend the current head {head}")]
    WrongParent { head: String },

    #[error("block difficulty {got} is below the chain difficulty {required}")]
    InsufficientDifficulty { required: u32, got: u32 },

    #[error("block hash does not match its content or difficulty")]
    InvalidProofOfWork,
}

/// Simple in-memory blockchain with a pending transaction pool.
#[derive(Debug)]
pub struct Blockchain {
    pub chain: Vec<Block>,
    pub pending: Vec<Transaction>,
    pub difficulty: u32,
}

impl Blockchain {
    /// Initialize a new blockchain with a genesis block.
    pub fn new(difficulty: u32) -> Self {
        Self {
            chain: vec![Block::genesis()],
            pending: Vec::new(),
            difficulty,
        }
    }

    /// Return the last block in the chain.
    pub fn last_block(&self) -> &Block {
        self.chain
            .last()
            .expect("Blockchain should always have at least the genesis block")
    }

    /// Index and hash the next block has to build on.
    pub fn latest_block(&self) -> (u64, String) {
        let last = self.last_block();
        (last.index, last.hash.clone())
    }

    pub fn add_transaction(&mut self, tx: Transaction) {
        self.pending.push(tx);
    }

    /// Copy of the pending pool.
    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.pending.clone()
    }

    /// Drop the pending transactions that made it into `mined`. Transactions
    /// submitted while the block was being mined stay in the pool.
    pub fn clear_pending_transactions(&mut self, mined: &Block) {
        self.pending
            .retain(|tx| !mined.transactions.iter().any(|m| m.id == tx.id));
    }

    /// Append a block mined outside the ledger after checking linkage and PoW.
    pub fn append_mined_block(&mut self, block: Block) -> Result<&Block, LedgerError> {
        let (head_index, head_hash) = self.latest_block();
        if block.index != head_index + 1 {
            return Err(LedgerError::StaleIndex {
                expected: head_index + 1,
                got: block.index,
            });
        }
        if block.previous_hash != head_hash {
            return Err(LedgerError::WrongParent { head: head_hash });
        }
        if block.difficulty < self.difficulty {
            return Err(LedgerError::InsufficientDifficulty {
                required: self.difficulty,
                got: block.difficulty,
            });
        }
        if !block.is_valid() {
            return Err(LedgerError::InvalidProofOfWork);
        }
        self.chain.push(block);
        Ok(self.last_block())
    }

    /// Validate the entire chain: linkage, hashes and PoW.
    pub fn is_valid_chain(&self) -> bool {
        let Some(genesis) = self.chain.first() else {
            return false;
        };

        // Validate genesis block immutability
        if genesis.index != 0
            || genesis.previous_hash != "0"
            || genesis.hash != genesis.compute_hash()
        {
            return false;
        }

        self.chain.windows(2).all(|pair| {
            let (prev, current) = (&pair[0], &pair[1]);
            current.previous_hash == prev.hash && current.is_valid()
        })
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn set_difficulty(&mut self, difficulty: u32) {
        // NOTE: Changing difficulty affects future blocks only.
        self.difficulty = difficulty;
    }
}
