use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sender used for the block reward transaction.
pub const SYSTEM_SENDER: &str = "system";

/// Amount paid to the miner of each block.
pub const MINER_REWARD: f64 = 1.0;

/// A plain value transfer. No signatures, no balance checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// A stable identifier computed from content.
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
    pub timestamp: i64, // Unix timestamp (UTC)
}

impl Transaction {
    /// Build a transaction stamped with the current time.
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: f64) -> Self {
        Self::new_with_timestamp(sender, recipient, amount, Utc::now().timestamp())
    }

    pub fn new_with_timestamp(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: f64,
        timestamp: i64,
    ) -> Self {
        let mut tx = Self {
            id: String::new(),
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            timestamp,
        };
        tx.id = tx.compute_id();
        tx
    }

    /// Reward transaction credited to `miner`.
    pub fn reward(miner: impl Into<String>) -> Self {
        Self::new(SYSTEM_SENDER, miner, MINER_REWARD)
    }

    /// SHA-256 over sender, recipient, amount and timestamp.
    pub fn compute_id(&self) -> String {
        let preimage = format!(
            "{}{}{:.6}{}",
            self.sender, self.recipient, self.amount, self.timestamp
        );
        let mut hasher = Sha256::new();
        hasher.update(preimage.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_deterministic_for_same_content() {
        let a = Transaction::new_with_timestamp("alice", "bob", 2.5, 1_700_000_000);
        let b = Transaction::new_with_timestamp("alice", "bob", 2.5, 1_700_000_000);
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 64);
    }

    #[test]
    fn id_changes_with_amount() {
        let a = Transaction::new_with_timestamp("alice", "bob", 2.5, 1_700_000_000);
        let b = Transaction::new_with_timestamp("alice", "bob", 3.0, 1_700_000_000);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn reward_comes_from_system() {
        let tx = Transaction::reward("miner");
        assert_eq!(tx.sender, SYSTEM_SENDER);
        assert_eq!(tx.recipient, "miner");
        assert_eq!(tx.amount, MINER_REWARD);
    }
}
