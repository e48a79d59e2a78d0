pub mod model;

pub use model::{MINER_REWARD, SYSTEM_SENDER, Transaction};
