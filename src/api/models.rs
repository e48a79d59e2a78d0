use crate::blockchain::{Block, Blockchain};
use crate::config::MiningSettings;
use crate::miner::{
    DeadlockDetector, MiningCoordinator, NodeSnapshot, ProcessId, ResourceId, RoundStats,
};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Shared application state: ledger, mining setup and the deadlock detector.
pub struct AppState {
    pub blockchain: Mutex<Blockchain>,
    pub coordinator: MiningCoordinator,
    pub mining: MiningSettings,
    pub detector: DeadlockDetector,
}

impl AppState {
    pub fn new(mining: MiningSettings) -> Self {
        Self {
            blockchain: Mutex::new(Blockchain::new(mining.difficulty)),
            coordinator: MiningCoordinator::new(),
            mining,
            detector: DeadlockDetector::new(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(MiningSettings::default())
    }
}

/* ---------- Chain API Models ---------- */

#[derive(Serialize)]
pub struct ChainResponse<'a> {
    pub length: usize,
    pub difficulty: u32,
    pub chain: &'a [Block],
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub length: usize,
    pub difficulty: u32,
}

#[derive(Serialize)]
pub struct DifficultyResponse {
    pub difficulty: u32,
}

#[derive(Deserialize)]
pub struct SetDifficultyRequest {
    pub difficulty: u32,
}

/* ---------- Mining API Models ---------- */

#[derive(Serialize)]
pub struct RoundStatsResponse {
    pub round_id: String,
    pub workers: usize,
    pub workers_exited: usize,
    pub hashes: u64,
    pub elapsed_ms: u128,
    pub termination_confirmed: bool,
    pub tree: Vec<NodeSnapshot>,
}

impl From<&RoundStats> for RoundStatsResponse {
    fn from(stats: &RoundStats) -> Self {
        Self {
            round_id: stats.round_id.clone(),
            workers: stats.workers_requested,
            workers_exited: stats.workers_exited,
            hashes: stats.hashes,
            elapsed_ms: stats.elapsed.as_millis(),
            termination_confirmed: stats.termination_confirmed,
            tree: stats.tree.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct MineResponse {
    pub message: String,
    pub block_index: u64,
    pub block: Block,
    pub round: RoundStatsResponse,
}

#[derive(Serialize)]
pub struct MineFailedResponse {
    pub error: String,
    pub round: RoundStatsResponse,
}

/* ---------- TX API Models ---------- */

#[derive(Deserialize)]
pub struct NewTxRequest {
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
}

#[derive(Serialize)]
pub struct NewTxResponse {
    pub message: String,
    pub id: String,
}

#[derive(Serialize)]
pub struct MempoolResponse {
    pub size: usize,
    pub transactions: Vec<crate::transaction::Transaction>,
}

/* ---------- Deadlock API Models ---------- */

#[derive(Deserialize)]
pub struct ResourceEdgeRequest {
    pub process: ProcessId,
    pub resource: ResourceId,
}

#[derive(Serialize)]
pub struct DeadlockResponse {
    pub deadlocked: bool,
    pub cycles: Vec<Vec<ProcessId>>,
}
