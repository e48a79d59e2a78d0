use actix_web::{HttpResponse, Responder, post, web};
use log::{error, info, warn};

use super::models::{AppState, MineFailedResponse, MineResponse, RoundStatsResponse};
use crate::blockchain::MINER_ADDRESS;
use crate::transaction::Transaction;

/// Mine the pending pool concurrently:
/// - Snapshot head, pool and difficulty
/// - Add the miner reward
/// - Race the worker pool on a blocking thread
/// - Append the winning block and drop the mined txs from the pool
#[post("/mine/")]
pub async fn mine_block(state: web::Data<AppState>) -> impl Responder {
    let (tip, mut transactions, difficulty) = {
        let bc = state.blockchain.lock().expect("mutex poisoned");
        (bc.latest_block(), bc.pending_transactions(), bc.difficulty())
    };
    transactions.push(Transaction::reward(MINER_ADDRESS));

    let settings = state.mining.clone();

    let worker_state = state.clone();
    let report = match web::block(move || {
        worker_state.coordinator.mine_round(
            tip,
            transactions,
            difficulty,
            settings.workers,
            settings.timeout,
        )
    })
    .await
    {
        Ok(report) => report,
        Err(e) => {
            error!("POST /mine/ - mining task failed: {e}");
            return HttpResponse::InternalServerError().body("mining task failed");
        }
    };
    let round = RoundStatsResponse::from(&report.stats);

    let block = match report.outcome {
        Ok(block) => block,
        Err(err) if err.is_retryable() => {
            warn!("POST /mine/ - {err}");
            return HttpResponse::ServiceUnavailable().json(MineFailedResponse {
                error: format!("Mining timed out or failed: {err}"),
                round,
            });
        }
        Err(err) => {
            error!("POST /mine/ - {err}");
            return HttpResponse::InternalServerError().json(MineFailedResponse {
                error: err.to_string(),
                round,
            });
        }
    };

    {
        let mut bc = state.blockchain.lock().expect("mutex poisoned");
        if let Err(e) = bc.append_mined_block(block.clone()) {
            warn!("POST /mine/ - mined block refused: {e}");
            return HttpResponse::Conflict().body(e.to_string());
        }
        bc.clear_pending_transactions(&block);
    }

    info!(
        "MINER - sealed block #{} (hash={}, nonce={})",
        block.index, block.hash, block.nonce
    );
    HttpResponse::Ok().json(MineResponse {
        message: "New block mined with spanning tree termination".to_string(),
        block_index: block.index,
        block,
        round,
    })
}
