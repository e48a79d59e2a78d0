use actix_web::{HttpResponse, Responder, get, post, web};
use log::{debug, warn};

use super::models::{AppState, MempoolResponse, NewTxRequest, NewTxResponse};
use crate::transaction::Transaction;

/// Add a transaction to the pending pool. It is mined with the next block.
#[post("/transactions/new/")]
pub async fn post_transaction(
    state: web::Data<AppState>,
    body: web::Json<NewTxRequest>,
) -> impl Responder {
    if body.sender.trim().is_empty() || body.recipient.trim().is_empty() {
        warn!("POST /transactions/new/ - rejected: missing sender or recipient");
        return HttpResponse::BadRequest().body("sender and recipient are required");
    }
    if !body.amount.is_finite() || body.amount <= 0.0 {
        warn!("POST /transactions/new/ - rejected: amount {}", body.amount);
        return HttpResponse::BadRequest().body("amount must be > 0");
    }

    let tx = Transaction::new(body.sender.trim(), body.recipient.trim(), body.amount);
    let id = tx.id.clone();
    {
        let mut bc = state.blockchain.lock().expect("mutex poisoned");
        bc.add_transaction(tx);
        debug!(
            "POST /transactions/new/ - id={} pending (pool size {})",
            id,
            bc.pending.len()
        );
    }

    HttpResponse::Ok().json(NewTxResponse {
        message: "Transaction added to pending transactions".to_string(),
        id,
    })
}

/// List the pending pool.
#[get("/mempool/")]
pub async fn get_mempool(state: web::Data<AppState>) -> impl Responder {
    let bc = state.blockchain.lock().expect("mutex poisoned");
    HttpResponse::Ok().json(MempoolResponse {
        size: bc.pending.len(),
        transactions: bc.pending_transactions(),
    })
}
