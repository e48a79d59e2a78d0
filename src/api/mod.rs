mod chain;
mod deadlock;
mod health;
mod mining;
pub mod models;
mod tx;

use actix_web::web::{self, ServiceConfig};

pub use models::AppState;

pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(health::health_check)
            .service(chain::get_chain)
            .service(chain::validate_chain)
            .service(chain::get_difficulty)
            .service(chain::set_difficulty)
            .service(mining::mine_block)
            .service(tx::post_transaction)
            .service(tx::get_mempool)
            .service(deadlock::add_allocation)
            .service(deadlock::add_wait_for)
            .service(deadlock::detect),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MiningSettings;
    use actix_web::{App, http::StatusCode, test};
    use serde_json::{Value, json};
    use std::time::Duration;

    fn state(difficulty: u32, timeout: Duration) -> web::Data<AppState> {
        web::Data::new(AppState::new(MiningSettings {
            workers: 2,
            difficulty,
            timeout,
        }))
    }

    #[actix_web::test]
    async fn health_is_up() {
        let app = test::init_service(
            App::new()
                .app_data(state(1, Duration::from_secs(30)))
                .configure(init_routes),
        )
        .await;
        let req = test::TestRequest::get().uri("/api/v1/health/").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn transaction_then_mine_appends_block() {
        let data = state(1, Duration::from_secs(30));
        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .configure(init_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/transactions/new/")
            .set_json(json!({ "sender": "alice", "recipient": "bob", "amount": 2.5 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::post().uri("/api/v1/mine/").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["block_index"], 1);
        assert_eq!(body["round"]["workers_exited"], 2);
        assert_eq!(body["round"]["termination_confirmed"], true);
        assert_eq!(body["round"]["tree"][0]["color"], "white");
        assert_eq!(body["round"]["tree"][0]["children"], json!([1]));
        // pending tx + reward
        assert_eq!(body["block"]["transactions"].as_array().map(Vec::len), Some(2));

        let bc = data.blockchain.lock().unwrap();
        assert_eq!(bc.len(), 2);
        assert!(bc.pending.is_empty());
        assert!(bc.is_valid_chain());
    }

    #[actix_web::test]
    async fn mining_timeout_is_unavailable() {
        let data = state(1, Duration::from_millis(50));
        data.blockchain.lock().unwrap().set_difficulty(64);
        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .configure(init_routes),
        )
        .await;

        let req = test::TestRequest::post().uri("/api/v1/mine/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["round"]["workers_exited"], 2);
        assert_eq!(data.blockchain.lock().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn rejects_high_difficulty() {
        let app = test::init_service(
            App::new()
                .app_data(state(1, Duration::from_secs(30)))
                .configure(init_routes),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/api/v1/difficulty/")
            .set_json(json!({ "difficulty": 7 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn deadlock_endpoints_report_cycle() {
        let app = test::init_service(
            App::new()
                .app_data(state(1, Duration::from_secs(30)))
                .configure(init_routes),
        )
        .await;

        for (uri, process, resource) in [
            ("/api/v1/deadlock/allocations/", 1, 1),
            ("/api/v1/deadlock/allocations/", 2, 2),
            ("/api/v1/deadlock/waits/", 1, 2),
            ("/api/v1/deadlock/waits/", 2, 1),
        ] {
            let req = test::TestRequest::post()
                .uri(uri)
                .set_json(json!({ "process": process, "resource": resource }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        }

        let req = test::TestRequest::get().uri("/api/v1/deadlock/").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["deadlocked"], true);
        assert_eq!(body["cycles"], json!([[1, 2, 1]]));
    }
}
