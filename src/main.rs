use actix_web::{App, HttpServer, rt, web};
use dotenvy::dotenv;
use log::info;

use concurrent_pow::api::{self, AppState};
use concurrent_pow::config::Config;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let config = Config::from_env();
    println!(
        "⛓️ Starting blockchain API at http://{}:{} ({} miners, difficulty {})",
        config.host, config.port, config.mining.workers, config.mining.difficulty
    );

    let state = web::Data::new(AppState::new(config.mining.clone()));

    // Initial check, then periodic scans for deadlocks among tracked processes.
    state.detector.scan();
    if let Some(period) = config.deadlock_scan_interval {
        let scanner = state.clone();
        rt::spawn(async move {
            let mut ticker = rt::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                info!("running scheduled deadlock detection");
                scanner.detector.scan();
            }
        });
    }

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
