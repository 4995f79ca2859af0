//! Chronicle Service: persists an agent's JSON memory document to Google
//! Drive, optionally mirrors it to a GitHub repository, and loads it back.
//!
//! Default: http://127.0.0.1:9110/

mod auth;
mod config;
mod drive_api;
mod error;
mod github_api;
mod http;
mod merge;
mod routes;
mod sync;

use config::{Config, DriveAuth};
use routes::AppState;
use std::sync::Arc;
use sync::SyncService;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = Config::from_env();

    if config.api_key.is_none() {
        log::warn!("REFLECTOR_API_KEY not set; every sync and load will be rejected");
    }
    match &config.drive {
        DriveAuth::Ready(_) => log::info!("Drive credentials loaded"),
        DriveAuth::Missing => log::warn!("TOKEN_JSON not set; Drive operations will fail"),
        DriveAuth::Invalid(e) => log::error!("{}", e),
    }
    match &config.mirror {
        Some(m) => log::info!("GitHub mirror enabled: {}/{}", m.owner, m.repo),
        None => log::info!("GitHub mirror not configured; mirroring skipped"),
    }

    let http = http::build_client(config.http_timeout).expect("Failed to create HTTP client");
    let state = Arc::new(AppState {
        service: SyncService::from_config(&config, http),
        environment: config.environment.clone(),
    });

    let cors = tower_http::cors::CorsLayer::permissive();

    let app = axum::Router::new()
        .route("/", axum::routing::get(routes::health))
        .route("/chronicle/sync", axum::routing::post(routes::sync))
        .route("/chronicle/load", axum::routing::post(routes::load))
        .with_state(state)
        .layer(cors);

    let addr = config.bind_addr();
    log::info!("Chronicle Service listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app).await.expect("Server error");
}
