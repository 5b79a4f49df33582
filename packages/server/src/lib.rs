//! Async half of the airdrop engine: campaign contracts over JSON-RPC, gas
//! estimation, the claim orchestrator, and the HTTP/WebSocket API.

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;

pub mod cache;
pub mod chain;
pub mod claim;
pub mod config;
pub mod errors;
pub mod estimate;
pub mod feed;
pub mod recipients;
pub mod routes;
pub mod state;

pub use config::EngineConfig;
pub use errors::{ClaimError, ErrorKind};
pub use state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let api = routes::api_router(state.clone());

    Router::new()
        .nest("/api", api)
        .merge(routes::ws::router().with_state(state))
        // CORS for browser wallets on other origins
        .layer(CorsLayer::very_permissive())
}
