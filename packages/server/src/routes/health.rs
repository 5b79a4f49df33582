use std::sync::Arc;

use airdrop_merkle_core::Address;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::{AppState, TreeSource};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    campaign: Option<Address>,
    tree_source: &'static str,
    claims_enabled: bool,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        campaign: state.campaign.as_ref().map(|c| c.address()),
        tree_source: match state.tree_source {
            TreeSource::Missing => "none",
            TreeSource::Static(_) => "file",
            TreeSource::Feed { .. } => "feed",
        },
        claims_enabled: state.orchestrator.is_some(),
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}
