use std::sync::Arc;

use airdrop_merkle_core::{resolve, resolve_batch, Address, EligibilityRecord};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::state::AppState;

/// Upper bound on addresses per batch request.
const MAX_BATCH: usize = 1_000;

/// `GET /api/eligibility/{address}`: index, amount and proof, or 404.
async fn get_eligibility(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<EligibilityRecord>, (StatusCode, String)> {
    let address: Address = address
        .parse()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("{}: {}", address, e)))?;
    let tree = state.tree().await?;
    resolve(&address, &tree)
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("{} is not eligible", address)))
}

#[derive(Debug, Deserialize)]
struct BatchRequest {
    addresses: Vec<Address>,
}

/// `POST /api/eligibility/batch`: one entry per address, `null` when not
/// eligible, in request order.
async fn batch_eligibility(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BatchRequest>,
) -> Result<Json<Vec<Option<EligibilityRecord>>>, (StatusCode, String)> {
    if body.addresses.len() > MAX_BATCH {
        return Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("at most {} addresses per request", MAX_BATCH),
        ));
    }
    let tree = state.tree().await?;
    Ok(Json(resolve_batch(&body.addresses, &tree)))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/eligibility/batch", post(batch_eligibility))
        .route("/eligibility/{address}", get(get_eligibility))
}
