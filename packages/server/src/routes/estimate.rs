use std::sync::Arc;

use airdrop_merkle_core::{resolve, Address};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::{
    claim::ClaimRequest,
    errors::ClaimError,
    estimate::{self, EstimateRefresher, GasEstimate},
    state::AppState,
};

type ApiError = (StatusCode, Json<ClaimError>);

fn reject((code, msg): (StatusCode, String)) -> ApiError {
    (code, Json(ClaimError::invalid_request(msg)))
}

/// The allocation of `address` as a claim request, and the account that
/// would pay for it (the configured sender, else the address itself).
async fn claim_for(state: &AppState, address: &str) -> Result<(ClaimRequest, Address), ApiError> {
    let address: Address = address
        .parse()
        .map_err(|e| reject((StatusCode::BAD_REQUEST, format!("{}: {}", address, e))))?;
    let tree = state.tree().await.map_err(reject)?;
    let record = resolve(&address, &tree)
        .ok_or_else(|| reject((StatusCode::NOT_FOUND, format!("{} is not eligible", address))))?;
    let payer = state.sender().unwrap_or(address);
    Ok((record.into(), payer))
}

/// `GET /api/estimate/{address}`: fee and buffered gas for claiming now.
async fn get_estimate(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<GasEstimate>, ApiError> {
    let campaign = state.campaign().map_err(reject)?;
    let (request, payer) = claim_for(&state, &address).await?;
    estimate::estimate(campaign, payer, &request)
        .await
        .map(Json)
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, Json(e)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WatchResponse {
    index: u64,
    interval_secs: u64,
}

/// `POST /api/estimate/{address}/watch`: re-estimate on a timer and push
/// `estimate:updated` events over `/ws`. Replaces any earlier watch for
/// the same allocation.
async fn start_watch(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<(StatusCode, Json<WatchResponse>), ApiError> {
    let campaign = state.campaign().map_err(reject)?.clone();
    let (request, payer) = claim_for(&state, &address).await?;
    let index = request.index;
    let interval = state.config.estimate_interval;

    let refresher = EstimateRefresher::spawn(campaign, payer, request, interval, Some(state.event_tx.clone()));
    // The replaced refresher, if any, stops when dropped.
    let previous = state.watch_estimate(index, refresher);
    if previous.is_some() {
        tracing::debug!(index, "replaced estimate watch");
    }
    tracing::info!(index, interval_secs = interval.as_secs(), "estimate watch started");

    Ok((
        StatusCode::ACCEPTED,
        Json(WatchResponse {
            index,
            interval_secs: interval.as_secs(),
        }),
    ))
}

/// `DELETE /api/estimate/{address}/watch`
async fn stop_watch(State(state): State<Arc<AppState>>, Path(address): Path<String>) -> Result<StatusCode, ApiError> {
    let (request, _) = claim_for(&state, &address).await?;
    match state.unwatch_estimate(request.index) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(reject((
            StatusCode::NOT_FOUND,
            format!("no estimate watch for index {}", request.index),
        ))),
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/estimate/{address}", get(get_estimate))
        .route("/estimate/{address}/watch", post(start_watch).delete(stop_watch))
}
