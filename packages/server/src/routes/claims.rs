use std::sync::Arc;

use airdrop_merkle_core::{resolve, Address};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    claim::{ClaimRequest, ClaimTransaction},
    errors::{ClaimError, ErrorKind},
    state::{AppState, LiveOrchestrator},
};

#[derive(Debug, Deserialize)]
struct StatusQuery {
    /// Skip the cache and read the contract.
    #[serde(default)]
    refresh: bool,
}

#[derive(Serialize)]
struct ClaimedStatus {
    index: u64,
    claimed: bool,
}

/// `GET /api/claims/{index}/status`: on-chain `hasClaimed(index)`.
async fn claim_status(
    State(state): State<Arc<AppState>>,
    Path(index): Path<u64>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<ClaimedStatus>, (StatusCode, String)> {
    let campaign = state.campaign()?.clone();
    if query.refresh {
        state.claimed.invalidate(&index);
    }
    let claimed = state
        .claimed
        .get_or_try_insert_with(index, || async move { campaign.base().has_claimed(index).await })
        .await
        .map_err(|e| {
            tracing::error!(index, error = %e, "hasClaimed read failed");
            (StatusCode::BAD_GATEWAY, format!("hasClaimed read failed: {}", e))
        })?;
    Ok(Json(ClaimedStatus { index, claimed }))
}

fn orchestrator(state: &AppState) -> Result<Arc<LiveOrchestrator>, (StatusCode, String)> {
    state.orchestrator.clone().ok_or((
        StatusCode::BAD_REQUEST,
        "claims not enabled; start server with --rpc-url, --campaign and --sender".to_string(),
    ))
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::AlreadyInProgress => StatusCode::CONFLICT,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

/// Either a full request or just an address to look up in the tree.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClaimBody {
    Request(ClaimRequest),
    Address { address: Address },
}

/// `POST /api/claims`: start a claim. Returns once the claim has left
/// `Idle`; progress is pushed over `/ws`. 409 while another claim holds
/// the record.
async fn start_claim(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ClaimBody>,
) -> Result<(StatusCode, Json<ClaimTransaction>), (StatusCode, Json<ClaimError>)> {
    let orchestrator = orchestrator(&state)
        .map_err(|(code, msg)| (code, Json(ClaimError::invalid_request(msg))))?;

    let request = match body {
        ClaimBody::Request(request) => request,
        ClaimBody::Address { address } => {
            let tree = state
                .tree()
                .await
                .map_err(|(code, msg)| (code, Json(ClaimError::invalid_request(msg))))?;
            let record = resolve(&address, &tree).ok_or((
                StatusCode::NOT_FOUND,
                Json(ClaimError::invalid_request(format!("{} is not eligible", address))),
            ))?;
            record.into()
        }
    };

    // Rejections (bad request, claim already running) surface here; the
    // record is taken before responding so concurrent callers cannot both win.
    let pending = orchestrator
        .begin(request)
        .await
        .map_err(|e| (status_for(e.kind), Json(e)))?;
    let snapshot = pending.snapshot().clone();
    let index = pending.request().index;

    let task_state = state.clone();
    tokio::spawn(async move {
        match orchestrator.finish(pending).await {
            Ok(_) => {
                task_state.claimed.insert(index, true);
                // Nothing left to estimate for this allocation.
                task_state.unwatch_estimate(index);
            }
            Err(e) => tracing::warn!(index, kind = %e.kind, message = %e.message, "claim did not succeed"),
        }
    });

    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

/// `GET /api/claims/current`: the orchestrator's claim record.
async fn current_claim(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ClaimTransaction>, (StatusCode, String)> {
    Ok(Json(orchestrator(&state)?.status().await))
}

/// `POST /api/claims/reset`: return to idle. Does not cancel anything
/// already broadcast.
async fn reset_claim(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ClaimTransaction>, (StatusCode, String)> {
    Ok(Json(orchestrator(&state)?.reset().await))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/claims", post(start_claim))
        .route("/claims/current", get(current_claim))
        .route("/claims/reset", post(reset_claim))
        .route("/claims/{index}/status", get(claim_status))
}
