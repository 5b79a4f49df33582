use std::sync::Arc;

use airdrop_merkle_core::{hash_to_hex, verify_with, ClaimProof, MAX_PROOF_DEPTH};
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct VerifyResponse {
    valid: bool,
    root: String,
}

/// `POST /api/verify`: check a proof against the loaded tree's root.
async fn verify_proof(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ClaimProof>,
) -> Result<Json<VerifyResponse>, (StatusCode, String)> {
    if body.proof.len() > MAX_PROOF_DEPTH {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("proof longer than {} elements", MAX_PROOF_DEPTH),
        ));
    }
    let tree = state.tree().await?;
    let root = tree.root();
    let valid = verify_with(
        tree.encoding(),
        &root,
        &body.proof,
        body.index,
        &body.address,
        body.amount,
    );
    Ok(Json(VerifyResponse {
        valid,
        root: hash_to_hex(&root),
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/verify", post(verify_proof))
}
