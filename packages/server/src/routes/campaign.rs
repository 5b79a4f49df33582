use std::sync::Arc;

use airdrop_merkle_core::hash_to_hex;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use crate::{
    chain::{CampaignMetadata, VestingTerms},
    state::AppState,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CampaignResponse {
    #[serde(flatten)]
    metadata: CampaignMetadata,
    vesting: VestingTerms,
    /// Root of the locally loaded tree, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    tree_root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recipients: Option<usize>,
}

/// `GET /api/campaign`: on-chain metadata, variant and vesting terms.
async fn get_campaign(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CampaignResponse>, (StatusCode, String)> {
    let campaign = state.campaign()?;

    let upstream = |e: crate::chain::RpcFailure| {
        tracing::error!(error = %e, "campaign read failed");
        (StatusCode::BAD_GATEWAY, format!("campaign read failed: {}", e))
    };
    let metadata = campaign.base().metadata().await.map_err(upstream)?;
    let vesting = campaign.vesting().await.map_err(upstream)?;

    // A missing tree is not an error here.
    let tree = state.tree().await.ok();
    if let Some(tree) = &tree {
        let local = hash_to_hex(&tree.root());
        if local != metadata.merkle_root {
            tracing::warn!(local = %local, onchain = %metadata.merkle_root, "loaded tree does not match campaign root");
        }
    }

    Ok(Json(CampaignResponse {
        metadata,
        vesting,
        tree_root: tree.as_ref().map(|t| hash_to_hex(&t.root())),
        recipients: tree.as_ref().map(|t| t.len()),
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/campaign", get(get_campaign))
}
