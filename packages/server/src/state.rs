use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use airdrop_merkle_core::{Address, MerkleTree};
use axum::http::StatusCode;
use tokio::sync::broadcast;

use crate::{
    cache::TtlCache,
    chain::{Campaign, HttpTransport, RpcSigner, Signer},
    claim::ClaimOrchestrator,
    config::EngineConfig,
    estimate::EstimateRefresher,
    feed::FeedClient,
};

pub type LiveCampaign = Campaign<HttpTransport>;
pub type LiveOrchestrator = ClaimOrchestrator<HttpTransport, RpcSigner<HttpTransport>>;

/// Where the allocation tree comes from.
pub enum TreeSource {
    Missing,
    /// Loaded once at startup.
    Static(Arc<MerkleTree>),
    /// Fetched from a URL and cached with a TTL.
    Feed { client: FeedClient, url: String },
}

/// Shared application state.
pub struct AppState {
    pub tree_source: TreeSource,
    /// Campaign contract (optional, requires RPC URL and campaign address).
    pub campaign: Option<Arc<LiveCampaign>>,
    /// Claim engine (optional, additionally requires a sender account).
    pub orchestrator: Option<Arc<LiveOrchestrator>>,
    /// `hasClaimed(index)` results.
    pub claimed: TtlCache<u64, bool>,
    /// Broadcast channel for server-sent events (WebSocket).
    pub event_tx: broadcast::Sender<String>,
    pub config: EngineConfig,
    /// Live estimate refreshers by allocation index.
    pub estimates: Mutex<HashMap<u64, EstimateRefresher>>,
}

impl AppState {
    pub fn new(
        tree_source: TreeSource,
        campaign: Option<Arc<LiveCampaign>>,
        orchestrator: Option<Arc<LiveOrchestrator>>,
        config: EngineConfig,
        event_tx: broadcast::Sender<String>,
    ) -> Self {
        Self {
            tree_source,
            campaign,
            orchestrator,
            claimed: TtlCache::new(config.cache_ttl),
            event_tx,
            config,
            estimates: Mutex::new(HashMap::new()),
        }
    }

    pub async fn tree(&self) -> Result<Arc<MerkleTree>, (StatusCode, String)> {
        match &self.tree_source {
            TreeSource::Static(tree) => Ok(tree.clone()),
            TreeSource::Feed { client, url } => client.tree(url).await.map_err(|e| {
                tracing::error!(error = %format!("{:#}", e), %url, "failed to load distribution feed");
                (StatusCode::BAD_GATEWAY, format!("failed to load distribution feed: {:#}", e))
            }),
            TreeSource::Missing => Err((
                StatusCode::SERVICE_UNAVAILABLE,
                "no tree configured; start server with --tree or --feed-url".to_string(),
            )),
        }
    }

    /// Account that sends claims, when claims are enabled.
    pub fn sender(&self) -> Option<Address> {
        self.orchestrator
            .as_ref()
            .and_then(|o| o.signer())
            .map(|signer| signer.address())
    }

    /// Register a refresher for `index`, returning the one it replaces.
    pub fn watch_estimate(&self, index: u64, refresher: EstimateRefresher) -> Option<EstimateRefresher> {
        self.estimates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(index, refresher)
    }

    /// Remove (and thereby stop) the refresher for `index`.
    pub fn unwatch_estimate(&self, index: u64) -> Option<EstimateRefresher> {
        self.estimates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&index)
    }

    pub fn campaign(&self) -> Result<&Arc<LiveCampaign>, (StatusCode, String)> {
        self.campaign.as_ref().ok_or((
            StatusCode::BAD_REQUEST,
            "campaign not configured; start server with --rpc-url and --campaign".to_string(),
        ))
    }
}
