//! Fetching distribution data (a published feed or a bare tree dump) over
//! HTTP, cached per URL.

use std::{path::Path, sync::Arc, time::Duration};

use airdrop_merkle_core::{DistributionFeed, MerkleTree};
use anyhow::{bail, Context, Result};
use serde_json::Value;

use crate::cache::TtlCache;

/// Parse either a [`DistributionFeed`] or a persisted tree. Both are fully
/// validated before a tree is returned.
pub fn parse_distribution(body: &str) -> Result<MerkleTree> {
    let value: Value = serde_json::from_str(body).context("distribution data is not JSON")?;

    if value.get("merkle_tree").is_some() {
        let feed: DistributionFeed =
            serde_json::from_value(value).context("invalid distribution feed")?;
        return feed.into_tree().context("distribution feed failed validation");
    }
    if value.get("format").is_some() {
        return MerkleTree::import_json(body).context("tree dump failed validation");
    }
    bail!("unrecognized distribution data: expected a feed or a tree dump")
}

/// Load a tree from a local file in either format.
pub fn load_tree_file(path: &Path) -> Result<MerkleTree> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_distribution(&body).with_context(|| format!("failed to load {}", path.display()))
}

pub struct FeedClient {
    http: reqwest::Client,
    trees: TtlCache<String, Arc<MerkleTree>>,
}

impl FeedClient {
    pub fn new(ttl: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            trees: TtlCache::new(ttl),
        }
    }

    /// Tree behind `url`, from cache while fresh.
    pub async fn tree(&self, url: &str) -> Result<Arc<MerkleTree>> {
        self.trees
            .get_or_try_insert_with(url.to_string(), || async {
                let tree = self.fetch(url).await?;
                Ok::<_, anyhow::Error>(Arc::new(tree))
            })
            .await
    }

    /// Drop the cached tree so the next lookup refetches.
    pub fn refresh(&self, url: &str) {
        self.trees.invalidate(&url.to_string());
    }

    async fn fetch(&self, url: &str) -> Result<MerkleTree> {
        tracing::info!(%url, "fetching distribution feed");
        let body = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?
            .error_for_status()
            .with_context(|| format!("GET {} returned an error status", url))?
            .text()
            .await
            .context("failed to read feed body")?;

        let tree = parse_distribution(&body)?;
        tracing::info!(
            %url,
            recipients = tree.len(),
            root = %airdrop_merkle_core::hash_to_hex(&tree.root()),
            "distribution feed loaded"
        );
        Ok(tree)
    }
}
