use std::time::Duration;

use crate::cache::DEFAULT_CACHE_TTL;

/// Runtime tunables for the claim engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Delay between receipt polls while a claim is confirming.
    pub poll_interval: Duration,
    /// Receipt polls before a submitted transaction is treated as dropped.
    pub max_confirmation_polls: u32,
    /// TTL for cached feeds, descriptors and claimed-status lookups.
    pub cache_ttl: Duration,
    /// How often a live estimate is refreshed.
    pub estimate_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_confirmation_polls: 90,
            cache_ttl: DEFAULT_CACHE_TTL,
            estimate_interval: Duration::from_secs(15),
        }
    }
}
