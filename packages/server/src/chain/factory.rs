//! Variant detection and campaign construction.

use std::sync::Arc;

use airdrop_merkle_core::Address;

use super::{
    abi,
    campaign::{Campaign, ContractDescriptor, Variant},
    rpc::{BlockTag, ChainClient, RpcFailure, Transport},
};
use crate::cache::{TtlCache, DEFAULT_CACHE_TTL};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FactoryError {
    #[error("{0} does not look like a known campaign contract")]
    UnknownVariant(Address),
    #[error(transparent)]
    Rpc(#[from] RpcFailure),
}

/// Probe `signature` with no arguments. A revert or empty return means
/// the accessor is absent; transport trouble is an error, not an answer.
async fn probe<T: Transport>(
    client: &ChainClient<T>,
    address: &Address,
    signature: &str,
) -> Result<Option<Vec<u8>>, RpcFailure> {
    let data = abi::encode_call(signature, &[]);
    match client.call(address, &data, None, 0, BlockTag::Latest).await {
        Ok(out) if out.is_empty() => Ok(None),
        Ok(out) => Ok(Some(out)),
        Err(e) if e.is_revert() => {
            tracing::debug!(%address, signature, error = %e, "probe reverted");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Identify a campaign by what it answers to:
///
/// 1. `LOCKUP()` returning a non-zero address means a vesting variant,
/// 2. among those, `getSchedule()` answering means linear, else tranched,
/// 3. without a lockup, `MERKLE_ROOT()` answering means instant.
pub async fn detect_variant<T: Transport>(client: &ChainClient<T>, address: &Address) -> Result<Variant, FactoryError> {
    let lockup = probe(client, address, "LOCKUP()")
        .await?
        .and_then(|out| abi::decode_address(&out, 0).ok())
        .filter(|a| !a.is_zero());

    if let Some(lockup) = lockup {
        // Tranched campaigns are inferred from the schedule accessor being
        // absent, not positively identified.
        let variant = match probe(client, address, "getSchedule()").await? {
            Some(out) if out.len() >= 5 * 32 => Variant::LinearVesting,
            _ => Variant::TranchedVesting,
        };
        tracing::info!(%address, %lockup, %variant, "detected vesting campaign");
        return Ok(variant);
    }

    match probe(client, address, "MERKLE_ROOT()").await? {
        Some(out) if out.len() >= 32 => {
            tracing::info!(%address, "detected instant campaign");
            Ok(Variant::Instant)
        }
        _ => Err(FactoryError::UnknownVariant(*address)),
    }
}

/// Builds campaign handles, remembering detected variants per address.
pub struct CampaignFactory<T> {
    client: ChainClient<T>,
    chain_id: u64,
    descriptors: TtlCache<Address, ContractDescriptor>,
}

impl<T: Transport> CampaignFactory<T> {
    pub fn new(client: ChainClient<T>, chain_id: u64) -> Self {
        Self::with_ttl(client, chain_id, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(client: ChainClient<T>, chain_id: u64, ttl: std::time::Duration) -> Self {
        Self {
            client,
            chain_id,
            descriptors: TtlCache::new(ttl),
        }
    }

    /// Ask the node which chain it serves, so descriptors carry the right id.
    pub async fn connect(client: ChainClient<T>) -> Result<Self, RpcFailure> {
        let chain_id = client.chain_id().await?;
        Ok(Self::new(client, chain_id))
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn client(&self) -> &ChainClient<T> {
        &self.client
    }

    pub async fn detect_variant(&self, address: &Address) -> Result<Variant, FactoryError> {
        Ok(self.descriptor(address).await?.variant)
    }

    async fn descriptor(&self, address: &Address) -> Result<ContractDescriptor, FactoryError> {
        let chain_id = self.chain_id;
        self.descriptors
            .get_or_try_insert_with(*address, || async {
                let variant = detect_variant(&self.client, address).await?;
                Ok::<_, FactoryError>(ContractDescriptor {
                    address: *address,
                    chain_id,
                    variant,
                })
            })
            .await
    }

    /// Construct a handle for a campaign whose variant is already known.
    pub fn create(&self, descriptor: ContractDescriptor) -> Arc<Campaign<T>> {
        Arc::new(Campaign::new(self.client.clone(), descriptor))
    }

    pub async fn create_auto(&self, address: &Address) -> Result<Arc<Campaign<T>>, FactoryError> {
        let descriptor = self.descriptor(address).await?;
        Ok(self.create(descriptor))
    }

    /// Drop a remembered descriptor, e.g. after a redeploy at the same address.
    pub fn forget(&self, address: &Address) {
        self.descriptors.invalidate(address);
    }
}
