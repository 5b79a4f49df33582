//! Campaign contracts: one shared read/claim surface and three variants
//! that differ in what a claim does.

use airdrop_merkle_core::{
    hash_to_hex,
    schedule::{validate_tranches, LinearSchedule, Tranche},
    tree::amount_string,
    Address, Hash32,
};
use serde::{Deserialize, Serialize};

use super::{
    abi::{self, Token},
    rpc::{BlockTag, ChainClient, Receipt, RpcFailure, Transport, TxRequest},
    wallet::Signer,
};
use crate::{
    claim::ClaimRequest,
    errors::{self, ClaimError, ErrorKind},
};

pub const CLAIM_SIGNATURE: &str = "claim(uint256,address,uint128,bytes32[])";
pub const STREAM_CLAIM_EVENT: &str = "Claim(uint256,address,uint128,uint256)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Variant {
    Instant,
    LinearVesting,
    TranchedVesting,
}

impl Variant {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Instant => "instant",
            Self::LinearVesting => "linearVesting",
            Self::TranchedVesting => "tranchedVesting",
        }
    }

    /// Whether a successful claim creates a lockup stream.
    pub fn creates_stream(self) -> bool {
        !matches!(self, Self::Instant)
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enough to rebuild a campaign handle without probing again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDescriptor {
    pub address: Address,
    pub chain_id: u64,
    pub variant: Variant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignMetadata {
    pub address: Address,
    pub chain_id: u64,
    pub variant: Variant,
    pub name: String,
    pub merkle_root: String,
    #[serde(with = "amount_string")]
    pub fee: u128,
    pub expired: bool,
    /// Unix seconds; zero means the campaign never expires.
    pub expiration: u64,
    pub admin: Address,
    pub token: Address,
}

/// Unlock terms of the streams a campaign creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum VestingTerms {
    None,
    Linear { schedule: LinearSchedule },
    Tranched { tranches: Vec<Tranche> },
}

/// Reads and transaction builders every variant shares.
pub struct CampaignBase<T> {
    client: ChainClient<T>,
    descriptor: ContractDescriptor,
}

impl<T: Transport> CampaignBase<T> {
    pub fn new(client: ChainClient<T>, descriptor: ContractDescriptor) -> Self {
        Self { client, descriptor }
    }

    pub fn client(&self) -> &ChainClient<T> {
        &self.client
    }

    pub fn descriptor(&self) -> &ContractDescriptor {
        &self.descriptor
    }

    pub fn address(&self) -> Address {
        self.descriptor.address
    }

    async fn read(&self, signature: &str, args: &[Token]) -> Result<Vec<u8>, RpcFailure> {
        let data = abi::encode_call(signature, args);
        self.client
            .call(&self.descriptor.address, &data, None, 0, BlockTag::Latest)
            .await
    }

    pub async fn campaign_name(&self) -> Result<String, RpcFailure> {
        let out = self.read("campaignName()", &[]).await?;
        Ok(abi::decode_string(&out)?)
    }

    pub async fn merkle_root(&self) -> Result<Hash32, RpcFailure> {
        let out = self.read("MERKLE_ROOT()", &[]).await?;
        Ok(abi::decode_bytes32(&out, 0)?)
    }

    pub async fn fee(&self) -> Result<u128, RpcFailure> {
        let out = self.read("FEE()", &[]).await?;
        Ok(abi::decode_uint(&out, 0)?)
    }

    pub async fn has_expired(&self) -> Result<bool, RpcFailure> {
        let out = self.read("hasExpired()", &[]).await?;
        Ok(abi::decode_bool(&out, 0)?)
    }

    pub async fn has_claimed(&self, index: u64) -> Result<bool, RpcFailure> {
        let out = self.read("hasClaimed(uint256)", &[Token::Uint(index as u128)]).await?;
        Ok(abi::decode_bool(&out, 0)?)
    }

    pub async fn admin(&self) -> Result<Address, RpcFailure> {
        let out = self.read("admin()", &[]).await?;
        Ok(abi::decode_address(&out, 0)?)
    }

    pub async fn expiration(&self) -> Result<u64, RpcFailure> {
        let out = self.read("EXPIRATION()", &[]).await?;
        Ok(abi::decode_u64(&out, 0)?)
    }

    pub async fn token(&self) -> Result<Address, RpcFailure> {
        let out = self.read("TOKEN()", &[]).await?;
        Ok(abi::decode_address(&out, 0)?)
    }

    pub async fn metadata(&self) -> Result<CampaignMetadata, RpcFailure> {
        Ok(CampaignMetadata {
            address: self.descriptor.address,
            chain_id: self.descriptor.chain_id,
            variant: self.descriptor.variant,
            name: self.campaign_name().await?,
            merkle_root: hash_to_hex(&self.merkle_root().await?),
            fee: self.fee().await?,
            expired: self.has_expired().await?,
            expiration: self.expiration().await?,
            admin: self.admin().await?,
            token: self.token().await?,
        })
    }

    pub fn claim_calldata(request: &ClaimRequest) -> Vec<u8> {
        abi::encode_call(
            CLAIM_SIGNATURE,
            &[
                Token::Uint(request.index as u128),
                Token::Address(request.recipient),
                Token::Uint(request.amount),
                Token::Bytes32Array(request.proof.clone()),
            ],
        )
    }

    /// The payable `claim` transaction, sent with `value = fee`.
    pub fn claim_tx(&self, from: Address, request: &ClaimRequest, fee: u128, gas: Option<u64>) -> TxRequest {
        TxRequest {
            from,
            to: self.descriptor.address,
            data: Self::claim_calldata(request),
            value: fee,
            gas,
        }
    }

    pub async fn estimate_claim_gas(&self, from: Address, request: &ClaimRequest, fee: u128) -> Result<u64, RpcFailure> {
        self.client.estimate_gas(&self.claim_tx(from, request, fee, None)).await
    }

    /// Re-run the transaction as an `eth_call` at `block` to get its
    /// revert payload.
    pub async fn replay(&self, tx: &TxRequest, block: u64) -> RpcFailure {
        match self
            .client
            .call(&tx.to, &tx.data, Some(&tx.from), tx.value, BlockTag::Number(block))
            .await
        {
            Err(failure) => failure,
            // The call no longer reverts at that block; nothing to decode.
            Ok(_) => RpcFailure::Rpc {
                code: 3,
                message: "transaction reverted without a reason".to_string(),
                data: None,
            },
        }
    }

    // -- admin -------------------------------------------------------------

    async fn require_admin<S: Signer>(&self, signer: &S) -> Result<(), ClaimError> {
        let admin = self.admin().await?;
        if admin != signer.address() {
            return Err(ClaimError::new(
                ErrorKind::AccessDenied,
                format!("{} is not the campaign admin ({})", signer.address(), admin),
            ));
        }
        Ok(())
    }

    async fn send<S: Signer>(&self, signer: &S, data: Vec<u8>) -> Result<Hash32, ClaimError> {
        let tx = TxRequest {
            from: signer.address(),
            to: self.descriptor.address,
            data,
            value: 0,
            gas: None,
        };
        signer
            .send_transaction(tx)
            .await
            .map_err(|e| errors::describe(&e))
    }

    /// Return unclaimed tokens to `to`.
    pub async fn clawback<S: Signer>(&self, signer: &S, to: Address, amount: u128) -> Result<Hash32, ClaimError> {
        self.require_admin(signer).await?;
        let data = abi::encode_call(
            "clawback(address,uint128)",
            &[Token::Address(to), Token::Uint(amount)],
        );
        tracing::info!(campaign = %self.address(), %to, amount = %amount, "clawback");
        self.send(signer, data).await
    }

    pub async fn transfer_admin<S: Signer>(&self, signer: &S, new_admin: Address) -> Result<Hash32, ClaimError> {
        self.require_admin(signer).await?;
        let data = abi::encode_call("transferAdmin(address)", &[Token::Address(new_admin)]);
        tracing::info!(campaign = %self.address(), %new_admin, "transferring admin");
        self.send(signer, data).await
    }

    /// Only the factory may call this; the contract enforces it.
    pub async fn collect_fees<S: Signer>(&self, signer: &S, factory_admin: Address) -> Result<Hash32, ClaimError> {
        let data = abi::encode_call("collectFees(address)", &[Token::Address(factory_admin)]);
        self.send(signer, data).await
    }
}

pub struct InstantCampaign<T> {
    pub base: CampaignBase<T>,
}

pub struct LinearCampaign<T> {
    pub base: CampaignBase<T>,
}

impl<T: Transport> LinearCampaign<T> {
    pub async fn lockup(&self) -> Result<Address, RpcFailure> {
        let out = self.base.read("LOCKUP()", &[]).await?;
        Ok(abi::decode_address(&out, 0)?)
    }

    pub async fn schedule(&self) -> Result<LinearSchedule, RpcFailure> {
        let out = self.base.read("getSchedule()", &[]).await?;
        decode_schedule(&out)
    }
}

pub struct TranchedCampaign<T> {
    pub base: CampaignBase<T>,
}

impl<T: Transport> TranchedCampaign<T> {
    pub async fn lockup(&self) -> Result<Address, RpcFailure> {
        let out = self.base.read("LOCKUP()", &[]).await?;
        Ok(abi::decode_address(&out, 0)?)
    }

    pub async fn tranches(&self) -> Result<Vec<Tranche>, RpcFailure> {
        let out = self.base.read("getTranchesWithPercentages()", &[]).await?;
        decode_tranches(&out)
    }
}

/// `(uint40 startTime, UD2x18 startPercentage, uint40 cliffDuration,
/// UD2x18 cliffPercentage, uint40 totalDuration)`
pub fn decode_schedule(out: &[u8]) -> Result<LinearSchedule, RpcFailure> {
    let schedule = LinearSchedule {
        start_time: abi::decode_u64(out, 0)?,
        start_unlock_percentage: abi::decode_u64(out, 1)?,
        cliff_duration: abi::decode_u64(out, 2)?,
        cliff_unlock_percentage: abi::decode_u64(out, 3)?,
        total_duration: abi::decode_u64(out, 4)?,
    };
    schedule
        .validate()
        .map_err(|e| RpcFailure::Decode(format!("getSchedule: {}", e)))?;
    Ok(schedule)
}

/// `(UD2x18 unlockPercentage, uint40 duration)[]`
pub fn decode_tranches(out: &[u8]) -> Result<Vec<Tranche>, RpcFailure> {
    let tranches = abi::decode_tuple_array(out, 2)?
        .into_iter()
        .map(|elem| -> Result<Tranche, abi::AbiError> {
            Ok(Tranche {
                unlock_percentage: abi::decode_u64(elem, 0)?,
                duration: abi::decode_u64(elem, 1)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    validate_tranches(&tranches)
        .map_err(|e| RpcFailure::Decode(format!("getTranchesWithPercentages: {}", e)))?;
    Ok(tranches)
}

/// A campaign handle of known variant.
pub enum Campaign<T> {
    Instant(InstantCampaign<T>),
    LinearVesting(LinearCampaign<T>),
    TranchedVesting(TranchedCampaign<T>),
}

impl<T: Transport> Campaign<T> {
    pub fn new(client: ChainClient<T>, descriptor: ContractDescriptor) -> Self {
        let base = CampaignBase::new(client, descriptor);
        match descriptor.variant {
            Variant::Instant => Self::Instant(InstantCampaign { base }),
            Variant::LinearVesting => Self::LinearVesting(LinearCampaign { base }),
            Variant::TranchedVesting => Self::TranchedVesting(TranchedCampaign { base }),
        }
    }

    pub fn base(&self) -> &CampaignBase<T> {
        match self {
            Self::Instant(c) => &c.base,
            Self::LinearVesting(c) => &c.base,
            Self::TranchedVesting(c) => &c.base,
        }
    }

    pub fn variant(&self) -> Variant {
        self.base().descriptor.variant
    }

    pub fn address(&self) -> Address {
        self.base().address()
    }

    pub async fn vesting(&self) -> Result<VestingTerms, RpcFailure> {
        Ok(match self {
            Self::Instant(_) => VestingTerms::None,
            Self::LinearVesting(c) => VestingTerms::Linear {
                schedule: c.schedule().await?,
            },
            Self::TranchedVesting(c) => VestingTerms::Tranched {
                tranches: c.tranches().await?,
            },
        })
    }

    /// Broadcast the `claim` transaction. The single network mutation of
    /// a claim attempt.
    pub async fn claim<S: Signer>(
        &self,
        signer: &S,
        request: &ClaimRequest,
        fee: u128,
        gas: Option<u64>,
    ) -> Result<(Hash32, TxRequest), RpcFailure> {
        let tx = self.base().claim_tx(signer.address(), request, fee, gas);
        let hash = signer.send_transaction(tx.clone()).await?;
        Ok((hash, tx))
    }

    /// Stream id from the campaign's `Claim` event; `None` for instant
    /// campaigns.
    pub fn stream_id(&self, receipt: &Receipt) -> Option<u128> {
        if !self.variant().creates_stream() {
            return None;
        }
        let topic0 = abi::event_topic(STREAM_CLAIM_EVENT);
        receipt
            .logs
            .iter()
            .filter(|log| log.address == self.address())
            .find(|log| log.topics.first() == Some(&topic0))
            .and_then(|log| log.topics.get(2))
            .and_then(|topic| abi::decode_uint(topic, 0).ok())
    }
}
