//! Drives one claim at a time through the lifecycle in [`super::machine`].
//!
//! Every transition is published on a `watch` channel (latest snapshot) and
//! as a JSON event on the shared `broadcast` channel (WebSocket fan-out).

use std::sync::Arc;

use airdrop_merkle_core::{hash_to_hex, verify_with, Hash32, LeafEncoding};
use tokio::sync::{broadcast, watch, Mutex};

use super::machine::{ClaimEvent, ClaimRequest, ClaimState, ClaimTransaction, TransitionError};
use crate::{
    chain::{Campaign, Signer, Transport, TxRequest},
    config::EngineConfig,
    errors::{self, ClaimError, ErrorKind},
    estimate,
};

/// Why a running attempt stopped early.
enum Halt {
    Failed(ClaimError),
    /// The record was reset (or replaced) underneath the attempt.
    Abandoned,
}

impl From<ClaimError> for Halt {
    fn from(err: ClaimError) -> Self {
        Halt::Failed(err)
    }
}

impl From<crate::chain::RpcFailure> for Halt {
    fn from(raw: crate::chain::RpcFailure) -> Self {
        Halt::Failed(errors::describe(&raw))
    }
}

/// A claim that holds the record but has not touched the network yet.
pub struct PendingClaim<S> {
    attempt: u64,
    signer: Arc<S>,
    request: ClaimRequest,
    snapshot: ClaimTransaction,
}

impl<S> std::fmt::Debug for PendingClaim<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingClaim")
            .field("attempt", &self.attempt)
            .field("request", &self.request)
            .field("snapshot", &self.snapshot)
            .finish_non_exhaustive()
    }
}

impl<S> PendingClaim<S> {
    /// The record as it stood right after `Start`.
    pub fn snapshot(&self) -> &ClaimTransaction {
        &self.snapshot
    }

    pub fn request(&self) -> &ClaimRequest {
        &self.request
    }
}

pub struct ClaimOrchestrator<T, S> {
    campaign: Arc<Campaign<T>>,
    signer: Option<Arc<S>>,
    /// Leaf layout the campaign's root was built with.
    encoding: LeafEncoding,
    config: EngineConfig,
    /// The single mutable claim record.
    current: Mutex<ClaimTransaction>,
    state_tx: watch::Sender<ClaimTransaction>,
    event_tx: broadcast::Sender<String>,
}

impl<T: Transport, S: Signer> ClaimOrchestrator<T, S> {
    pub fn new(
        campaign: Arc<Campaign<T>>,
        signer: Option<Arc<S>>,
        encoding: LeafEncoding,
        config: EngineConfig,
        event_tx: broadcast::Sender<String>,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ClaimTransaction::default());
        Arc::new(Self {
            campaign,
            signer,
            encoding,
            config,
            current: Mutex::new(ClaimTransaction::default()),
            state_tx,
            event_tx,
        })
    }

    pub fn campaign(&self) -> &Arc<Campaign<T>> {
        &self.campaign
    }

    pub fn signer(&self) -> Option<&Arc<S>> {
        self.signer.as_ref()
    }

    pub fn encoding(&self) -> LeafEncoding {
        self.encoding
    }

    /// Snapshot of the current claim record.
    pub async fn status(&self) -> ClaimTransaction {
        self.current.lock().await.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClaimTransaction> {
        self.state_tx.subscribe()
    }

    /// Apply an event directly, bypassing the network flow.
    pub async fn dispatch(&self, event: ClaimEvent) -> Result<ClaimTransaction, TransitionError> {
        let mut current = self.current.lock().await;
        current.apply(event)?;
        self.publish(&current);
        Ok(current.clone())
    }

    /// Return to `Idle`. A transaction already broadcast is not cancelled,
    /// only no longer tracked.
    pub async fn reset(&self) -> ClaimTransaction {
        let mut current = self.current.lock().await;
        if let (Some(hash), false) = (current.hash, current.state.is_terminal()) {
            tracing::warn!(
                hash = %hash_to_hex(&hash),
                state = current.state.as_str(),
                "reset while a broadcast claim is pending; it will not be tracked"
            );
        }
        // Reset is legal from every state.
        let _ = current.apply(ClaimEvent::Reset);
        self.publish(&current);
        current.clone()
    }

    /// Run a claim to a terminal state.
    ///
    /// `InvalidRequest` and `AlreadyInProgress` are returned without touching
    /// the record. Any other failure leaves the record `Failed` with the
    /// decoded kind, and is also returned.
    pub async fn claim(&self, request: ClaimRequest) -> Result<ClaimTransaction, ClaimError> {
        let pending = self.begin(request).await?;
        self.finish(pending).await
    }

    /// Take the record for `request` (`Idle` to `Preparing`) without any
    /// network access. A second caller gets `AlreadyInProgress` until the
    /// record is reset.
    pub async fn begin(&self, request: ClaimRequest) -> Result<PendingClaim<S>, ClaimError> {
        request.validate()?;
        let signer = self
            .signer
            .clone()
            .ok_or_else(|| ClaimError::invalid_request("no wallet is connected"))?;

        let mut current = self.current.lock().await;
        if current.state != ClaimState::Idle {
            return Err(ClaimError::new(
                ErrorKind::AlreadyInProgress,
                format!(
                    "claim for index {} is {}; reset it first",
                    current.index.map(|i| i.to_string()).unwrap_or_default(),
                    current.state.as_str()
                ),
            ));
        }
        current
            .apply(ClaimEvent::Start { index: request.index })
            .map_err(|e| ClaimError::new(ErrorKind::AlreadyInProgress, e.to_string()))?;
        self.publish(&current);

        Ok(PendingClaim {
            attempt: current.attempt,
            signer,
            request,
            snapshot: current.clone(),
        })
    }

    /// Drive a claim taken with [`Self::begin`] to a terminal state.
    pub async fn finish(&self, pending: PendingClaim<S>) -> Result<ClaimTransaction, ClaimError> {
        let PendingClaim {
            attempt,
            signer,
            request,
            ..
        } = pending;

        tracing::info!(
            index = request.index,
            recipient = %request.recipient,
            amount = %request.amount,
            campaign = %self.campaign.address(),
            "claim started"
        );

        match self.run(attempt, signer.as_ref(), &request).await {
            Ok(done) => Ok(done),
            Err(Halt::Failed(err)) => {
                tracing::error!(index = request.index, kind = %err.kind, message = %err.message, "claim failed");
                // The record may have been reset meanwhile; the error stands either way.
                let _ = self.advance(attempt, ClaimEvent::Failed(err.clone())).await;
                Err(err)
            }
            Err(Halt::Abandoned) => Err(ClaimError::new(
                ErrorKind::Unknown,
                "claim was reset before it finished",
            )),
        }
    }

    async fn run(&self, attempt: u64, signer: &S, request: &ClaimRequest) -> Result<ClaimTransaction, Halt> {
        let (fee, gas) = self.prepare(signer, request).await?;

        let (hash, tx) = self.campaign.claim(signer, request, fee, gas).await?;
        self.advance(attempt, ClaimEvent::Submitted { hash }).await?;

        self.confirm(attempt, hash, &tx).await
    }

    /// Local and read-only checks before anything is sent. Returns the fee
    /// to attach and, when simulation worked, a buffered gas limit.
    async fn prepare(&self, signer: &S, request: &ClaimRequest) -> Result<(u128, Option<u64>), Halt> {
        let base = self.campaign.base();

        let root = base.merkle_root().await?;
        if !verify_with(
            self.encoding,
            &root,
            &request.proof,
            request.index,
            &request.recipient,
            request.amount,
        ) {
            return Err(ClaimError::new(
                ErrorKind::InvalidProof,
                format!("proof does not verify against on-chain root {}", hash_to_hex(&root)),
            )
            .into());
        }
        if base.has_expired().await? {
            return Err(ClaimError::from_kind(ErrorKind::CampaignExpired).into());
        }
        if base.has_claimed(request.index).await? {
            return Err(ClaimError::new(
                ErrorKind::AlreadyClaimed,
                format!("index {} has already been claimed", request.index),
            )
            .into());
        }

        match estimate::estimate(&self.campaign, signer.address(), request).await {
            Ok(est) => {
                let _ = self.event_tx.send(
                    serde_json::json!({
                        "type": "estimate:updated",
                        "index": request.index,
                        "estimate": est,
                    })
                    .to_string(),
                );
                Ok((est.fee, Some(est.gas_limit)))
            }
            Err(err) => {
                tracing::warn!(index = request.index, error = %err, "sending claim without a gas estimate");
                Ok((base.fee().await?, None))
            }
        }
    }

    async fn confirm(&self, attempt: u64, hash: Hash32, tx: &TxRequest) -> Result<ClaimTransaction, Halt> {
        let client = self.campaign.base().client();
        let mut observed = false;

        for poll in 0..self.config.max_confirmation_polls {
            if poll > 0 {
                tokio::time::sleep(self.config.poll_interval).await;
            }

            if !observed {
                match client.transaction_known(&hash).await {
                    Ok(true) => {
                        self.advance(attempt, ClaimEvent::Observed).await?;
                        observed = true;
                    }
                    Ok(false) => {}
                    Err(e) => tracing::warn!(poll, error = %e, "transaction lookup failed"),
                }
            }

            let receipt = match client.transaction_receipt(&hash).await {
                Ok(Some(receipt)) => receipt,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(poll, error = %e, "receipt poll failed");
                    continue;
                }
            };

            if !observed {
                self.advance(attempt, ClaimEvent::Observed).await?;
            }

            if !receipt.success {
                let raw = self.campaign.base().replay(tx, receipt.block_number).await;
                return Err(errors::describe(&raw).into());
            }

            let stream_id = self.campaign.stream_id(&receipt);
            if self.campaign.variant().creates_stream() && stream_id.is_none() {
                tracing::warn!(hash = %hash_to_hex(&hash), "claim mined but no stream id was found in its logs");
            }
            return self.advance(attempt, ClaimEvent::Mined { stream_id }).await;
        }

        Err(ClaimError::new(
            ErrorKind::NetworkError,
            format!(
                "{} was not mined after {} polls; it may have been dropped",
                hash_to_hex(&hash),
                self.config.max_confirmation_polls
            ),
        )
        .into())
    }

    /// Apply `event` if the record still belongs to `attempt`.
    async fn advance(&self, attempt: u64, event: ClaimEvent) -> Result<ClaimTransaction, Halt> {
        let mut current = self.current.lock().await;
        if current.attempt != attempt {
            return Err(Halt::Abandoned);
        }
        if let Err(e) = current.apply(event) {
            tracing::debug!(error = %e, "dropping update for abandoned claim");
            return Err(Halt::Abandoned);
        }
        self.publish(&current);
        Ok(current.clone())
    }

    fn publish(&self, snapshot: &ClaimTransaction) {
        self.state_tx.send_replace(snapshot.clone());

        let event = serde_json::json!({
            "type": format!("claim:{}", snapshot.state.as_str()),
            "campaign": self.campaign.address(),
            "claim": snapshot,
        });
        let _ = self.event_tx.send(event.to_string());

        match snapshot.state {
            ClaimState::Succeeded => tracing::info!(
                hash = %snapshot.hash.as_ref().map(hash_to_hex).unwrap_or_default(),
                stream_id = ?snapshot.stream_id,
                "claim succeeded"
            ),
            state => tracing::debug!(state = state.as_str(), message = %snapshot.message, "claim state"),
        }
    }
}
