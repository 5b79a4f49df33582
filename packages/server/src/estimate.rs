//! Fee and gas estimation for a claim, plus a cancellable refresher.

use std::{sync::Arc, time::Duration};

use airdrop_merkle_core::{tree::amount_string, Address};
use serde::Serialize;
use tokio::sync::{broadcast, oneshot, watch};

use crate::{
    chain::{Campaign, Transport},
    claim::ClaimRequest,
    errors::{self, ClaimError, ErrorKind},
};

/// Gas limit sent = raw estimate × 120%.
pub const GAS_BUFFER_PERCENT: u64 = 120;

/// `ceil(raw * GAS_BUFFER_PERCENT / 100)`.
pub fn buffered_gas_limit(raw: u64) -> u64 {
    let scaled = (raw as u128 * GAS_BUFFER_PERCENT as u128).div_ceil(100);
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimate {
    pub raw_gas_limit: u64,
    pub gas_limit: u64,
    #[serde(with = "amount_string")]
    pub gas_price: u128,
    #[serde(with = "amount_string")]
    pub fee: u128,
    /// `gas_limit * gas_price + fee`, in wei.
    #[serde(with = "amount_string")]
    pub total_cost: u128,
}

impl GasEstimate {
    pub fn new(raw_gas_limit: u64, gas_price: u128, fee: u128) -> Self {
        let gas_limit = buffered_gas_limit(raw_gas_limit);
        Self {
            raw_gas_limit,
            gas_limit,
            gas_price,
            fee,
            total_cost: (gas_limit as u128).saturating_mul(gas_price).saturating_add(fee),
        }
    }
}

/// Read the fee, simulate the claim with `value = fee`, and buffer the
/// result. A failed read or simulation is `EstimationUnavailable`; the
/// underlying reason is kept in the message.
pub async fn estimate<T: Transport>(
    campaign: &Campaign<T>,
    from: Address,
    request: &ClaimRequest,
) -> Result<GasEstimate, ClaimError> {
    let unavailable = |e: crate::chain::RpcFailure| {
        let cause = errors::describe(&e);
        ClaimError::new(
            ErrorKind::EstimationUnavailable,
            format!("{} ({})", cause.message, cause.kind),
        )
    };

    let base = campaign.base();
    let fee = base.fee().await.map_err(unavailable)?;
    let raw = base
        .estimate_claim_gas(from, request, fee)
        .await
        .map_err(unavailable)?;
    let gas_price = base.client().gas_price().await.map_err(unavailable)?;

    let estimate = GasEstimate::new(raw, gas_price, fee);
    tracing::debug!(
        raw = estimate.raw_gas_limit,
        limit = estimate.gas_limit,
        total_cost = %estimate.total_cost,
        "claim gas estimated"
    );
    Ok(estimate)
}

pub type EstimateResult = Result<GasEstimate, ClaimError>;

/// Re-estimates on a fixed interval until stopped or dropped.
pub struct EstimateRefresher {
    latest: watch::Receiver<Option<EstimateResult>>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl EstimateRefresher {
    /// The first estimate runs immediately. When `event_tx` is given each
    /// result is also broadcast as an `estimate:updated` event.
    pub fn spawn<T: Transport>(
        campaign: Arc<Campaign<T>>,
        from: Address,
        request: ClaimRequest,
        interval: Duration,
        event_tx: Option<broadcast::Sender<String>>,
    ) -> Self {
        let (latest_tx, latest) = watch::channel(None);
        let (stop_tx, mut stop_rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let result = estimate(&campaign, from, &request).await;
                        if let Some(tx) = &event_tx {
                            let event = match &result {
                                Ok(est) => serde_json::json!({
                                    "type": "estimate:updated",
                                    "index": request.index,
                                    "estimate": est,
                                }),
                                Err(err) => serde_json::json!({
                                    "type": "estimate:unavailable",
                                    "index": request.index,
                                    "error": err,
                                }),
                            };
                            let _ = tx.send(event.to_string());
                        }
                        if latest_tx.send(Some(result)).is_err() {
                            // Every receiver is gone.
                            break;
                        }
                    }
                }
            }
            tracing::debug!(index = request.index, "estimate refresher stopped");
        });

        Self {
            latest,
            stop_tx: Some(stop_tx),
        }
    }

    pub fn latest(&self) -> Option<EstimateResult> {
        self.latest.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<EstimateResult>> {
        self.latest.clone()
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_running(&self) -> bool {
        self.stop_tx.is_some()
    }
}

impl Drop for EstimateRefresher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_rounds_up() {
        assert_eq!(buffered_gas_limit(100_000), 120_000);
        assert_eq!(buffered_gas_limit(21_001), 25_202); // 25201.2
        assert_eq!(buffered_gas_limit(1), 2);
        assert_eq!(buffered_gas_limit(0), 0);
        assert_eq!(buffered_gas_limit(u64::MAX), u64::MAX);
    }

    #[test]
    fn total_cost_includes_fee() {
        let est = GasEstimate::new(50_000, 2_000_000_000, 1_000);
        assert_eq!(est.gas_limit, 60_000);
        assert_eq!(est.total_cost, 60_000 * 2_000_000_000 + 1_000);
    }
}
