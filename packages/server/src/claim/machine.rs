//! Claim lifecycle as a pure state machine.
//!
//! ```text
//! Idle → Preparing → Submitted → Confirming → Succeeded
//!          └───────────┴────────────┴───────→ Failed
//! ```
//!
//! Terminal states are left only through `Reset`.

use airdrop_merkle_core::{
    hash_to_hex, resolve::hex_hashes, tree::amount_string, Address, ClaimProof, EligibilityRecord,
    Hash32,
};
use serde::{Deserialize, Serialize, Serializer};

use crate::errors::{ClaimError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimState {
    Idle,
    Preparing,
    Submitted,
    Confirming,
    Succeeded,
    Failed,
}

impl ClaimState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Submitted => "submitted",
            Self::Confirming => "confirming",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// What the caller wants claimed. `recipient` receives the tokens; the
/// signer only pays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    pub index: u64,
    pub recipient: Address,
    #[serde(with = "amount_string")]
    pub amount: u128,
    #[serde(with = "hex_hashes")]
    pub proof: Vec<Hash32>,
}

impl ClaimRequest {
    /// Shape checks that need no network.
    pub fn validate(&self) -> Result<(), ClaimError> {
        if self.amount == 0 {
            return Err(ClaimError::invalid_request("amount must be greater than zero"));
        }
        if self.proof.is_empty() {
            return Err(ClaimError::invalid_request("proof must not be empty"));
        }
        if self.recipient.is_zero() {
            return Err(ClaimError::invalid_request("recipient must not be the zero address"));
        }
        Ok(())
    }

    pub fn as_proof(&self) -> ClaimProof {
        ClaimProof {
            index: self.index,
            address: self.recipient,
            amount: self.amount,
            proof: self.proof.clone(),
        }
    }
}

impl From<EligibilityRecord> for ClaimRequest {
    fn from(record: EligibilityRecord) -> Self {
        Self {
            index: record.index,
            recipient: record.address,
            amount: record.amount,
            proof: record.proof,
        }
    }
}

fn opt_hash<S: Serializer>(hash: &Option<Hash32>, serializer: S) -> Result<S::Ok, S::Error> {
    match hash {
        Some(h) => serializer.serialize_str(&hash_to_hex(h)),
        None => serializer.serialize_none(),
    }
}

fn opt_amount<S: Serializer>(value: &Option<u128>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.serialize_str(&v.to_string()),
        None => serializer.serialize_none(),
    }
}

/// The one mutable claim record an orchestrator owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimTransaction {
    pub state: ClaimState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    #[serde(serialize_with = "opt_hash", skip_serializing_if = "Option::is_none")]
    pub hash: Option<Hash32>,
    #[serde(serialize_with = "opt_amount", skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    pub message: String,
    /// Bumped on every `Start`, so late updates from an abandoned attempt
    /// can be told apart from the current one.
    #[serde(skip)]
    pub attempt: u64,
}

impl Default for ClaimTransaction {
    fn default() -> Self {
        Self {
            state: ClaimState::Idle,
            index: None,
            hash: None,
            stream_id: None,
            error: None,
            message: String::new(),
            attempt: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimEvent {
    Start { index: u64 },
    Submitted { hash: Hash32 },
    /// The network knows about the transaction.
    Observed,
    /// Mined without revert.
    Mined { stream_id: Option<u128> },
    Failed(ClaimError),
    Reset,
}

impl ClaimEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Submitted { .. } => "submitted",
            Self::Observed => "observed",
            Self::Mined { .. } => "mined",
            Self::Failed(_) => "failed",
            Self::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot apply '{event}' in state {from:?}")]
pub struct TransitionError {
    pub from: ClaimState,
    pub event: &'static str,
}

impl ClaimTransaction {
    /// Apply `event`. Illegal transitions leave `self` untouched.
    pub fn apply(&mut self, event: ClaimEvent) -> Result<(), TransitionError> {
        use ClaimState::*;

        let illegal = TransitionError {
            from: self.state,
            event: event.name(),
        };

        match (self.state, event) {
            (Idle, ClaimEvent::Start { index }) => {
                *self = Self {
                    state: Preparing,
                    index: Some(index),
                    message: "Preparing claim".to_string(),
                    attempt: self.attempt + 1,
                    ..Self::default()
                };
            }
            (Preparing, ClaimEvent::Submitted { hash }) => {
                self.state = Submitted;
                self.hash = Some(hash);
                self.message = format!("Submitted {}", hash_to_hex(&hash));
            }
            (Submitted, ClaimEvent::Observed) => {
                self.state = Confirming;
                self.message = "Waiting for confirmation".to_string();
            }
            (Confirming, ClaimEvent::Mined { stream_id }) => {
                self.state = Succeeded;
                self.stream_id = stream_id;
                self.message = match stream_id {
                    Some(id) => format!("Claimed, stream {}", id),
                    None => "Claimed".to_string(),
                };
            }
            (Preparing | Submitted | Confirming, ClaimEvent::Failed(err)) => {
                self.state = Failed;
                self.error = Some(err.kind);
                self.message = err.message;
            }
            (_, ClaimEvent::Reset) => {
                *self = Self {
                    attempt: self.attempt,
                    ..Self::default()
                };
            }
            _ => return Err(illegal),
        }
        Ok(())
    }
}
