//! Claim failure taxonomy and the decoder that maps raw RPC / revert
//! failures into it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chain::{
    abi::{self, Revert},
    rpc::RpcFailure,
};

/// Closed set of reasons a claim (or admin call) can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    AlreadyClaimed,
    CampaignExpired,
    InvalidProof,
    InsufficientFee,
    AccessDenied,
    EstimationUnavailable,
    UserRejectedSignature,
    NetworkError,
    InvalidRequest,
    AlreadyInProgress,
    Unknown,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyClaimed => "AlreadyClaimed",
            Self::CampaignExpired => "CampaignExpired",
            Self::InvalidProof => "InvalidProof",
            Self::InsufficientFee => "InsufficientFee",
            Self::AccessDenied => "AccessDenied",
            Self::EstimationUnavailable => "EstimationUnavailable",
            Self::UserRejectedSignature => "UserRejectedSignature",
            Self::NetworkError => "NetworkError",
            Self::InvalidRequest => "InvalidRequest",
            Self::AlreadyInProgress => "AlreadyInProgress",
            Self::Unknown => "Unknown",
        }
    }

    /// Default user-facing text when nothing more specific is known.
    pub const fn describe(self) -> &'static str {
        match self {
            Self::AlreadyClaimed => "this allocation has already been claimed",
            Self::CampaignExpired => "the campaign has expired",
            Self::InvalidProof => "the proof does not match the campaign's merkle root",
            Self::InsufficientFee => "not enough value to cover the fee and gas",
            Self::AccessDenied => "only the campaign admin can do this",
            Self::EstimationUnavailable => "gas could not be estimated",
            Self::UserRejectedSignature => "the signature request was rejected",
            Self::NetworkError => "the network request failed",
            Self::InvalidRequest => "the claim request is invalid",
            Self::AlreadyInProgress => "a claim is already in progress",
            Self::Unknown => "the transaction failed for an unknown reason",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A taxonomy entry plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ClaimError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ClaimError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_kind(kind: ErrorKind) -> Self {
        Self::new(kind, kind.describe())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }
}

impl From<RpcFailure> for ClaimError {
    fn from(raw: RpcFailure) -> Self {
        describe(&raw)
    }
}

/// Custom errors raised by the campaign contracts. Both naming generations
/// are listed.
const CUSTOM_ERRORS: &[(&str, ErrorKind)] = &[
    ("SablierMerkleBase_StreamClaimed(uint256)", ErrorKind::AlreadyClaimed),
    ("SablierV2MerkleLockup_StreamClaimed(uint256)", ErrorKind::AlreadyClaimed),
    ("SablierMerkleBase_CampaignExpired(uint256,uint40)", ErrorKind::CampaignExpired),
    ("SablierV2MerkleLockup_CampaignExpired(uint256,uint40)", ErrorKind::CampaignExpired),
    ("SablierMerkleBase_InvalidProof()", ErrorKind::InvalidProof),
    ("SablierV2MerkleLockup_InvalidProof()", ErrorKind::InvalidProof),
    ("SablierMerkleBase_InsufficientFeePayment(uint256,uint256)", ErrorKind::InsufficientFee),
    ("CallerNotAdmin(address,address)", ErrorKind::AccessDenied),
    ("SablierMerkleBase_CallerNotFactory(address,address)", ErrorKind::AccessDenied),
];

/// Substrings of `Error(string)` reasons and node messages, checked in order.
const REASON_PATTERNS: &[(&str, ErrorKind)] = &[
    ("already claimed", ErrorKind::AlreadyClaimed),
    ("streamclaimed", ErrorKind::AlreadyClaimed),
    ("expired", ErrorKind::CampaignExpired),
    ("invalid proof", ErrorKind::InvalidProof),
    ("invalidproof", ErrorKind::InvalidProof),
    ("insufficient fee", ErrorKind::InsufficientFee),
    ("insufficientfee", ErrorKind::InsufficientFee),
    ("not admin", ErrorKind::AccessDenied),
    ("notadmin", ErrorKind::AccessDenied),
    ("caller is not the owner", ErrorKind::AccessDenied),
    ("unauthorized", ErrorKind::AccessDenied),
];

fn match_reason(text: &str) -> Option<ErrorKind> {
    let lower = text.to_ascii_lowercase();
    REASON_PATTERNS
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, kind)| *kind)
}

/// Decode raw revert bytes into a kind, if they carry a known reason.
pub fn decode_revert(data: &[u8]) -> Option<(ErrorKind, String)> {
    match abi::decode_revert(data)? {
        Revert::Reason(reason) => match_reason(&reason).map(|kind| (kind, reason)),
        Revert::Custom(sel, _) => CUSTOM_ERRORS
            .iter()
            .find(|(signature, _)| abi::selector(signature) == sel)
            .map(|(signature, kind)| {
                let name = signature.split('(').next().unwrap_or(*signature);
                (*kind, format!("{} ({})", kind.describe(), name))
            }),
        Revert::Panic(code) => Some((ErrorKind::Unknown, format!("contract panicked (code 0x{:x})", code))),
    }
}

/// Map a raw failure into the taxonomy: structured revert first, then the
/// failure's class, then `Unknown`.
pub fn decode(raw: &RpcFailure) -> ErrorKind {
    describe(raw).kind
}

/// [`decode`] plus the best available message.
pub fn describe(raw: &RpcFailure) -> ClaimError {
    if let Some(data) = raw.revert_data() {
        if let Some((kind, message)) = decode_revert(&data) {
            return ClaimError::new(kind, message);
        }
    }

    match raw {
        RpcFailure::Transport(msg) => ClaimError::new(ErrorKind::NetworkError, msg.clone()),
        RpcFailure::Decode(msg) => ClaimError::new(ErrorKind::NetworkError, msg.clone()),
        RpcFailure::Rpc { code, message, .. } => {
            let lower = message.to_ascii_lowercase();
            let kind = if *code == 4001
                || lower.contains("user rejected")
                || lower.contains("user denied")
                || lower.contains("rejected the request")
            {
                ErrorKind::UserRejectedSignature
            } else if lower.contains("insufficient funds") {
                ErrorKind::InsufficientFee
            } else if let Some(kind) = match_reason(message) {
                // Nodes without revert data still echo the reason in the message.
                kind
            } else if !raw.is_revert() && is_network_code(*code) {
                ErrorKind::NetworkError
            } else {
                ErrorKind::Unknown
            };
            ClaimError::new(kind, message.clone())
        }
    }
}

/// Server-side failures unrelated to the transaction itself: internal
/// error, resource unavailable, limit exceeded, header not found.
fn is_network_code(code: i64) -> bool {
    matches!(code, -32603 | -32002 | -32005) || (-32099..=-32000).contains(&code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::abi::{uint_word, ERROR_STRING_SELECTOR};

    fn revert_with(data: Vec<u8>) -> RpcFailure {
        RpcFailure::Rpc {
            code: 3,
            message: "execution reverted".to_string(),
            data: Some(format!("0x{}", hex::encode(data))),
        }
    }

    fn reason(text: &str) -> Vec<u8> {
        let mut out = ERROR_STRING_SELECTOR.to_vec();
        out.extend_from_slice(&uint_word(32));
        out.extend_from_slice(&uint_word(text.len() as u128));
        let mut body = text.as_bytes().to_vec();
        body.resize(text.len().div_ceil(32) * 32, 0);
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn custom_error_selectors() {
        let mut data = abi::selector("SablierMerkleBase_StreamClaimed(uint256)").to_vec();
        data.extend_from_slice(&uint_word(3));
        assert_eq!(decode(&revert_with(data)), ErrorKind::AlreadyClaimed);

        let data = abi::selector("SablierMerkleBase_InvalidProof()").to_vec();
        assert_eq!(decode(&revert_with(data)), ErrorKind::InvalidProof);

        let mut data = abi::selector("CallerNotAdmin(address,address)").to_vec();
        data.extend_from_slice(&[0u8; 64]);
        assert_eq!(decode(&revert_with(data)), ErrorKind::AccessDenied);
    }

    #[test]
    fn string_reasons() {
        assert_eq!(decode(&revert_with(reason("Airdrop: already claimed"))), ErrorKind::AlreadyClaimed);
        assert_eq!(decode(&revert_with(reason("campaign expired"))), ErrorKind::CampaignExpired);
        assert_eq!(decode(&revert_with(reason("something else"))), ErrorKind::Unknown);
    }

    #[test]
    fn error_classes() {
        let rejected = RpcFailure::Rpc {
            code: 4001,
            message: "User rejected the request.".to_string(),
            data: None,
        };
        assert_eq!(decode(&rejected), ErrorKind::UserRejectedSignature);

        let broke = RpcFailure::Rpc {
            code: -32000,
            message: "insufficient funds for gas * price + value".to_string(),
            data: None,
        };
        assert_eq!(decode(&broke), ErrorKind::InsufficientFee);

        let down = RpcFailure::Transport("connection refused".to_string());
        assert_eq!(decode(&down), ErrorKind::NetworkError);

        let header = RpcFailure::Rpc {
            code: -32000,
            message: "header not found".to_string(),
            data: None,
        };
        assert_eq!(decode(&header), ErrorKind::NetworkError);

        let opaque = RpcFailure::Rpc {
            code: 3,
            message: "execution reverted".to_string(),
            data: Some("0x".to_string()),
        };
        assert_eq!(decode(&opaque), ErrorKind::Unknown);
    }

    #[test]
    fn message_only_reverts_are_matched() {
        let raw = RpcFailure::Rpc {
            code: -32000,
            message: "execution reverted: already claimed".to_string(),
            data: None,
        };
        assert_eq!(decode(&raw), ErrorKind::AlreadyClaimed);
    }

    #[test]
    fn claim_error_display() {
        let err = ClaimError::from_kind(ErrorKind::AlreadyInProgress);
        assert_eq!(err.to_string(), "AlreadyInProgress: a claim is already in progress");
    }
}
