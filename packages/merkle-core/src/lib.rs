//! Merkle allocation trees for airdrop campaigns.
//!
//! Builds the canonical tree over `(address, amount)` allocations, resolves
//! eligibility records, verifies proofs and (de)serializes the persisted tree
//! format. The hashing rules here are fixed by the on-chain verifier:
//!
//! - leaf = `keccak256(keccak256(abi.encode(..values)))`
//! - node = `keccak256(min(a, b) ++ max(a, b))`
//!
//! Nothing in this crate performs I/O beyond the explicit file helpers in
//! [`format`].

use tiny_keccak::{Hasher, Keccak};

pub mod address;
pub mod codec;
pub mod format;
pub mod resolve;
pub mod schedule;
pub mod tree;
pub mod verify;

pub use address::Address;
pub use codec::{combine, leaf_hash, leaf_hash_indexed, LeafEncoding};
pub use format::{DistributionFeed, FeedRecipient, TreeDump, FORMAT_TAG};
pub use resolve::{resolve, resolve_all, resolve_batch, EligibilityRecord, Resolver};
pub use schedule::{tranche_unlocked, LinearSchedule, Tranche, PERCENT_SCALE};
pub use tree::{build, build_with, MerkleTree, Recipient, TreeEntry};
pub use verify::{process_proof, verify, verify_batch, verify_with, ClaimProof};

/// A 32-byte keccak digest.
pub type Hash32 = [u8; 32];

/// Upper bound on proof length; a tree this deep would hold 2^64 leaves.
pub const MAX_PROOF_DEPTH: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeError {
    EmptyRecipientSet,
    InvalidRecipient(String),
    InvalidAddress,
    InvalidHash,
    InvalidAmount,
    UnsupportedFormat(String),
    UnsupportedEncoding,
    MalformedTree(String),
    RootMismatch,
    FeedMismatch(String),
    InvalidSchedule,
    Io(String),
    Json(String),
}

impl TreeError {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyRecipientSet => "recipient set is empty",
            Self::InvalidRecipient(_) => "invalid recipient",
            Self::InvalidAddress => "invalid address",
            Self::InvalidHash => "invalid 32-byte hash",
            Self::InvalidAmount => "invalid amount",
            Self::UnsupportedFormat(_) => "unsupported tree format",
            Self::UnsupportedEncoding => "unsupported leaf encoding",
            Self::MalformedTree(_) => "malformed tree data",
            Self::RootMismatch => "tree root does not match expected root",
            Self::FeedMismatch(_) => "distribution feed is inconsistent",
            Self::InvalidSchedule => "unlock percentages do not sum to 100%",
            Self::Io(_) => "i/o error",
            Self::Json(_) => "json error",
        }
    }
}

impl core::fmt::Display for TreeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidRecipient(detail)
            | Self::UnsupportedFormat(detail)
            | Self::MalformedTree(detail)
            | Self::FeedMismatch(detail)
            | Self::Io(detail)
            | Self::Json(detail) => write!(f, "{}: {}", self.as_str(), detail),
            _ => f.write_str(self.as_str()),
        }
    }
}

impl std::error::Error for TreeError {}

pub fn keccak256(data: &[u8]) -> Hash32 {
    let mut keccak = Keccak::v256();
    keccak.update(data);
    let mut out = [0u8; 32];
    keccak.finalize(&mut out);
    out
}

/// Format a hash as `0x`-prefixed lowercase hex.
pub fn hash_to_hex(hash: &Hash32) -> String {
    format!("0x{}", hex::encode(hash))
}

/// Parse a `0x`-prefixed (or bare) 64-char hex string.
pub fn parse_hash(hex_str: &str) -> Result<Hash32, TreeError> {
    let stripped = hex_str
        .strip_prefix("0x")
        .or_else(|| hex_str.strip_prefix("0X"))
        .unwrap_or(hex_str);
    if stripped.len() != 64 {
        return Err(TreeError::InvalidHash);
    }
    let mut out = [0u8; 32];
    hex::decode_to_slice(stripped, &mut out).map_err(|_| TreeError::InvalidHash)?;
    Ok(out)
}

/// Parse a decimal token amount. Zero and values wider than `u128` are rejected.
pub fn parse_amount(decimal: &str) -> Result<u128, TreeError> {
    let trimmed = decimal.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TreeError::InvalidAmount);
    }
    let amount: u128 = trimmed.parse().map_err(|_| TreeError::InvalidAmount)?;
    if amount == 0 {
        return Err(TreeError::InvalidAmount);
    }
    Ok(amount)
}

/// Left-pad a `u128` into a big-endian 32-byte ABI word.
pub(crate) fn u128_to_word(value: u128) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[16..].copy_from_slice(&value.to_be_bytes());
    out
}

pub(crate) fn u64_to_word(value: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[24..].copy_from_slice(&value.to_be_bytes());
    out
}
