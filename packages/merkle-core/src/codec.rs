//! Leaf and node hashing.
//!
//! These two functions define tree compatibility with the on-chain verifier
//! and admit no variation:
//!
//! 1. A leaf is the keccak256 of the keccak256 of the ABI-encoded value tuple.
//!    The second hash keeps a 64-byte internal node from ever being accepted
//!    as a leaf.
//! 2. An internal node is keccak256 over its two children, numerically
//!    smaller child first.

use serde::{Deserialize, Serialize};

use crate::{keccak256, u128_to_word, u64_to_word, Address, Hash32, TreeError};

/// Value-tuple layout hashed into each leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum LeafEncoding {
    /// `(address, uint256)`.
    AddressAmount,
    /// `(uint256 index, address, uint256)`.
    #[default]
    IndexAddressAmount,
}

impl LeafEncoding {
    pub const fn tags(&self) -> &'static [&'static str] {
        match self {
            Self::AddressAmount => &["address", "uint256"],
            Self::IndexAddressAmount => &["uint256", "address", "uint256"],
        }
    }

    pub fn from_tags<S: AsRef<str>>(tags: &[S]) -> Result<Self, TreeError> {
        let tags: Vec<&str> = tags.iter().map(|t| t.as_ref()).collect();
        match tags.as_slice() {
            ["address", "uint256"] => Ok(Self::AddressAmount),
            ["uint256", "address", "uint256"] => Ok(Self::IndexAddressAmount),
            _ => Err(TreeError::UnsupportedEncoding),
        }
    }

    /// Whether the index is committed to by the leaf.
    pub const fn binds_index(&self) -> bool {
        matches!(self, Self::IndexAddressAmount)
    }

    /// ABI-encode the value tuple (every field is a static 32-byte word).
    pub fn encode(&self, index: u64, address: &Address, amount: u128) -> Vec<u8> {
        let mut out = Vec::with_capacity(96);
        if self.binds_index() {
            out.extend_from_slice(&u64_to_word(index));
        }
        out.extend_from_slice(&address.to_word());
        out.extend_from_slice(&u128_to_word(amount));
        out
    }

    pub fn leaf_hash(&self, index: u64, address: &Address, amount: u128) -> Hash32 {
        keccak256(&keccak256(&self.encode(index, address, amount)))
    }
}

/// Leaf for the `(address, uint256)` encoding.
pub fn leaf_hash(address: &Address, amount: u128) -> Hash32 {
    LeafEncoding::AddressAmount.leaf_hash(0, address, amount)
}

/// Leaf for the `(uint256, address, uint256)` encoding.
pub fn leaf_hash_indexed(index: u64, address: &Address, amount: u128) -> Hash32 {
    LeafEncoding::IndexAddressAmount.leaf_hash(index, address, amount)
}

/// Sorted-pair node hash.
pub fn combine(a: &Hash32, b: &Hash32) -> Hash32 {
    let mut buf = [0u8; 64];
    if a <= b {
        buf[..32].copy_from_slice(a);
        buf[32..].copy_from_slice(b);
    } else {
        buf[..32].copy_from_slice(b);
        buf[32..].copy_from_slice(a);
    }
    keccak256(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash_to_hex;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[test]
    fn combine_is_order_independent() {
        let a = keccak256(b"a");
        let b = keccak256(b"b");
        assert_eq!(combine(&a, &b), combine(&b, &a));
        assert_ne!(combine(&a, &b), combine(&a, &a));
    }

    #[test]
    fn encoding_layout() {
        let a = addr("0xa0Ee7A142d267C1f36714E4a8F75612F20a79720");
        let plain = LeafEncoding::AddressAmount.encode(7, &a, 5);
        assert_eq!(plain.len(), 64);
        assert_eq!(&plain[12..32], a.as_bytes());
        assert_eq!(plain[63], 5);

        let indexed = LeafEncoding::IndexAddressAmount.encode(7, &a, 5);
        assert_eq!(indexed.len(), 96);
        assert_eq!(indexed[31], 7);
        assert_eq!(&indexed[32..], &plain[..]);
    }

    #[test]
    fn known_leaf_hashes() {
        let a = addr("0x742d35Cc6634c0532925a3b844Bc9e7595f30bEb");
        let amount = 1_000_000_000_000_000_000u128;
        assert_eq!(
            hash_to_hex(&leaf_hash(&a, amount)),
            "0xb7d4a5df353901fec1182d92ffa36a6afaee8ef41402908fa4baf8bff97e0eec"
        );
        assert_eq!(
            hash_to_hex(&leaf_hash_indexed(0, &a, amount)),
            "0x89b1b09430bb16d1a8ca2b18464d0b4e22f83a8c496b728cf78a46a32c7704b2"
        );
    }

    #[test]
    fn tags_round_trip() {
        for enc in [LeafEncoding::AddressAmount, LeafEncoding::IndexAddressAmount] {
            assert_eq!(LeafEncoding::from_tags(enc.tags()).unwrap(), enc);
        }
        assert_eq!(
            LeafEncoding::from_tags(&["address", "uint128"]),
            Err(TreeError::UnsupportedEncoding)
        );
    }
}
