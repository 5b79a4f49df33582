//! Eligibility lookup.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{tree::amount_string, Address, Hash32, MerkleTree};

/// Everything needed to submit a claim for one allocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityRecord {
    pub address: Address,
    pub index: u64,
    #[serde(with = "amount_string")]
    pub amount: u128,
    #[serde(with = "hex_hashes")]
    pub proof: Vec<Hash32>,
}

/// Address index over a tree, built once in O(n).
pub struct Resolver<'a> {
    tree: &'a MerkleTree,
    by_address: HashMap<Address, usize>,
}

impl<'a> Resolver<'a> {
    pub fn new(tree: &'a MerkleTree) -> Self {
        let by_address = tree
            .entries()
            .iter()
            .enumerate()
            .map(|(pos, e)| (e.recipient.address, pos))
            .collect();
        Self { tree, by_address }
    }

    pub fn get(&self, address: &Address) -> Option<EligibilityRecord> {
        let pos = *self.by_address.get(address)?;
        Some(record_at(self.tree, pos))
    }
}

fn record_at(tree: &MerkleTree, pos: usize) -> EligibilityRecord {
    let entry = &tree.entries()[pos];
    EligibilityRecord {
        address: entry.recipient.address,
        index: entry.index,
        amount: entry.recipient.amount,
        proof: tree.proof_at(entry.tree_index),
    }
}

/// Linear lookup. `None` means not eligible.
pub fn resolve(address: &Address, tree: &MerkleTree) -> Option<EligibilityRecord> {
    tree.entries()
        .iter()
        .position(|e| e.recipient.address == *address)
        .map(|pos| record_at(tree, pos))
}

/// One result per input address, in input order.
pub fn resolve_batch(addresses: &[Address], tree: &MerkleTree) -> Vec<Option<EligibilityRecord>> {
    let resolver = Resolver::new(tree);
    addresses.iter().map(|a| resolver.get(a)).collect()
}

/// Every allocation in index order.
pub fn resolve_all(tree: &MerkleTree) -> Vec<EligibilityRecord> {
    (0..tree.len()).map(|pos| record_at(tree, pos)).collect()
}

pub mod hex_hashes {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::{hash_to_hex, parse_hash, Hash32};

    pub fn serialize<S: Serializer>(hashes: &[Hash32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(hashes.iter().map(hash_to_hex))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Hash32>, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.iter()
            .map(|s| parse_hash(s).map_err(serde::de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build, Recipient};

    fn sample_tree() -> MerkleTree {
        let recipients: Vec<Recipient> = (1..=7u8)
            .map(|i| Recipient::new(Address([i * 3; 20]), 100 * i as u128))
            .collect();
        build(&recipients).unwrap()
    }

    #[test]
    fn unknown_address_is_not_eligible() {
        let tree = sample_tree();
        assert_eq!(resolve(&Address([0xee; 20]), &tree), None);
    }

    #[test]
    fn batch_matches_individual_lookups() {
        let tree = sample_tree();
        let addresses = vec![Address([9; 20]), Address([0xee; 20]), Address([3; 20]), Address([9; 20])];
        let batch = resolve_batch(&addresses, &tree);
        let single: Vec<_> = addresses.iter().map(|a| resolve(a, &tree)).collect();
        assert_eq!(batch, single);
        assert!(batch[1].is_none());
    }

    #[test]
    fn indices_are_unique() {
        let tree = sample_tree();
        let mut indices: Vec<u64> = resolve_all(&tree).iter().map(|r| r.index).collect();
        let before = indices.len();
        indices.dedup();
        assert_eq!(indices.len(), before);
        assert_eq!(before, 7);
    }

    #[test]
    fn record_serializes_as_camel_case_hex() {
        let tree = sample_tree();
        let record = resolve(&Address([3; 20]), &tree).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["index"], 0);
        assert_eq!(json["amount"], "100");
        assert!(json["proof"][0].as_str().unwrap().starts_with("0x"));
        let back: EligibilityRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
