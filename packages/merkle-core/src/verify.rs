//! Proof verification, mirroring the on-chain check.

use serde::{Deserialize, Serialize};

use crate::{
    codec::{combine, LeafEncoding},
    resolve::hex_hashes,
    tree::amount_string,
    Address, Hash32, MAX_PROOF_DEPTH,
};

/// Inputs for one verification in a batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimProof {
    pub index: u64,
    pub address: Address,
    #[serde(with = "amount_string")]
    pub amount: u128,
    #[serde(with = "hex_hashes")]
    pub proof: Vec<Hash32>,
}

/// Fold a proof over a leaf with sorted-pair hashing.
pub fn process_proof(leaf: Hash32, proof: &[Hash32]) -> Hash32 {
    proof.iter().fold(leaf, |acc, sibling| combine(&acc, sibling))
}

/// Verify against the default (index-bound) leaf encoding.
pub fn verify(root: &Hash32, proof: &[Hash32], index: u64, address: &Address, amount: u128) -> bool {
    verify_with(LeafEncoding::default(), root, proof, index, address, amount)
}

pub fn verify_with(
    encoding: LeafEncoding,
    root: &Hash32,
    proof: &[Hash32],
    index: u64,
    address: &Address,
    amount: u128,
) -> bool {
    if proof.len() > MAX_PROOF_DEPTH || amount == 0 {
        return false;
    }
    let leaf = encoding.leaf_hash(index, address, amount);
    process_proof(leaf, proof) == *root
}

/// Independent per-claim results, in input order.
pub fn verify_batch(root: &Hash32, claims: &[ClaimProof]) -> Vec<bool> {
    claims
        .iter()
        .map(|c| verify(root, &c.proof, c.index, &c.address, c.amount))
        .collect()
}
