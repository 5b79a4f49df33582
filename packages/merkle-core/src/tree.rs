//! Tree construction.
//!
//! Layout: for `n` leaves the node array has `2n - 1` entries, `nodes[0]` is
//! the root and `nodes[i] = combine(nodes[2i + 1], nodes[2i + 2])`. Leaves are
//! sorted by hash and the k-th smallest is stored at `nodes[len - 1 - k]`.
//! Entries are ordered by address, so both the root and each entry's index
//! depend only on the recipient multiset.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    codec::{combine, LeafEncoding},
    Address, Hash32, TreeError, MAX_PROOF_DEPTH,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    pub address: Address,
    #[serde(with = "amount_string")]
    pub amount: u128,
}

impl Recipient {
    pub fn new(address: Address, amount: u128) -> Self {
        Self { address, amount }
    }
}

/// One allocation and where its leaf sits in the node array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    pub index: u64,
    pub recipient: Recipient,
    pub tree_index: usize,
}

/// An immutable allocation tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleTree {
    encoding: LeafEncoding,
    nodes: Vec<Hash32>,
    entries: Vec<TreeEntry>,
}

/// Build a tree with the default index-bound encoding.
pub fn build(recipients: &[Recipient]) -> Result<MerkleTree, TreeError> {
    build_with(LeafEncoding::default(), recipients)
}

pub fn build_with(encoding: LeafEncoding, recipients: &[Recipient]) -> Result<MerkleTree, TreeError> {
    if recipients.is_empty() {
        return Err(TreeError::EmptyRecipientSet);
    }

    let mut seen = HashSet::with_capacity(recipients.len());
    for r in recipients {
        if r.amount == 0 {
            return Err(TreeError::InvalidRecipient(format!(
                "{} has a zero amount",
                r.address
            )));
        }
        if r.address.is_zero() {
            return Err(TreeError::InvalidRecipient("zero address".to_string()));
        }
        if !seen.insert(r.address) {
            return Err(TreeError::InvalidRecipient(format!(
                "{} appears more than once",
                r.address
            )));
        }
    }

    let mut sorted = recipients.to_vec();
    sorted.sort_by(|a, b| a.address.cmp(&b.address));

    let leaves: Vec<Hash32> = sorted
        .iter()
        .enumerate()
        .map(|(i, r)| encoding.leaf_hash(i as u64, &r.address, r.amount))
        .collect();

    let (nodes, tree_indices) = layout(&leaves);

    let entries = sorted
        .into_iter()
        .zip(tree_indices)
        .enumerate()
        .map(|(i, (recipient, tree_index))| TreeEntry {
            index: i as u64,
            recipient,
            tree_index,
        })
        .collect();

    Ok(MerkleTree {
        encoding,
        nodes,
        entries,
    })
}

/// Place sorted leaves into the node array and fill internal nodes.
/// Returns the array and, per input leaf, its node index.
fn layout(leaves: &[Hash32]) -> (Vec<Hash32>, Vec<usize>) {
    let n = leaves.len();
    let len = 2 * n - 1;

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| leaves[a].cmp(&leaves[b]));

    let mut nodes = vec![[0u8; 32]; len];
    let mut tree_indices = vec![0usize; n];
    for (rank, &leaf_idx) in order.iter().enumerate() {
        let pos = len - 1 - rank;
        nodes[pos] = leaves[leaf_idx];
        tree_indices[leaf_idx] = pos;
    }

    for i in (0..len - n).rev() {
        nodes[i] = combine(&nodes[2 * i + 1], &nodes[2 * i + 2]);
    }

    (nodes, tree_indices)
}

impl MerkleTree {
    /// Assemble a tree from already-validated parts (used by import).
    pub(crate) fn from_parts(encoding: LeafEncoding, nodes: Vec<Hash32>, entries: Vec<TreeEntry>) -> Self {
        Self {
            encoding,
            nodes,
            entries,
        }
    }

    pub fn root(&self) -> Hash32 {
        self.nodes[0]
    }

    pub fn encoding(&self) -> LeafEncoding {
        self.encoding
    }

    pub fn nodes(&self) -> &[Hash32] {
        &self.nodes
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, index: u64) -> Option<&TreeEntry> {
        self.entries.get(usize::try_from(index).ok()?)
    }

    /// Sum of all allocations. `None` on overflow.
    pub fn total_amount(&self) -> Option<u128> {
        self.entries
            .iter()
            .try_fold(0u128, |acc, e| acc.checked_add(e.recipient.amount))
    }

    /// Sibling path from the leaf at `tree_index` up to the root.
    pub fn proof_at(&self, tree_index: usize) -> Vec<Hash32> {
        let mut proof = Vec::new();
        let mut i = tree_index;
        while i > 0 && proof.len() < MAX_PROOF_DEPTH {
            let sibling = if i % 2 == 1 { i + 1 } else { i - 1 };
            proof.push(self.nodes[sibling]);
            i = (i - 1) / 2;
        }
        proof
    }

    pub fn proof(&self, index: u64) -> Option<Vec<Hash32>> {
        self.entry(index).map(|e| self.proof_at(e.tree_index))
    }

    pub fn leaf(&self, index: u64) -> Option<Hash32> {
        self.entry(index).map(|e| self.nodes[e.tree_index])
    }
}

pub mod amount_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_string())
    }

    /// Accepts a decimal string or a JSON integer. Zero is rejected either way.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => crate::parse_amount(&s).map_err(serde::de::Error::custom),
            Raw::Number(0) => Err(serde::de::Error::custom(crate::TreeError::InvalidAmount)),
            Raw::Number(n) => Ok(n as u128),
        }
    }
}
