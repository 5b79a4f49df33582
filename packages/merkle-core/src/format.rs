//! Persisted tree format and distribution feed.
//!
//! ```json
//! {
//!   "format": "standard-v1",
//!   "leafEncoding": ["uint256", "address", "uint256"],
//!   "tree": ["0x…root", "0x…", …],
//!   "values": [{ "value": ["0", "0x742d…", "1000000000000000000"], "treeIndex": 13 }]
//! }
//! ```
//!
//! Imported data is untrusted: every leaf and internal node is recomputed
//! before a [`MerkleTree`] is handed out.

use std::{collections::HashSet, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    codec::{combine, LeafEncoding},
    hash_to_hex, parse_amount, parse_hash,
    tree::{amount_string, Recipient, TreeEntry},
    Address, Hash32, MerkleTree, TreeError,
};

pub const FORMAT_TAG: &str = "standard-v1";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeDump {
    pub format: String,
    pub leaf_encoding: Vec<String>,
    pub tree: Vec<String>,
    pub values: Vec<DumpValue>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpValue {
    pub value: Vec<Value>,
    pub tree_index: usize,
}

impl MerkleTree {
    pub fn dump(&self) -> TreeDump {
        let encoding = self.encoding();
        let values = self
            .entries()
            .iter()
            .map(|e| {
                let mut value = Vec::with_capacity(3);
                if encoding.binds_index() {
                    value.push(Value::String(e.index.to_string()));
                }
                value.push(Value::String(e.recipient.address.to_checksum()));
                value.push(Value::String(e.recipient.amount.to_string()));
                DumpValue {
                    value,
                    tree_index: e.tree_index,
                }
            })
            .collect();

        TreeDump {
            format: FORMAT_TAG.to_string(),
            leaf_encoding: encoding.tags().iter().map(|t| t.to_string()).collect(),
            tree: self.nodes().iter().map(hash_to_hex).collect(),
            values,
        }
    }

    pub fn export_json(&self) -> Result<String, TreeError> {
        serde_json::to_string_pretty(&self.dump()).map_err(|e| TreeError::Json(e.to_string()))
    }

    pub fn import_json(json: &str) -> Result<Self, TreeError> {
        let dump: TreeDump = serde_json::from_str(json).map_err(|e| TreeError::Json(e.to_string()))?;
        Self::load(&dump)
    }

    /// Import and require the root to equal a root known from elsewhere
    /// (typically the campaign contract).
    pub fn import_with_root(json: &str, expected_root: &Hash32) -> Result<Self, TreeError> {
        let tree = Self::import_json(json)?;
        if tree.root() != *expected_root {
            return Err(TreeError::RootMismatch);
        }
        Ok(tree)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), TreeError> {
        let json = self.export_json()?;
        std::fs::write(path, json).map_err(|e| TreeError::Io(format!("{}: {}", path.display(), e)))
    }

    pub fn read_from(path: &Path) -> Result<Self, TreeError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| TreeError::Io(format!("{}: {}", path.display(), e)))?;
        Self::import_json(&json)
    }

    /// Validate a dump and rebuild the tree from it.
    pub fn load(dump: &TreeDump) -> Result<Self, TreeError> {
        if dump.format != FORMAT_TAG {
            return Err(TreeError::UnsupportedFormat(dump.format.clone()));
        }
        let encoding = LeafEncoding::from_tags(dump.leaf_encoding.as_slice())?;

        let n = dump.values.len();
        if n == 0 || dump.tree.is_empty() {
            return Err(TreeError::MalformedTree("tree or values are empty".to_string()));
        }
        if dump.tree.len() != 2 * n - 1 {
            return Err(TreeError::MalformedTree(format!(
                "{} nodes cannot hold {} leaves",
                dump.tree.len(),
                n
            )));
        }

        let nodes: Vec<Hash32> = dump
            .tree
            .iter()
            .map(|h| parse_hash(h))
            .collect::<Result<_, _>>()?;
        let len = nodes.len();
        let first_leaf = len - n;

        let mut seen_slots = HashSet::with_capacity(n);
        let mut entries = Vec::with_capacity(n);
        for (position, item) in dump.values.iter().enumerate() {
            let (index, recipient) = parse_value(encoding, position, &item.value)?;

            if item.tree_index < first_leaf || item.tree_index >= len {
                return Err(TreeError::MalformedTree(format!(
                    "treeIndex {} is not a leaf slot",
                    item.tree_index
                )));
            }
            if !seen_slots.insert(item.tree_index) {
                return Err(TreeError::MalformedTree(format!(
                    "treeIndex {} used twice",
                    item.tree_index
                )));
            }

            let leaf = encoding.leaf_hash(index, &recipient.address, recipient.amount);
            if nodes[item.tree_index] != leaf {
                return Err(TreeError::MalformedTree(format!(
                    "leaf for value {} does not match tree",
                    position
                )));
            }

            entries.push(TreeEntry {
                index,
                recipient,
                tree_index: item.tree_index,
            });
        }

        for i in 0..first_leaf {
            if nodes[i] != combine(&nodes[2 * i + 1], &nodes[2 * i + 2]) {
                return Err(TreeError::MalformedTree(format!("node {} is inconsistent", i)));
            }
        }

        entries.sort_by_key(|e| e.index);
        let mut addresses = HashSet::with_capacity(n);
        for (pos, e) in entries.iter().enumerate() {
            if e.index != pos as u64 {
                return Err(TreeError::MalformedTree("indices are not contiguous from 0".to_string()));
            }
            if !addresses.insert(e.recipient.address) {
                return Err(TreeError::MalformedTree(format!(
                    "{} appears more than once",
                    e.recipient.address
                )));
            }
        }

        Ok(MerkleTree::from_parts(encoding, nodes, entries))
    }
}

fn parse_value(encoding: LeafEncoding, position: usize, value: &[Value]) -> Result<(u64, Recipient), TreeError> {
    let fields = encoding.tags().len();
    if value.len() != fields {
        return Err(TreeError::MalformedTree(format!(
            "value {} has {} fields, expected {}",
            position,
            value.len(),
            fields
        )));
    }

    let (index, rest) = if encoding.binds_index() {
        let index = value_text(&value[0])?
            .parse::<u64>()
            .map_err(|_| TreeError::MalformedTree(format!("value {} has a bad index", position)))?;
        (index, &value[1..])
    } else {
        (position as u64, value)
    };

    let address: Address = value_text(&rest[0])?.parse()?;
    let amount = parse_amount(&value_text(&rest[1])?)?;
    Ok((index, Recipient::new(address, amount)))
}

fn value_text(value: &Value) -> Result<String, TreeError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(TreeError::MalformedTree("value fields must be strings or numbers".to_string())),
    }
}

/// Campaign payload published to content-addressed storage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DistributionFeed {
    /// Stringified [`TreeDump`].
    pub merkle_tree: String,
    pub recipients: Vec<FeedRecipient>,
    pub root: String,
    pub total_amount: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedRecipient {
    pub address: Address,
    #[serde(with = "amount_string")]
    pub amount: u128,
}

impl DistributionFeed {
    /// Import the embedded tree and cross-check it against the feed's own
    /// root, recipient list and total.
    pub fn into_tree(&self) -> Result<MerkleTree, TreeError> {
        let root = parse_hash(&self.root)?;
        let tree = MerkleTree::import_with_root(&self.merkle_tree, &root)?;

        if self.recipients.len() != tree.len() {
            return Err(TreeError::FeedMismatch(format!(
                "{} recipients listed, tree holds {}",
                self.recipients.len(),
                tree.len()
            )));
        }

        let resolver = crate::Resolver::new(&tree);
        for r in &self.recipients {
            match resolver.get(&r.address) {
                Some(record) if record.amount == r.amount => {}
                _ => {
                    return Err(TreeError::FeedMismatch(format!(
                        "{} is not in the tree with amount {}",
                        r.address, r.amount
                    )))
                }
            }
        }

        let total = parse_amount(&self.total_amount)?;
        if tree.total_amount() != Some(total) {
            return Err(TreeError::FeedMismatch(format!(
                "total_amount {} does not match allocations",
                total
            )));
        }

        Ok(tree)
    }
}
