//! In-memory campaign contract behind a scripted JSON-RPC transport.

#![allow(dead_code)]

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use airdrop_merkle_core::{build, hash_to_hex, Address, Hash32, MerkleTree, Recipient, PERCENT_SCALE};
use airdrop_server::chain::{
    abi::{address_word, event_topic, selector, uint_word},
    campaign::{CLAIM_SIGNATURE, STREAM_CLAIM_EVENT},
    rpc::{parse_hex_bytes, ChainClient, RpcFailure, Transport},
};
use serde_json::{json, Value};

pub const TOKEN: u128 = 1_000_000_000_000_000_000;
pub const TX_HASH: Hash32 = [0xaa; 32];
pub const LOCKUP: Address = Address([0x10; 20]);
pub const ADMIN: Address = Address([0xad; 20]);
pub const CAMPAIGN: Address = Address([0xca; 20]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Instant,
    Linear,
    Tranched,
    /// Answers nothing a campaign would.
    NotACampaign,
}

/// What happens to a submitted claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Mined,
    /// Mined but reverted with this payload.
    Reverted(Vec<u8>),
    /// Never shows up.
    Dropped,
}

pub struct ChainState {
    pub kind: Kind,
    pub root: Hash32,
    pub fee: u128,
    pub expired: bool,
    pub claimed: HashSet<u64>,
    pub estimate_fails: bool,
    pub send_error: Option<RpcFailure>,
    pub outcome: Outcome,
    /// Receipt polls that still return null.
    pub pending_polls: u32,
    pub stream_id: u128,
    pub sent: Vec<Value>,
    pub methods: Vec<String>,
}

#[derive(Clone)]
pub struct FakeChain {
    pub state: Arc<Mutex<ChainState>>,
}

fn revert(data: Option<Vec<u8>>) -> RpcFailure {
    RpcFailure::Rpc {
        code: 3,
        message: "execution reverted".to_string(),
        data: data.map(|d| format!("0x{}", hex::encode(d))),
    }
}

fn words(values: &[[u8; 32]]) -> Value {
    let mut out = Vec::new();
    for w in values {
        out.extend_from_slice(w);
    }
    json!(format!("0x{}", hex::encode(out)))
}

fn string_return(s: &str) -> Value {
    let mut out = uint_word(32).to_vec();
    out.extend_from_slice(&uint_word(s.len() as u128));
    let mut body = s.as_bytes().to_vec();
    body.resize(s.len().div_ceil(32) * 32, 0);
    out.extend_from_slice(&body);
    json!(format!("0x{}", hex::encode(out)))
}

fn bool_word(b: bool) -> [u8; 32] {
    uint_word(b as u128)
}

impl FakeChain {
    pub fn new(kind: Kind, root: Hash32) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChainState {
                kind,
                root,
                fee: 0,
                expired: false,
                claimed: HashSet::new(),
                estimate_fails: false,
                send_error: None,
                outcome: Outcome::Mined,
                pending_polls: 1,
                stream_id: 42,
                sent: Vec::new(),
                methods: Vec::new(),
            })),
        }
    }

    pub fn client(&self) -> ChainClient<FakeChain> {
        ChainClient::new(self.clone())
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut ChainState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn sent_count(&self) -> usize {
        self.with(|s| s.sent.len())
    }

    fn eth_call(&self, s: &ChainState, params: &Value) -> Result<Value, RpcFailure> {
        let data = parse_hex_bytes(params[0]["data"].as_str().unwrap_or("0x")).unwrap();
        if data.len() < 4 {
            return Err(revert(None));
        }
        let sel = [data[0], data[1], data[2], data[3]];
        let vesting = matches!(s.kind, Kind::Linear | Kind::Tranched);
        let is_campaign = s.kind != Kind::NotACampaign;
        let is = |sig: &str| selector(sig) == sel;

        if is("LOCKUP()") && vesting {
            return Ok(words(&[address_word(&LOCKUP)]));
        }
        if is("getSchedule()") && s.kind == Kind::Linear {
            return Ok(words(&[
                uint_word(0),
                uint_word(0),
                uint_word(3_600),
                uint_word(0),
                uint_word(86_400),
            ]));
        }
        if is("getTranchesWithPercentages()") && s.kind == Kind::Tranched {
            let half = (PERCENT_SCALE / 2) as u128;
            return Ok(words(&[
                uint_word(32),
                uint_word(2),
                uint_word(half),
                uint_word(100),
                uint_word(half),
                uint_word(200),
            ]));
        }
        if !is_campaign {
            return Err(revert(None));
        }
        if is("MERKLE_ROOT()") {
            return Ok(words(&[s.root]));
        }
        if is("FEE()") {
            return Ok(words(&[uint_word(s.fee)]));
        }
        if is("hasExpired()") {
            return Ok(words(&[bool_word(s.expired)]));
        }
        if is("hasClaimed(uint256)") {
            let index = u64::from_be_bytes(data[28..36].try_into().unwrap());
            return Ok(words(&[bool_word(s.claimed.contains(&index))]));
        }
        if is("campaignName()") {
            return Ok(string_return("Season 1"));
        }
        if is("admin()") {
            return Ok(words(&[address_word(&ADMIN)]));
        }
        if is("EXPIRATION()") {
            return Ok(words(&[uint_word(0)]));
        }
        if is("TOKEN()") {
            return Ok(words(&[address_word(&Address([0x70; 20]))]));
        }
        if is(CLAIM_SIGNATURE) {
            // Replay of a reverted claim.
            if let Outcome::Reverted(payload) = &s.outcome {
                return Err(revert(Some(payload.clone())));
            }
            return Ok(json!("0x"));
        }
        Err(revert(None))
    }

    fn receipt(&self, s: &ChainState) -> Value {
        let success = !matches!(s.outcome, Outcome::Reverted(_));
        let mut logs = Vec::new();
        if success {
            let recipient = s
                .sent
                .last()
                .and_then(|tx| tx["data"].as_str())
                .map(|d| parse_hex_bytes(d).unwrap())
                .map(|d| hex::encode(&d[36..68]))
                .unwrap_or_default();
            let topics = match s.kind {
                Kind::Instant => vec![
                    hash_to_hex(&event_topic("Claim(uint256,address,uint128)")),
                    format!("0x{}", recipient),
                ],
                _ => vec![
                    hash_to_hex(&event_topic(STREAM_CLAIM_EVENT)),
                    format!("0x{}", recipient),
                    hash_to_hex(&uint_word(s.stream_id)),
                ],
            };
            logs.push(json!({
                "address": CAMPAIGN.to_checksum(),
                "topics": topics,
                "data": "0x",
            }));
        }
        json!({
            "transactionHash": hash_to_hex(&TX_HASH),
            "blockNumber": "0x64",
            "status": if success { "0x1" } else { "0x0" },
            "logs": logs,
        })
    }
}

impl Transport for FakeChain {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcFailure> {
        let mut s = self.state.lock().unwrap();
        s.methods.push(method.to_string());
        match method {
            "eth_chainId" => Ok(json!("0x1")),
            "eth_call" => self.eth_call(&s, &params),
            "eth_estimateGas" => {
                if s.estimate_fails {
                    Err(revert(None))
                } else {
                    Ok(json!("0x186a0")) // 100_000
                }
            }
            "eth_gasPrice" => Ok(json!("0x3b9aca00")),
            "eth_sendTransaction" => {
                if let Some(err) = s.send_error.clone() {
                    return Err(err);
                }
                s.sent.push(params[0].clone());
                Ok(json!(hash_to_hex(&TX_HASH)))
            }
            "eth_getTransactionByHash" => {
                if s.sent.is_empty() || s.outcome == Outcome::Dropped {
                    Ok(Value::Null)
                } else {
                    Ok(json!({ "hash": hash_to_hex(&TX_HASH) }))
                }
            }
            "eth_getTransactionReceipt" => {
                if s.sent.is_empty() || s.outcome == Outcome::Dropped {
                    return Ok(Value::Null);
                }
                if s.pending_polls > 0 {
                    s.pending_polls -= 1;
                    return Ok(Value::Null);
                }
                Ok(self.receipt(&s))
            }
            other => Err(RpcFailure::Rpc {
                code: -32601,
                message: format!("method {} not found", other),
                data: None,
            }),
        }
    }
}

pub fn alice() -> Address {
    "0x742d35Cc6634c0532925a3b844Bc9e7595f30bEb".parse().unwrap()
}

pub fn fixture_tree() -> MerkleTree {
    let rows: [(&str, u128); 4] = [
        ("0x742d35Cc6634c0532925a3b844Bc9e7595f30bEb", 1),
        ("0xa0Ee7A142d267C1f36714E4a8F75612F20a79720", 12),
        ("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266", 2),
        ("0x90F79bf6EB2c4f870365E785982E1f101E93b906", 3),
    ];
    let recipients: Vec<Recipient> = rows
        .iter()
        .map(|(a, tokens)| Recipient::new(a.parse().unwrap(), tokens * TOKEN))
        .collect();
    build(&recipients).unwrap()
}
