//! Ethereum JSON-RPC plumbing: the transport seam, the HTTP transport and a
//! typed client over it.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use airdrop_merkle_core::{hash_to_hex, parse_hash, Address, Hash32};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A failed RPC round trip.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcFailure {
    /// The request never produced a JSON-RPC response (connect, timeout, HTTP).
    #[error("transport error: {0}")]
    Transport(String),
    /// The node or wallet answered with a JSON-RPC error object.
    #[error("RPC error ({code}): {message}")]
    Rpc {
        code: i64,
        message: String,
        /// Hex revert payload, when the node attached one.
        data: Option<String>,
    },
    /// The response arrived but did not have the expected shape.
    #[error("unexpected RPC response: {0}")]
    Decode(String),
}

impl RpcFailure {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Raw revert bytes carried in the error's `data` field.
    pub fn revert_data(&self) -> Option<Vec<u8>> {
        match self {
            Self::Rpc { data: Some(d), .. } => parse_hex_bytes(d).ok().filter(|b| !b.is_empty()),
            _ => None,
        }
    }

    /// A JSON-RPC error that a node returns for a reverted `eth_call` or
    /// `eth_estimateGas`.
    pub fn is_revert(&self) -> bool {
        match self {
            Self::Rpc { code, message, data } => {
                *code == 3 || data.is_some() || message.to_ascii_lowercase().contains("revert")
            }
            _ => false,
        }
    }
}

/// Anything that can carry a JSON-RPC request: HTTP in production, scripted
/// responders in tests.
pub trait Transport: Send + Sync + 'static {
    fn request(&self, method: &str, params: Value) -> impl Future<Output = Result<Value, RpcFailure>> + Send;
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Revert data shows up either as a bare hex string or nested as
/// `{ "data": "0x…" }` depending on the node.
fn error_data(data: Option<Value>) -> Option<String> {
    match data? {
        Value::String(s) if s.starts_with("0x") => Some(s),
        Value::Object(obj) => obj.get("data").and_then(|v| v.as_str()).map(|s| s.to_string()),
        _ => None,
    }
}

pub struct HttpTransport {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcFailure> {
        let req = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let resp: RpcResponse = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| RpcFailure::Transport(format!("{} request failed: {}", method, e)))?
            .json()
            .await
            .map_err(|e| RpcFailure::Transport(format!("failed to parse response for {}: {}", method, e)))?;

        if let Some(err) = resp.error {
            return Err(RpcFailure::Rpc {
                code: err.code,
                message: err.message,
                data: error_data(err.data),
            });
        }

        // `null` is a legitimate result (e.g. a pending receipt).
        Ok(resp.result.unwrap_or(Value::Null))
    }
}

/// Transaction fields this engine ever sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub data: Vec<u8>,
    pub value: u128,
    pub gas: Option<u64>,
}

impl TxRequest {
    pub fn to_json(&self) -> Value {
        let mut obj = json!({
            "from": self.from.to_checksum(),
            "to": self.to.to_checksum(),
            "data": format!("0x{}", hex::encode(&self.data)),
            "value": format!("0x{:x}", self.value),
        });
        if let Some(gas) = self.gas {
            obj["gas"] = Value::String(format!("0x{:x}", gas));
        }
        obj
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<Hash32>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: Hash32,
    pub block_number: u64,
    pub success: bool,
    pub logs: Vec<Log>,
}

/// Block selector for reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Number(u64),
}

impl BlockTag {
    fn to_json(self) -> Value {
        match self {
            Self::Latest => Value::String("latest".to_string()),
            Self::Number(n) => Value::String(format!("0x{:x}", n)),
        }
    }
}

/// Typed JSON-RPC client, cheap to clone.
pub struct ChainClient<T> {
    transport: Arc<T>,
}

impl<T> Clone for ChainClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

impl ChainClient<HttpTransport> {
    pub fn http(url: impl Into<String>) -> Self {
        Self::new(HttpTransport::new(url))
    }
}

impl<T: Transport> ChainClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn chain_id(&self) -> Result<u64, RpcFailure> {
        let result = self.transport.request("eth_chainId", json!([])).await?;
        parse_quantity_u64(&result)
    }

    /// `eth_call` returning the raw return data.
    pub async fn call(
        &self,
        to: &Address,
        data: &[u8],
        from: Option<&Address>,
        value: u128,
        block: BlockTag,
    ) -> Result<Vec<u8>, RpcFailure> {
        let mut tx = json!({
            "to": to.to_checksum(),
            "data": format!("0x{}", hex::encode(data)),
        });
        if let Some(from) = from {
            tx["from"] = Value::String(from.to_checksum());
        }
        if value > 0 {
            tx["value"] = Value::String(format!("0x{:x}", value));
        }

        let result = self
            .transport
            .request("eth_call", json!([tx, block.to_json()]))
            .await?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| RpcFailure::decode("eth_call: expected hex string"))?;
        parse_hex_bytes(hex_str).map_err(RpcFailure::Decode)
    }

    pub async fn estimate_gas(&self, tx: &TxRequest) -> Result<u64, RpcFailure> {
        let result = self
            .transport
            .request("eth_estimateGas", json!([tx.to_json()]))
            .await?;
        parse_quantity_u64(&result)
    }

    pub async fn gas_price(&self) -> Result<u128, RpcFailure> {
        let result = self.transport.request("eth_gasPrice", json!([])).await?;
        parse_quantity_u128(&result)
    }

    /// Hand the transaction to a node-managed account for signing and
    /// broadcast.
    pub async fn send_transaction(&self, tx: &TxRequest) -> Result<Hash32, RpcFailure> {
        let result = self
            .transport
            .request("eth_sendTransaction", json!([tx.to_json()]))
            .await?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| RpcFailure::decode("eth_sendTransaction: expected hash"))?;
        parse_hash(hex_str).map_err(|e| RpcFailure::Decode(e.to_string()))
    }

    /// Whether the network knows about the transaction yet.
    pub async fn transaction_known(&self, hash: &Hash32) -> Result<bool, RpcFailure> {
        let result = self
            .transport
            .request("eth_getTransactionByHash", json!([hash_to_hex(hash)]))
            .await?;
        Ok(!result.is_null())
    }

    pub async fn transaction_receipt(&self, hash: &Hash32) -> Result<Option<Receipt>, RpcFailure> {
        let result = self
            .transport
            .request("eth_getTransactionReceipt", json!([hash_to_hex(hash)]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        parse_receipt(&result).map(Some)
    }
}

fn parse_receipt(value: &Value) -> Result<Receipt, RpcFailure> {
    let obj = value
        .as_object()
        .ok_or_else(|| RpcFailure::decode("receipt: expected object"))?;

    let field = |key: &str| -> Result<&Value, RpcFailure> {
        obj.get(key)
            .ok_or_else(|| RpcFailure::Decode(format!("receipt: missing {}", key)))
    };

    let transaction_hash = parse_hash(field("transactionHash")?.as_str().unwrap_or_default())
        .map_err(|e| RpcFailure::Decode(e.to_string()))?;
    let block_number = parse_quantity_u64(field("blockNumber")?)?;
    let success = parse_quantity_u64(field("status")?)? == 1;

    let mut logs = Vec::new();
    if let Some(raw_logs) = obj.get("logs").and_then(|v| v.as_array()) {
        for raw in raw_logs {
            logs.push(parse_log(raw)?);
        }
    }

    Ok(Receipt {
        transaction_hash,
        block_number,
        success,
        logs,
    })
}

fn parse_log(value: &Value) -> Result<Log, RpcFailure> {
    let address = value
        .get("address")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcFailure::decode("log: missing address"))?
        .parse::<Address>()
        .map_err(|e| RpcFailure::Decode(e.to_string()))?;

    let topics = value
        .get("topics")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .map(|t| {
                    parse_hash(t.as_str().unwrap_or_default()).map_err(|e| RpcFailure::Decode(e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?
        .unwrap_or_default();

    let data = match value.get("data").and_then(|v| v.as_str()) {
        Some(d) => parse_hex_bytes(d).map_err(RpcFailure::Decode)?,
        None => Vec::new(),
    };

    Ok(Log { address, topics, data })
}

// ---------------------------------------------------------------------------
// Hex / quantity parsing helpers
// ---------------------------------------------------------------------------

pub fn parse_hex_bytes(hex_str: &str) -> Result<Vec<u8>, String> {
    let stripped = hex_str
        .strip_prefix("0x")
        .or_else(|| hex_str.strip_prefix("0X"))
        .unwrap_or(hex_str);

    if stripped.is_empty() {
        return Ok(Vec::new());
    }

    // Handle odd-length hex
    let padded = if stripped.len() % 2 == 1 {
        format!("0{}", stripped)
    } else {
        stripped.to_string()
    };

    hex::decode(&padded).map_err(|e| format!("invalid hex string: {}", e))
}

fn quantity_str(value: &Value) -> Result<&str, RpcFailure> {
    let s = value
        .as_str()
        .ok_or_else(|| RpcFailure::decode("expected hex quantity"))?;
    Ok(s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s))
}

pub fn parse_quantity_u64(value: &Value) -> Result<u64, RpcFailure> {
    let s = quantity_str(value)?;
    u64::from_str_radix(if s.is_empty() { "0" } else { s }, 16)
        .map_err(|_| RpcFailure::Decode(format!("invalid u64 quantity: {}", value)))
}

pub fn parse_quantity_u128(value: &Value) -> Result<u128, RpcFailure> {
    let s = quantity_str(value)?;
    u128::from_str_radix(if s.is_empty() { "0" } else { s }, 16)
        .map_err(|_| RpcFailure::Decode(format!("invalid u128 quantity: {}", value)))
}
