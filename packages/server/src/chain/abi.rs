//! Minimal ABI encoding for the handful of calls the campaign contracts
//! expose. Everything is 32-byte words; the only dynamic argument we ever
//! send is the `bytes32[]` proof.

use airdrop_merkle_core::{keccak256, Address, Hash32};

use super::rpc::RpcFailure;

pub const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0]; // Error(string)
pub const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71]; // Panic(uint256)

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("ABI decode error: {0}")]
pub struct AbiError(pub String);

impl From<AbiError> for RpcFailure {
    fn from(e: AbiError) -> Self {
        RpcFailure::Decode(e.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Uint(u128),
    Address(Address),
    Bytes32(Hash32),
    Bytes32Array(Vec<Hash32>),
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Event topic0 for `signature`.
pub fn event_topic(signature: &str) -> Hash32 {
    keccak256(signature.as_bytes())
}

pub fn uint_word(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

pub fn address_word(address: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

/// `selector(signature) ++ abi.encode(args…)`.
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut head = Vec::with_capacity(32 * args.len());
    let mut tail = Vec::new();
    let head_len = 32 * args.len();

    for arg in args {
        match arg {
            Token::Uint(v) => head.extend_from_slice(&uint_word(*v)),
            Token::Address(a) => head.extend_from_slice(&address_word(a)),
            Token::Bytes32(h) => head.extend_from_slice(h),
            Token::Bytes32Array(items) => {
                head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
                tail.extend_from_slice(&uint_word(items.len() as u128));
                for item in items {
                    tail.extend_from_slice(item);
                }
            }
        }
    }

    let mut out = Vec::with_capacity(4 + head.len() + tail.len());
    out.extend_from_slice(&selector(signature));
    out.extend_from_slice(&head);
    out.extend_from_slice(&tail);
    out
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

pub fn word(data: &[u8], index: usize) -> Result<&[u8], AbiError> {
    let start = index * 32;
    data.get(start..start + 32)
        .ok_or_else(|| AbiError(format!("return data too short for word {}", index)))
}

/// Word at `index` as an unsigned integer that must fit in 128 bits.
pub fn decode_uint(data: &[u8], index: usize) -> Result<u128, AbiError> {
    let w = word(data, index)?;
    if w[..16].iter().any(|b| *b != 0) {
        return Err(AbiError(format!("word {} overflows u128", index)));
    }
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&w[16..]);
    Ok(u128::from_be_bytes(buf))
}

pub fn decode_u64(data: &[u8], index: usize) -> Result<u64, AbiError> {
    let v = decode_uint(data, index)?;
    u64::try_from(v).map_err(|_| AbiError(format!("word {} overflows u64", index)))
}

pub fn decode_bool(data: &[u8], index: usize) -> Result<bool, AbiError> {
    match decode_uint(data, index)? {
        0 => Ok(false),
        1 => Ok(true),
        v => Err(AbiError(format!("{} is not a bool", v))),
    }
}

pub fn decode_address(data: &[u8], index: usize) -> Result<Address, AbiError> {
    let w = word(data, index)?;
    if w[..12].iter().any(|b| *b != 0) {
        return Err(AbiError(format!("word {} is not an address", index)));
    }
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&w[12..]);
    Ok(Address(bytes))
}

pub fn decode_bytes32(data: &[u8], index: usize) -> Result<Hash32, AbiError> {
    let mut out = [0u8; 32];
    out.copy_from_slice(word(data, index)?);
    Ok(out)
}

fn offset_at(data: &[u8], index: usize) -> Result<usize, AbiError> {
    let offset = decode_u64(data, index)?;
    usize::try_from(offset).map_err(|_| AbiError("offset out of range".to_string()))
}

/// A single dynamic `string` return value.
pub fn decode_string(data: &[u8]) -> Result<String, AbiError> {
    let offset = offset_at(data, 0)?;
    let body = data
        .get(offset..)
        .ok_or_else(|| AbiError("string offset past end".to_string()))?;
    let len = offset_at(body, 0)?;
    let bytes = body
        .get(32..32 + len)
        .ok_or_else(|| AbiError("string length past end".to_string()))?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// A single dynamic array of static tuples with `width` words each.
/// Returns the raw words of every element.
pub fn decode_tuple_array(data: &[u8], width: usize) -> Result<Vec<&[u8]>, AbiError> {
    let offset = offset_at(data, 0)?;
    let body = data
        .get(offset..)
        .ok_or_else(|| AbiError("array offset past end".to_string()))?;
    let len = offset_at(body, 0)?;
    let elem_size = 32 * width;
    let elements = body
        .get(32..32 + len.saturating_mul(elem_size))
        .ok_or_else(|| AbiError("array length past end".to_string()))?;
    Ok(elements.chunks(elem_size).collect())
}

/// What a revert payload says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revert {
    /// `require(cond, "reason")` / `revert("reason")`.
    Reason(String),
    Panic(u128),
    /// A custom error: selector plus raw arguments.
    Custom([u8; 4], Vec<u8>),
}

pub fn decode_revert(data: &[u8]) -> Option<Revert> {
    if data.len() < 4 {
        return None;
    }
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&data[..4]);
    let args = &data[4..];
    match sel {
        ERROR_STRING_SELECTOR => decode_string(args).ok().map(Revert::Reason),
        PANIC_SELECTOR => decode_uint(args, 0).ok().map(Revert::Panic),
        _ => Some(Revert::Custom(sel, args.to_vec())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_selectors() {
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(selector("Error(string)"), ERROR_STRING_SELECTOR);
        assert_eq!(selector("Panic(uint256)"), PANIC_SELECTOR);
        assert_eq!(
            selector("claim(uint256,address,uint128,bytes32[])"),
            [0x3f, 0x31, 0xae, 0x3f]
        );
    }

    #[test]
    fn dynamic_array_layout() {
        let proof = vec![[0x11u8; 32], [0x22u8; 32]];
        let data = encode_call(
            "claim(uint256,address,uint128,bytes32[])",
            &[
                Token::Uint(7),
                Token::Address(Address([0xaa; 20])),
                Token::Uint(1_000),
                Token::Bytes32Array(proof.clone()),
            ],
        );
        let args = &data[4..];
        assert_eq!(args.len(), 32 * (4 + 1 + 2));
        assert_eq!(decode_uint(args, 0).unwrap(), 7);
        assert_eq!(decode_address(args, 1).unwrap(), Address([0xaa; 20]));
        assert_eq!(decode_uint(args, 2).unwrap(), 1_000);
        assert_eq!(decode_uint(args, 3).unwrap(), 128); // offset to the array
        assert_eq!(decode_uint(args, 4).unwrap(), 2); // length
        assert_eq!(decode_bytes32(args, 5).unwrap(), proof[0]);
        assert_eq!(decode_bytes32(args, 6).unwrap(), proof[1]);
    }

    fn encode_string(s: &str) -> Vec<u8> {
        let mut out = uint_word(32).to_vec();
        out.extend_from_slice(&uint_word(s.len() as u128));
        let mut body = s.as_bytes().to_vec();
        body.resize(s.len().div_ceil(32) * 32, 0);
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn string_and_reason_decoding() {
        let encoded = encode_string("Airdrop Season 1");
        assert_eq!(decode_string(&encoded).unwrap(), "Airdrop Season 1");

        let mut revert = ERROR_STRING_SELECTOR.to_vec();
        revert.extend_from_slice(&encode_string("already claimed"));
        assert_eq!(
            decode_revert(&revert),
            Some(Revert::Reason("already claimed".to_string()))
        );
    }

    #[test]
    fn custom_and_short_reverts() {
        let sel = selector("SablierMerkleBase_InvalidProof()");
        assert_eq!(decode_revert(&sel), Some(Revert::Custom(sel, vec![])));
        assert_eq!(decode_revert(&[0x01, 0x02]), None);
    }

    #[test]
    fn oversized_words_are_rejected() {
        let mut w = [0u8; 32];
        w[0] = 1;
        assert!(decode_uint(&w, 0).is_err());
        assert!(decode_address(&w, 0).is_err());
        assert!(decode_uint(&w, 1).is_err());
    }
}
