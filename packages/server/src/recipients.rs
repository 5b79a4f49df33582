//! Reading recipient lists for tree building: a JSON array of
//! `{address, amount}` objects, or CSV with `address,amount` rows.

use std::path::Path;

use airdrop_merkle_core::{parse_amount, Address, Recipient};
use anyhow::{bail, Context, Result};

pub fn load_recipients(path: &Path) -> Result<Vec<Recipient>> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        || body.trim_start().starts_with('[');
    if is_json {
        parse_json(&body).with_context(|| format!("invalid recipient JSON in {}", path.display()))
    } else {
        parse_csv(&body).with_context(|| format!("invalid recipient CSV in {}", path.display()))
    }
}

pub fn parse_json(body: &str) -> Result<Vec<Recipient>> {
    Ok(serde_json::from_str(body)?)
}

/// Blank lines, `#` comments and an `address,amount` header are skipped.
pub fn parse_csv(body: &str) -> Result<Vec<Recipient>> {
    let mut out = Vec::new();
    for (n, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split(',').map(str::trim);
        let (Some(address), Some(amount), None) = (fields.next(), fields.next(), fields.next()) else {
            bail!("line {}: expected `address,amount`", n + 1);
        };
        if n == 0 && address.eq_ignore_ascii_case("address") {
            continue;
        }
        let address: Address = address
            .parse()
            .with_context(|| format!("line {}: bad address {}", n + 1, address))?;
        let amount = parse_amount(amount).with_context(|| format!("line {}: bad amount {}", n + 1, amount))?;
        out.push(Recipient::new(address, amount));
    }
    if out.is_empty() {
        bail!("no recipients found");
    }
    Ok(out)
}
