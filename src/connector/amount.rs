//! Millisatoshi parsing
//!
//! Lightning backends report amounts in millisatoshis, either as JSON
//! numbers or as strings carrying an `msat` suffix (`"1000msat"`). Every
//! amount is parsed explicitly and converted to whole satoshis at the
//! connector boundary.

use crate::error::ConnectorError;
use serde_json::Value;

pub const MSAT_PER_SAT: u64 = 1_000;

/// Parse a millisatoshi amount from a JSON value
pub fn parse_msat(field: &str, value: &Value) -> Result<u64, ConnectorError> {
    match value {
        Value::Number(n) => n.as_u64().ok_or_else(|| invalid(field, value)),
        Value::String(s) => parse_msat_str(field, s),
        _ => Err(invalid(field, value)),
    }
}

/// Parse `"1234msat"` or `"1234"`
pub fn parse_msat_str(field: &str, raw: &str) -> Result<u64, ConnectorError> {
    let digits = raw.trim().strip_suffix("msat").unwrap_or(raw.trim());
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConnectorError::InvalidAmountFormat {
            field: field.to_string(),
            value: raw.to_string(),
        });
    }
    digits.parse::<u64>().map_err(|_| ConnectorError::InvalidAmountFormat {
        field: field.to_string(),
        value: raw.to_string(),
    })
}

/// Parse an optional millisatoshi field; absent or `null` is `None`
pub fn parse_optional_msat(field: &str, value: Option<&Value>) -> Result<Option<u64>, ConnectorError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => parse_msat(field, v).map(Some),
    }
}

/// Whole satoshis, rounding down
pub fn msat_to_sat(msat: u64) -> u64 {
    msat / MSAT_PER_SAT
}

pub fn sat_to_msat(field: &str, sat: u64) -> Result<u64, ConnectorError> {
    sat.checked_mul(MSAT_PER_SAT)
        .ok_or_else(|| ConnectorError::InvalidAmountFormat {
            field: field.to_string(),
            value: sat.to_string(),
        })
}

fn invalid(field: &str, value: &Value) -> ConnectorError {
    ConnectorError::InvalidAmountFormat {
        field: field.to_string(),
        value: value.to_string(),
    }
}
