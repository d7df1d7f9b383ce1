//! NIP-47 request and response payloads
//!
//! These are the decrypted `content` of kind 23194 (request) and kind 23195
//! (response) events. Amounts are millisatoshis.

use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const METHOD_GET_INFO: &str = "get_info";
pub const METHOD_GET_BALANCE: &str = "get_balance";
pub const METHOD_LIST_TRANSACTIONS: &str = "list_transactions";
pub const METHOD_MAKE_INVOICE: &str = "make_invoice";
pub const METHOD_PAY_INVOICE: &str = "pay_invoice";
pub const METHOD_PAY_KEYSEND: &str = "pay_keysend";
pub const METHOD_LOOKUP_INVOICE: &str = "lookup_invoice";
pub const METHOD_SIGN_MESSAGE: &str = "sign_message";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NwcRequest {
    pub method: String,
    pub params: Value,
}

impl NwcRequest {
    pub fn new(method: &str, params: Value) -> Self {
        Self {
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NwcError {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NwcResponse {
    pub result_type: String,
    #[serde(default)]
    pub error: Option<NwcError>,
    #[serde(default)]
    pub result: Option<Value>,
}

impl NwcResponse {
    /// The `result`, or the wallet's error as a remote transport error
    pub fn into_result(self) -> Result<Value, TransportError> {
        if let Some(error) = self.error {
            return Err(TransportError::Remote {
                code: error.code,
                message: error.message,
            });
        }
        self.result
            .ok_or_else(|| TransportError::Protocol(format!("{} response without result", self.result_type)))
    }
}

/// TLV record for `pay_keysend`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlvRecord {
    #[serde(rename = "type")]
    pub tlv_type: u64,
    /// Hex-encoded value
    pub value: String,
}
