//! Normalized request and response shapes
//!
//! Identical across backends. Amounts are whole satoshis.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Success envelope: `{ "data": T }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetInfoResponse {
    pub alias: String,
    /// Node or wallet public key (hex)
    pub pubkey: String,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetBalanceResponse {
    /// Satoshis
    pub balance: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Incoming,
    Outgoing,
}

/// A settled invoice or payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub payment_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_request: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preimage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    /// Satoshis
    pub amount: u64,
    /// Satoshis
    pub fees_paid: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetTransactionsResponse {
    pub transactions: Vec<WalletTransaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MakeInvoiceArgs {
    /// Satoshis
    pub amount: u64,
    #[serde(default)]
    pub memo: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MakeInvoiceResponse {
    pub payment_request: String,
    pub payment_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendPaymentArgs {
    pub payment_request: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRoute {
    /// Satoshis delivered to the payee
    pub total_amt: u64,
    /// Satoshis paid in routing fees
    pub total_fees: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendPaymentResponse {
    pub preimage: String,
    pub payment_hash: String,
    pub route: PaymentRoute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysendArgs {
    /// Destination node public key (hex)
    pub pubkey: String,
    /// Satoshis
    pub amount: u64,
    /// TLV type (decimal string) to UTF-8 value
    #[serde(default)]
    pub custom_records: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckPaymentArgs {
    pub payment_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckPaymentResponse {
    pub paid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preimage: Option<String>,
}

impl CheckPaymentResponse {
    pub fn not_paid() -> Self {
        Self {
            paid: false,
            preimage: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignMessageArgs {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignMessageResponse {
    pub message: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectPeerArgs {
    pub pubkey: String,
    /// `host` or `host:port`
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectPeerResponse {
    pub pubkey: String,
}

/// Hex-encode each custom record value from its UTF-8 bytes
pub fn hex_encode_records(records: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    records
        .iter()
        .map(|(tlv_type, value)| (tlv_type.clone(), hex::encode(value.as_bytes())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_shape() {
        let envelope = Envelope::new(GetBalanceResponse { balance: 21 });
        assert_eq!(serde_json::to_value(&envelope).unwrap(), json!({"data": {"balance": 21}}));
    }

    #[test]
    fn test_records_hex_encoded_from_utf8() {
        let mut records = BTreeMap::new();
        records.insert("7629169".to_string(), "hello".to_string());
        let encoded = hex_encode_records(&records);
        assert_eq!(encoded["7629169"], "68656c6c6f");
    }

    #[test]
    fn test_transaction_type_serializes_as_type() {
        let tx = WalletTransaction {
            kind: TransactionType::Outgoing,
            payment_hash: "00".repeat(32),
            payment_request: None,
            preimage: None,
            memo: None,
            amount: 5,
            fees_paid: 0,
            settled_at: Some(1),
        };
        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value["type"], "outgoing");
        assert!(value.get("memo").is_none());
    }
}
