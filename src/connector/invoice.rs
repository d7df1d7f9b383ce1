//! BOLT 11 payment request decoding
//!
//! Only the fields the connectors need: payment hash and amount. Parsing is
//! done on the raw signed invoice so that a request lacking a payment hash
//! can be reported as such instead of failing semantic validation.

use crate::error::ConnectorError;
use lightning_invoice::SignedRawBolt11Invoice;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedInvoice {
    /// Hex payment hash
    pub payment_hash: Option<String>,
    pub amount_msat: Option<u64>,
}

/// Decode a BOLT 11 payment request
pub fn decode_invoice(operation: &'static str, payment_request: &str) -> Result<DecodedInvoice, ConnectorError> {
    let signed = SignedRawBolt11Invoice::from_str(payment_request.trim()).map_err(|e| {
        ConnectorError::InvalidPaymentRequest {
            operation,
            reason: e.to_string(),
        }
    })?;
    let raw = signed.raw_invoice();

    Ok(DecodedInvoice {
        payment_hash: raw.payment_hash().map(|hash| hash.0.to_string()),
        amount_msat: raw.amount_pico_btc().map(|pico| pico / 10),
    })
}

/// Payment hash from the backend's response, else from the decoded request
pub fn resolve_payment_hash(
    operation: &'static str,
    from_response: Option<String>,
    decoded: Option<&DecodedInvoice>,
) -> Result<String, ConnectorError> {
    from_response
        .filter(|hash| !hash.is_empty())
        .or_else(|| decoded.and_then(|d| d.payment_hash.clone()))
        .ok_or(ConnectorError::MissingPaymentHash { operation })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_payment_hash_and_amount() {
        let hash = [0xab; 32];
        let bolt11 = fixtures::invoice(hash, Some(1_000_000));

        let decoded = decode_invoice("send_payment", &bolt11).unwrap();
        assert_eq!(decoded.payment_hash.as_deref(), Some(hex::encode(hash).as_str()));
        assert_eq!(decoded.amount_msat, Some(1_000_000));
    }

    #[test]
    fn test_decode_without_amount() {
        let decoded = decode_invoice("send_payment", &fixtures::invoice([1; 32], None)).unwrap();
        assert_eq!(decoded.amount_msat, None);
        assert!(decoded.payment_hash.is_some());
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            decode_invoice("send_payment", "lnbc1notaninvoice"),
            Err(ConnectorError::InvalidPaymentRequest { operation: "send_payment", .. })
        ));
    }

    #[test]
    fn test_resolve_payment_hash_order() {
        let decoded = DecodedInvoice {
            payment_hash: Some("bb".repeat(32)),
            amount_msat: None,
        };
        assert_eq!(
            resolve_payment_hash("make_invoice", Some("aa".repeat(32)), Some(&decoded)).unwrap(),
            "aa".repeat(32)
        );
        assert_eq!(
            resolve_payment_hash("make_invoice", None, Some(&decoded)).unwrap(),
            "bb".repeat(32)
        );
        assert_eq!(
            resolve_payment_hash("make_invoice", Some(String::new()), Some(&decoded)).unwrap(),
            "bb".repeat(32)
        );
    }

    #[test]
    fn test_missing_payment_hash() {
        let decoded = DecodedInvoice::default();
        assert!(matches!(
            resolve_payment_hash("make_invoice", None, Some(&decoded)),
            Err(ConnectorError::MissingPaymentHash { operation: "make_invoice" })
        ));
        assert!(matches!(
            resolve_payment_hash("send_payment", None, None),
            Err(ConnectorError::MissingPaymentHash { operation: "send_payment" })
        ));
    }
}
