//! Helpers shared by the connector integration tests

#![allow(dead_code)]

use bitcoin::hashes::{sha256, Hash};
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use lightning_invoice::{Currency, InvoiceBuilder, PaymentSecret};
use std::time::Duration;

pub const PAYMENT_HASH: [u8; 32] = [0x5a; 32];

pub fn payment_hash_hex() -> String {
    hex::encode(PAYMENT_HASH)
}

/// Signed regtest invoice for [`PAYMENT_HASH`]
pub fn invoice(amount_msat: Option<u64>) -> String {
    let secp = Secp256k1::new();
    let node_key = SecretKey::from_slice(&[0x41; 32]).unwrap();

    let builder = InvoiceBuilder::new(Currency::Regtest)
        .description("integration".to_string())
        .payment_hash(sha256::Hash::from_byte_array(PAYMENT_HASH))
        .payment_secret(PaymentSecret([0x42; 32]))
        .duration_since_epoch(Duration::from_secs(1_700_000_000))
        .min_final_cltv_expiry_delta(144);

    match amount_msat {
        Some(msat) => builder
            .amount_milli_satoshis(msat)
            .build_signed(|hash| secp.sign_ecdsa_recoverable(hash, &node_key))
            .unwrap()
            .to_string(),
        None => builder
            .build_signed(|hash| secp.sign_ecdsa_recoverable(hash, &node_key))
            .unwrap()
            .to_string(),
    }
}
