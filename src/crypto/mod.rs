//! Cryptographic Primitives
//!
//! - **helpers**: tagged hash (BIP340) and payment-hash helpers
//! - **keys**: the key provider boundary and the BIP-32 seed provider

pub mod helpers;
pub mod keys;

pub use keys::{parse_path, KeyPair, KeyProvider, SeedKeyProvider};
