//! Taproot Account Paths and Addresses
//!
//! The signer spends from a single BIP-86 key: the account prefix is fixed per
//! network type and the address index is always 0.
//!
//! | Network | Account prefix | Signing path |
//! |---------|----------------|--------------|
//! | mainnet | `m/86'/0'/0'/0` | `m/86'/0'/0'/0/0` |
//! | testnet / signet / regtest | `m/86'/1'/0'/0` | `m/86'/1'/0'/0/0` |

use crate::crypto::keys::{KeyPair, KeyProvider};
use crate::error::{KeyError, SigningError};
use bitcoin::bip32::{ChildNumber, DerivationPath};
use bitcoin::key::XOnlyPublicKey;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::taproot::TapNodeHash;
use bitcoin::Network;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Account prefix for production keys
pub const TAPROOT_ACCOUNT_PATH: &str = "m/86'/0'/0'/0";
/// Account prefix for testnet, signet and regtest keys
pub const TAPROOT_ACCOUNT_PATH_TEST: &str = "m/86'/1'/0'/0";
/// Only index 0 is used
pub const ADDRESS_INDEX: u32 = 0;

/// Derived signing address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Account prefix the key was derived under
    pub derivation_path: String,
    pub index: u32,
    /// Compressed public key (hex)
    pub public_key_hex: String,
    /// bech32m P2TR address
    pub encoded: String,
}

/// Account prefix for a network
pub fn account_path(network: Network) -> &'static str {
    match network {
        Network::Bitcoin => TAPROOT_ACCOUNT_PATH,
        _ => TAPROOT_ACCOUNT_PATH_TEST,
    }
}

/// Full signing path: account prefix plus the fixed address index
pub fn signing_path(network: Network) -> Result<DerivationPath, KeyError> {
    let prefix = account_path(network);
    let base = DerivationPath::from_str(prefix)
        .map_err(|_| KeyError::InvalidPath(prefix.to_string()))?;
    let index = ChildNumber::from_normal_idx(ADDRESS_INDEX)
        .map_err(|e| KeyError::InvalidPath(e.to_string()))?;
    Ok(base.child(index))
}

/// P2TR address (BIP-86 key-path only) for an internal key
pub fn taproot_address(internal_key: XOnlyPublicKey, network: Network) -> bitcoin::Address {
    committed_taproot_address(internal_key, None, network)
}

/// P2TR address for an internal key tweaked with an optional script tree root
pub fn committed_taproot_address(
    internal_key: XOnlyPublicKey,
    merkle_root: Option<TapNodeHash>,
    network: Network,
) -> bitcoin::Address {
    let secp = Secp256k1::verification_only();
    bitcoin::Address::p2tr(&secp, internal_key, merkle_root, network)
}

/// Derive the signing key pair and its address
pub(crate) fn derive_signing_key(
    provider: &dyn KeyProvider,
    network: Network,
) -> Result<(KeyPair, Address), SigningError> {
    let path = signing_path(network)?;
    let key = provider.derive_key(&path)?;

    let internal_key = XOnlyPublicKey::from_slice(&key.x_only()).map_err(|e| {
        SigningError::KeyProvider(KeyError::Derivation {
            path: path.to_string(),
            reason: e.to_string(),
        })
    })?;

    let address = Address {
        derivation_path: account_path(network).to_string(),
        index: ADDRESS_INDEX,
        public_key_hex: hex::encode(key.public_key),
        encoded: taproot_address(internal_key, network).to_string(),
    };
    Ok((key, address))
}
