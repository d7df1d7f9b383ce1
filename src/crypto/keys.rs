//! Key Provider Boundary
//!
//! The signing engine never holds a seed. It asks a [`KeyProvider`] for the
//! key pair at a derivation path, uses it for the duration of one call, and
//! drops it. [`KeyPair`] zeroizes its secret on drop.
//!
//! [`SeedKeyProvider`] is the BIP-32 implementation used by the CLI and the
//! tests; wallets with their own key storage implement the trait themselves.

use crate::error::KeyError;
use bip39::Mnemonic;
use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::Network;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

// ============================================================================
// Key Pair
// ============================================================================

/// Ephemeral key pair returned by a [`KeyProvider`]
pub struct KeyPair {
    /// 32-byte secret scalar
    pub private_key: Zeroizing<[u8; 32]>,
    /// 33-byte compressed public key (0x02/0x03 prefix carries the Y parity)
    pub public_key: [u8; 33],
}

impl KeyPair {
    /// True if the public key has an odd Y coordinate
    pub fn has_odd_y(&self) -> bool {
        self.public_key[0] == 0x03
    }

    /// The 32-byte x-only public key
    pub fn x_only(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.public_key[1..]);
        out
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode(self.public_key))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Provider Trait
// ============================================================================

/// Source of hierarchically derived keys
///
/// Implementations must be deterministic: the same seed and path always
/// yield the same key pair.
pub trait KeyProvider: Send + Sync {
    fn derive_key(&self, path: &DerivationPath) -> Result<KeyPair, KeyError>;
}

impl<T: KeyProvider + ?Sized> KeyProvider for std::sync::Arc<T> {
    fn derive_key(&self, path: &DerivationPath) -> Result<KeyPair, KeyError> {
        (**self).derive_key(path)
    }
}

// ============================================================================
// BIP-32 Seed Provider
// ============================================================================

/// BIP-32 key provider backed by an in-memory master key
pub struct SeedKeyProvider {
    master: Xpriv,
    secp: Secp256k1<All>,
}

impl SeedKeyProvider {
    /// Build from a BIP-39 seed (usually 64 bytes)
    pub fn from_seed(seed: &[u8]) -> Result<Self, KeyError> {
        // The master key's network only affects xprv serialization, never the
        // derived key material.
        let master = Xpriv::new_master(Network::Bitcoin, seed).map_err(|e| {
            KeyError::Derivation {
                path: "m".to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            master,
            secp: Secp256k1::new(),
        })
    }

    /// Build from a BIP-39 mnemonic and optional passphrase
    pub fn from_mnemonic(phrase: &str, passphrase: Option<&str>) -> Result<Self, KeyError> {
        let mnemonic = Mnemonic::parse_normalized(phrase)
            .map_err(|e| KeyError::InvalidMnemonic(e.to_string()))?;
        let seed = Zeroizing::new(mnemonic.to_seed(passphrase.unwrap_or("")));
        Self::from_seed(&seed[..])
    }
}

impl KeyProvider for SeedKeyProvider {
    fn derive_key(&self, path: &DerivationPath) -> Result<KeyPair, KeyError> {
        let child = self
            .master
            .derive_priv(&self.secp, path)
            .map_err(|e| KeyError::Derivation {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        let public_key = child.private_key.public_key(&self.secp).serialize();
        Ok(KeyPair {
            private_key: Zeroizing::new(child.private_key.secret_bytes()),
            public_key,
        })
    }
}

/// Parse a derivation path string such as `m/86'/0'/0'/0/0`
pub fn parse_path(path: &str) -> Result<DerivationPath, KeyError> {
    DerivationPath::from_str(path).map_err(|_| KeyError::InvalidPath(path.to_string()))
}
