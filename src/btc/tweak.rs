//! BIP-341 Key Tweaking
//!
//! A key-path Taproot spend is signed with the tweaked secret
//!
//! ```text
//! d' = (d or -d) + H_TapTweak(P_x || merkle_root?)
//! ```
//!
//! where `d` is negated first if the untweaked public key `P` has an odd Y
//! coordinate. With no script tree the merkle root is absent and the hash
//! covers the x-only key alone.

use crate::crypto::helpers::tagged_hash;
use crate::crypto::keys::KeyPair;
use crate::error::SigningError;
use secp256kfun::prelude::*;
use zeroize::Zeroizing;

/// Tweaked signing key for a key-path spend
pub struct TweakedKey {
    /// Tweaked secret scalar
    pub secret: Zeroizing<[u8; 32]>,
    /// x-only output key committed in the P2TR script
    pub output_key: [u8; 32],
}

/// Compute the TapTweak scalar bytes for an x-only key
pub fn tap_tweak_hash(x_only: &[u8; 32], merkle_root: Option<&[u8; 32]>) -> [u8; 32] {
    let mut data = Vec::with_capacity(64);
    data.extend_from_slice(x_only);
    if let Some(root) = merkle_root {
        data.extend_from_slice(root);
    }
    tagged_hash("TapTweak", &data)
}

/// Tweak a derived key pair per BIP-341
///
/// Fails with [`SigningError::InvalidTweak`] if any scalar falls outside the
/// curve order or the tweaked secret is zero. Neither can happen for a
/// correctly derived key.
pub fn tweak_key_pair(
    key: &KeyPair,
    merkle_root: Option<&[u8; 32]>,
) -> Result<TweakedKey, SigningError> {
    let secret_scalar: Scalar<Secret, NonZero> = Scalar::from_bytes(*key.private_key)
        .ok_or_else(|| invalid_tweak("private key is zero or exceeds the curve order"))?;

    // If Y is odd, negate secret before tweaking
    let secret_for_tweak = if key.has_odd_y() {
        -secret_scalar
    } else {
        secret_scalar
    };

    let tweak_bytes = tap_tweak_hash(&key.x_only(), merkle_root);
    let tweak_scalar: Scalar<Public, Zero> = Scalar::from_bytes(tweak_bytes)
        .ok_or_else(|| invalid_tweak("tweak hash exceeds the curve order"))?;

    // Tweaked secret: d' = d + tweak
    let tweaked_secret = s!(secret_for_tweak + tweak_scalar);
    let tweaked_secret: Scalar<Secret, NonZero> = tweaked_secret
        .non_zero()
        .ok_or_else(|| invalid_tweak("tweaked secret is zero"))?;

    let output_key = g!(tweaked_secret * G).normalize().to_xonly_bytes();

    Ok(TweakedKey {
        secret: Zeroizing::new(tweaked_secret.to_bytes()),
        output_key,
    })
}

fn invalid_tweak(reason: &'static str) -> SigningError {
    tracing::error!(reason, "unexpected Taproot tweak failure");
    SigningError::InvalidTweak(reason)
}
