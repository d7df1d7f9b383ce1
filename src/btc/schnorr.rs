//! BIP-340 Schnorr Signing
//!
//! Deterministic BIP-340 signatures (all-zero auxiliary randomness) over a
//! 32-byte message, computed with secp256kfun scalar arithmetic.

use crate::crypto::helpers::tagged_hash;
use secp256kfun::prelude::*;

/// BIP340/challenge hash
fn challenge_hash(r_bytes: &[u8; 32], pubkey_bytes: &[u8; 32], message: &[u8; 32]) -> [u8; 32] {
    let mut data = Vec::with_capacity(96);
    data.extend_from_slice(r_bytes);
    data.extend_from_slice(pubkey_bytes);
    data.extend_from_slice(message);
    tagged_hash("BIP0340/challenge", &data)
}

/// BIP340/nonce hash
fn nonce_hash(masked_secret: &[u8; 32], pubkey_bytes: &[u8; 32], message: &[u8; 32]) -> [u8; 32] {
    let mut data = Vec::with_capacity(96);
    data.extend_from_slice(masked_secret);
    data.extend_from_slice(pubkey_bytes);
    data.extend_from_slice(message);
    tagged_hash("BIP0340/nonce", &data)
}

/// Sign a 32-byte message, returning the 64-byte signature `R_x || s`
///
/// The secret is negated when its public key has an odd Y so the signature
/// verifies against the x-only key.
pub fn sign_bip340(secret_bytes: &[u8; 32], message: &[u8; 32]) -> Result<[u8; 64], &'static str> {
    let secret: Scalar<Secret, NonZero> =
        Scalar::from_bytes(*secret_bytes).ok_or("secret is zero or exceeds the curve order")?;

    let public = g!(secret * G).normalize();
    let secret = if public.is_y_even() { secret } else { -secret };
    let pubkey_bytes = public.to_xonly_bytes();

    let aux_hashed = tagged_hash("BIP0340/aux", &[0u8; 32]);
    let even_secret = secret.to_bytes();
    let mut masked_secret = [0u8; 32];
    for (i, byte) in masked_secret.iter_mut().enumerate() {
        *byte = even_secret[i] ^ aux_hashed[i];
    }

    let k_bytes = nonce_hash(&masked_secret, &pubkey_bytes, message);
    let k: Scalar<Secret, Zero> = Scalar::from_bytes_mod_order(k_bytes);
    let k: Scalar<Secret, NonZero> = k.non_zero().ok_or("nonce is zero")?;

    // R keeps its x coordinate under negation; only k flips
    let r_point = g!(k * G).normalize();
    let k = if r_point.is_y_even() { k } else { -k };
    let r_bytes = r_point.to_xonly_bytes();

    let e_bytes = challenge_hash(&r_bytes, &pubkey_bytes, message);
    let e: Scalar<Public, Zero> = Scalar::from_bytes_mod_order(e_bytes);

    let s = s!(k + e * secret);

    let mut signature = [0u8; 64];
    signature[..32].copy_from_slice(&r_bytes);
    signature[32..].copy_from_slice(&s.to_bytes());
    Ok(signature)
}
