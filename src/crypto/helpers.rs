//! Cryptographic Helper Functions
//!
//! Small hashing primitives shared by the Taproot signer and the connectors.

use sha2::{Digest, Sha256};

// ============================================================================
// Tagged Hash (BIP340)
// ============================================================================

/// Compute BIP340 tagged hash: SHA256(SHA256(tag) || SHA256(tag) || data)
///
/// This is the standard tagged hash construction used throughout Bitcoin's
/// Taproot/Schnorr implementation for domain separation.
///
/// # Examples
/// - "TapTweak" tag for Taproot key tweaking
/// - "BIP0340/challenge" for Schnorr signature challenges
pub fn tagged_hash(tag: &str, data: &[u8]) -> [u8; 32] {
    let tag_hash = Sha256::digest(tag.as_bytes());
    let mut hasher = Sha256::new();
    hasher.update(tag_hash);
    hasher.update(tag_hash);
    hasher.update(data);
    hasher.finalize().into()
}

/// Plain SHA256, used for Lightning payment hashes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Payment hash (hex) of a hex-encoded preimage.
pub fn payment_hash_from_preimage(preimage_hex: &str) -> Result<String, hex::FromHexError> {
    let preimage = hex::decode(preimage_hex)?;
    Ok(hex::encode(sha256(&preimage)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_hash() {
        let result = tagged_hash("TapTweak", &[]);
        assert_eq!(result.len(), 32);

        // Same tag + data should give same result
        let data = b"test data";
        let hash1 = tagged_hash("TestTag", data);
        let hash2 = tagged_hash("TestTag", data);
        assert_eq!(hash1, hash2);

        // Different tag should give different result
        let hash3 = tagged_hash("OtherTag", data);
        assert_ne!(hash1, hash3);
    }

    #[test]
    fn test_tagged_hash_matches_bitcoin_taptweak() {
        use bitcoin::hashes::Hash;
        use bitcoin::key::XOnlyPublicKey;
        use bitcoin::taproot::TapTweakHash;
        use std::str::FromStr;

        let xonly = XOnlyPublicKey::from_str(
            "cc8a4bc64d897bddc5fbc2f670f7a8ba0b386779106cf1223c6fc5d7cd6fc115",
        )
        .unwrap();
        let expected = TapTweakHash::from_key_and_tweak(xonly, None);

        assert_eq!(
            tagged_hash("TapTweak", &xonly.serialize()),
            expected.to_byte_array()
        );
    }

    #[test]
    fn test_payment_hash_from_preimage() {
        let preimage = "00".repeat(32);
        let hash = payment_hash_from_preimage(&preimage).unwrap();
        // SHA256 of 32 zero bytes
        assert_eq!(
            hash,
            "66687aadf862bd776c8fc18b8e9f8e20089714856ee233b3902a591d0d5f2925"
        );
        assert!(payment_hash_from_preimage("zz").is_err());
    }
}
