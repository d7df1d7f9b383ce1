//! Transaction Proposals
//!
//! A proposal is an unsigned PSBT (BIP-174) received as hex or base64. This module owns
//! the structural checks shared by preview and signing, and the ordered
//! fallback chains that resolve an input's spending key and an output's
//! address.

use crate::error::SigningError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bitcoin::key::XOnlyPublicKey;
use bitcoin::psbt::{Input, Output, Psbt};
use bitcoin::{Amount, TxOut};

/// Inputs accepted per signing operation
pub const SUPPORTED_INPUT_COUNT: usize = 1;

/// Parsed unsigned transaction proposal
#[derive(Debug, Clone)]
pub struct TransactionProposal {
    psbt: Psbt,
}

impl TransactionProposal {
    /// Parse a hex-encoded PSBT
    pub fn from_hex(psbt_hex: &str) -> Result<Self, SigningError> {
        let bytes = hex::decode(psbt_hex.trim())
            .map_err(|e| SigningError::InvalidProposal(format!("psbt hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Parse a base64-encoded PSBT
    pub fn from_base64(psbt_b64: &str) -> Result<Self, SigningError> {
        let bytes = BASE64
            .decode(psbt_b64.trim())
            .map_err(|e| SigningError::InvalidProposal(format!("psbt base64: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Parse a PSBT given as hex or base64
    pub fn parse(encoded: &str) -> Result<Self, SigningError> {
        let encoded = encoded.trim();
        if encoded.bytes().all(|b| b.is_ascii_hexdigit()) {
            Self::from_hex(encoded)
        } else {
            Self::from_base64(encoded)
        }
    }

    /// Parse a binary PSBT
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SigningError> {
        let psbt = Psbt::deserialize(bytes)
            .map_err(|e| SigningError::InvalidProposal(format!("psbt: {}", e)))?;
        Ok(Self { psbt })
    }

    pub fn from_psbt(psbt: Psbt) -> Self {
        Self { psbt }
    }

    pub fn psbt(&self) -> &Psbt {
        &self.psbt
    }

    pub fn into_psbt(self) -> Psbt {
        self.psbt
    }

    pub fn input_count(&self) -> usize {
        self.psbt.inputs.len()
    }

    /// Reject anything but a single-input proposal
    ///
    /// Runs before any key material is requested.
    pub fn ensure_single_input(&self) -> Result<(), SigningError> {
        let count = self.input_count();
        if count != SUPPORTED_INPUT_COUNT || self.psbt.unsigned_tx.input.len() != count {
            return Err(SigningError::UnsupportedInputCount(count));
        }
        Ok(())
    }

    /// Committed previous output of an input
    ///
    /// Prefers `witness_utxo`; falls back to the referenced output of a full
    /// `non_witness_utxo`.
    pub fn committed_output(&self, index: usize) -> Result<&TxOut, SigningError> {
        let input = self
            .psbt
            .inputs
            .get(index)
            .ok_or(SigningError::MissingCommittedValue { input: index })?;

        if let Some(utxo) = &input.witness_utxo {
            return Ok(utxo);
        }

        let outpoint = self
            .psbt
            .unsigned_tx
            .input
            .get(index)
            .map(|txin| txin.previous_output);

        match (&input.non_witness_utxo, outpoint) {
            (Some(prev_tx), Some(outpoint)) if prev_tx.compute_txid() == outpoint.txid => prev_tx
                .output
                .get(outpoint.vout as usize)
                .ok_or(SigningError::MissingCommittedValue { input: index }),
            _ => Err(SigningError::MissingCommittedValue { input: index }),
        }
    }

    /// Committed value of an input
    pub fn committed_value(&self, index: usize) -> Result<Amount, SigningError> {
        self.committed_output(index).map(|utxo| utxo.value)
    }
}

// ============================================================================
// Key Resolution
// ============================================================================

/// Where a spending or receiving key was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Explicit `tap_internal_key`
    InternalKey(XOnlyPublicKey),
    /// First Taproot derivation record (`tap_key_origins`)
    TapDerivation(XOnlyPublicKey),
    /// First legacy derivation record (`bip32_derivation`)
    Bip32Derivation(XOnlyPublicKey),
}

impl KeySource {
    pub fn key(&self) -> XOnlyPublicKey {
        match self {
            KeySource::InternalKey(k)
            | KeySource::TapDerivation(k)
            | KeySource::Bip32Derivation(k) => *k,
        }
    }
}

fn first_tap_derivation(
    origins: &std::collections::BTreeMap<
        XOnlyPublicKey,
        (Vec<bitcoin::taproot::TapLeafHash>, bitcoin::bip32::KeySource),
    >,
) -> Option<XOnlyPublicKey> {
    origins.keys().next().copied()
}

fn first_bip32_derivation(
    derivation: &std::collections::BTreeMap<bitcoin::secp256k1::PublicKey, bitcoin::bip32::KeySource>,
) -> Option<XOnlyPublicKey> {
    derivation.keys().next().map(|pk| pk.x_only_public_key().0)
}

/// Resolve an input's spending key
///
/// Order: explicit internal key, then Taproot derivation record, then legacy
/// derivation record.
pub fn resolve_input_key(input: &Input) -> Option<KeySource> {
    if let Some(key) = input.tap_internal_key {
        return Some(KeySource::InternalKey(key));
    }
    if let Some(key) = first_tap_derivation(&input.tap_key_origins) {
        return Some(KeySource::TapDerivation(key));
    }
    first_bip32_derivation(&input.bip32_derivation).map(KeySource::Bip32Derivation)
}

/// Resolve an output's key from its derivation metadata
///
/// Order: Taproot derivation record, then explicit internal key, then legacy
/// derivation record.
pub fn resolve_output_key(output: &Output) -> Option<KeySource> {
    if let Some(key) = first_tap_derivation(&output.tap_key_origins) {
        return Some(KeySource::TapDerivation(key));
    }
    if let Some(key) = output.tap_internal_key {
        return Some(KeySource::InternalKey(key));
    }
    first_bip32_derivation(&output.bip32_derivation).map(KeySource::Bip32Derivation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btc::testing::single_input_psbt;
    use base64::engine::general_purpose::STANDARD;
    use bitcoin::Network;

    #[test]
    fn test_parse_hex_and_base64() {
        let fixture = single_input_psbt(Network::Bitcoin, 50_000, 49_000);
        let bytes = fixture.psbt.serialize();

        let from_hex = TransactionProposal::parse(&hex::encode(&bytes)).unwrap();
        let from_b64 = TransactionProposal::parse(&STANDARD.encode(&bytes)).unwrap();
        assert_eq!(from_hex.psbt().serialize(), bytes);
        assert_eq!(from_b64.psbt().serialize(), bytes);
    }

    #[test]
    fn test_garbage_is_invalid_proposal() {
        assert!(matches!(
            TransactionProposal::parse("deadbeef"),
            Err(SigningError::InvalidProposal(_))
        ));
        assert!(matches!(
            TransactionProposal::parse("not a psbt!"),
            Err(SigningError::InvalidProposal(_))
        ));
    }

    #[test]
    fn test_non_witness_utxo_must_match_outpoint() {
        let fixture = single_input_psbt(Network::Bitcoin, 50_000, 49_000);
        let mut psbt = fixture.psbt.clone();
        psbt.inputs[0].witness_utxo = None;

        // Some other transaction than the one the input spends
        let mut unrelated = fixture.previous_tx.clone();
        unrelated.lock_time = bitcoin::absolute::LockTime::from_consensus(1);
        psbt.inputs[0].non_witness_utxo = Some(unrelated);

        let proposal = TransactionProposal::from_psbt(psbt);
        assert!(matches!(
            proposal.committed_value(0),
            Err(SigningError::MissingCommittedValue { input: 0 })
        ));
    }

    #[test]
    fn test_output_key_prefers_tap_derivation() {
        let fixture = single_input_psbt(Network::Bitcoin, 50_000, 49_000);
        let mut output = Output::default();
        assert_eq!(resolve_output_key(&output), None);

        output.tap_internal_key = Some(fixture.internal_key);
        assert_eq!(
            resolve_output_key(&output),
            Some(KeySource::InternalKey(fixture.internal_key))
        );

        let other = fixture.psbt.inputs[0].tap_internal_key.unwrap();
        output.tap_key_origins.insert(
            other,
            (vec![], (bitcoin::bip32::Fingerprint::from([0u8; 4]), bitcoin::bip32::DerivationPath::master())),
        );
        assert_eq!(resolve_output_key(&output), Some(KeySource::TapDerivation(other)));
    }
}
