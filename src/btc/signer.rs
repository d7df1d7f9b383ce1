//! Taproot Signing Engine
//!
//! Signs a single-input key-path proposal from a freshly derived key:
//!
//! 1. Reject unsupported input counts, a missing committed value or a
//!    non-Taproot sighash type before the key provider is called
//! 2. Derive the key pair at the network's signing path
//! 3. Check the input's spending key against the derived key
//! 4. Tweak per BIP-341 and sign the key-spend sighash (BIP-340)
//! 5. Finalize the input, extract and serialize the transaction
//!
//! The derived key pair lives only for the duration of [`SigningEngine::sign`].

use super::derivation::{derive_signing_key, Address};
use super::proposal::{resolve_input_key, TransactionProposal};
use super::schnorr::sign_bip340;
use super::tweak::tweak_key_pair;
use crate::crypto::keys::KeyProvider;
use crate::error::SigningError;
use bitcoin::hashes::Hash;
use bitcoin::psbt::Input;
use bitcoin::secp256k1::schnorr;
use bitcoin::sighash::{Prevouts, SighashCache, TapSighashType};
use bitcoin::{taproot, Network, Witness};
use std::collections::BTreeMap;

const INPUT_INDEX: usize = 0;

pub struct SigningEngine<P> {
    provider: P,
    network: Network,
}

impl<P: KeyProvider> SigningEngine<P> {
    pub fn new(provider: P, network: Network) -> Self {
        Self { provider, network }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Derive the signing address, recomputed on every call
    pub fn derive_address(&self) -> Result<Address, SigningError> {
        let (_key, address) = derive_signing_key(&self.provider, self.network)?;
        Ok(address)
    }

    /// Sign a hex-encoded PSBT
    pub fn sign_hex(&self, psbt_hex: &str) -> Result<String, SigningError> {
        let proposal = TransactionProposal::from_hex(psbt_hex)?;
        self.sign(&proposal)
    }

    /// Sign and finalize a proposal, returning the transaction as hex
    pub fn sign(&self, proposal: &TransactionProposal) -> Result<String, SigningError> {
        proposal.ensure_single_input()?;
        let sighash_type = sighash_type(&proposal.psbt().inputs[INPUT_INDEX])?;
        let prevouts = [proposal.committed_output(INPUT_INDEX)?.clone()];

        let (key, address) = derive_signing_key(&self.provider, self.network)?;
        tracing::debug!(address = %address.encoded, "derived signing key");

        let mut psbt = proposal.psbt().clone();
        let input = &psbt.inputs[INPUT_INDEX];

        let derived = key.x_only();
        if let Some(source) = resolve_input_key(input) {
            let expected = source.key().serialize();
            if expected != derived {
                return Err(SigningError::KeyMismatch {
                    input: INPUT_INDEX,
                    expected: hex::encode(expected),
                    derived: hex::encode(derived),
                });
            }
        }

        let merkle_root = input.tap_merkle_root.map(|root| root.to_byte_array());
        let tweaked = tweak_key_pair(&key, merkle_root.as_ref())?;
        drop(key);

        let sighash = SighashCache::new(&psbt.unsigned_tx)
            .taproot_key_spend_signature_hash(INPUT_INDEX, &Prevouts::All(&prevouts), sighash_type)
            .map_err(|e| signature_error(e.to_string()))?;

        let signature = sign_bip340(&tweaked.secret, &sighash.to_byte_array())
            .map_err(|reason| signature_error(reason.to_string()))?;
        let signature = schnorr::Signature::from_slice(&signature)
            .map_err(|e| signature_error(e.to_string()))?;

        finalize_key_spend(
            &mut psbt.inputs[INPUT_INDEX],
            taproot::Signature {
                signature,
                sighash_type,
            },
        );

        let tx = psbt.extract_tx_unchecked_fee_rate();
        tracing::info!(txid = %tx.compute_txid(), "signed transaction");
        Ok(bitcoin::consensus::encode::serialize_hex(&tx))
    }
}

fn sighash_type(input: &Input) -> Result<TapSighashType, SigningError> {
    match input.sighash_type {
        None => Ok(TapSighashType::Default),
        Some(ty) => ty
            .taproot_hash_ty()
            .map_err(|e| SigningError::InvalidProposal(format!("input {}: {}", INPUT_INDEX, e))),
    }
}

fn signature_error(reason: String) -> SigningError {
    SigningError::Signature {
        input: INPUT_INDEX,
        reason,
    }
}

/// Set the final witness and clear the partial-signing fields (BIP-174)
fn finalize_key_spend(input: &mut Input, signature: taproot::Signature) {
    input.final_script_witness = Some(Witness::p2tr_key_spend(&signature));

    input.partial_sigs = BTreeMap::new();
    input.sighash_type = None;
    input.redeem_script = None;
    input.witness_script = None;
    input.bip32_derivation = BTreeMap::new();
    input.tap_key_sig = None;
    input.tap_script_sigs = BTreeMap::new();
    input.tap_scripts = BTreeMap::new();
    input.tap_key_origins = BTreeMap::new();
    input.tap_internal_key = None;
    input.tap_merkle_root = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btc::derivation::committed_taproot_address;
    use crate::btc::preview::preview;
    use crate::btc::testing::{single_input_psbt, test_provider};
    use crate::crypto::keys::{KeyPair, SeedKeyProvider};
    use crate::error::KeyError;
    use bitcoin::bip32::DerivationPath;
    use bitcoin::key::XOnlyPublicKey;
    use bitcoin::psbt::PsbtSighashType;
    use bitcoin::secp256k1::{Message, Secp256k1};
    use bitcoin::taproot::TapNodeHash;
    use bitcoin::Transaction;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingProvider {
        inner: SeedKeyProvider,
        calls: AtomicUsize,
    }

    impl KeyProvider for CountingProvider {
        fn derive_key(&self, path: &DerivationPath) -> Result<KeyPair, KeyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.derive_key(path)
        }
    }

    fn counting_engine(network: Network) -> (SigningEngine<Arc<CountingProvider>>, Arc<CountingProvider>) {
        let provider = Arc::new(CountingProvider {
            inner: test_provider(),
            calls: AtomicUsize::new(0),
        });
        (SigningEngine::new(provider.clone(), network), provider)
    }

    fn decode_tx(tx_hex: &str) -> Transaction {
        bitcoin::consensus::deserialize(&hex::decode(tx_hex).unwrap()).unwrap()
    }

    fn verify_key_spend(signed_hex: &str, prevout: &bitcoin::TxOut) {
        let tx = decode_tx(signed_hex);
        let witness = &tx.input[0].witness;
        assert_eq!(witness.len(), 1);
        let sig_bytes = witness.nth(0).unwrap();
        assert_eq!(sig_bytes.len(), 64, "SIGHASH_DEFAULT omits the type byte");

        let sighash = SighashCache::new(&tx)
            .taproot_key_spend_signature_hash(
                0,
                &Prevouts::All(&[prevout.clone()]),
                TapSighashType::Default,
            )
            .unwrap();

        // Output key is the witness program of the P2TR prevout
        let output_key = XOnlyPublicKey::from_slice(&prevout.script_pubkey.as_bytes()[2..]).unwrap();
        let secp = Secp256k1::verification_only();
        secp.verify_schnorr(
            &schnorr::Signature::from_slice(sig_bytes).unwrap(),
            &Message::from_digest(sighash.to_byte_array()),
            &output_key,
        )
        .unwrap();
    }

    #[test]
    fn test_sign_single_input() {
        let fixture = single_input_psbt(Network::Regtest, 50_000, 49_000);
        let engine = SigningEngine::new(test_provider(), Network::Regtest);

        let signed = engine.sign(&fixture.proposal()).unwrap();

        let tx = decode_tx(&signed);
        assert_eq!(tx.input.len(), 1);
        assert_eq!(tx.output.len(), 1);
        assert_eq!(tx.output[0].value.to_sat(), 49_000);
        verify_key_spend(&signed, &fixture.psbt.inputs[0].witness_utxo.clone().unwrap());
    }

    #[test]
    fn test_sign_hex_roundtrip() {
        let fixture = single_input_psbt(Network::Bitcoin, 50_000, 49_000);
        let engine = SigningEngine::new(test_provider(), Network::Bitcoin);

        let psbt_hex = hex::encode(fixture.psbt.serialize());
        let from_hex = engine.sign_hex(&psbt_hex).unwrap();
        let direct = engine.sign(&fixture.proposal()).unwrap();
        assert_eq!(from_hex, direct);
    }

    #[test]
    fn test_input_count_checked_before_derivation() {
        let (engine, provider) = counting_engine(Network::Regtest);

        let mut zero = single_input_psbt(Network::Regtest, 50_000, 49_000);
        zero.psbt.unsigned_tx.input.clear();
        zero.psbt.inputs.clear();
        assert!(matches!(
            engine.sign(&zero.proposal()),
            Err(SigningError::UnsupportedInputCount(0))
        ));

        let mut two = single_input_psbt(Network::Regtest, 50_000, 49_000);
        let extra_in = two.psbt.unsigned_tx.input[0].clone();
        two.psbt.unsigned_tx.input.push(extra_in);
        let extra_psbt_in = two.psbt.inputs[0].clone();
        two.psbt.inputs.push(extra_psbt_in);
        assert!(matches!(
            engine.sign(&two.proposal()),
            Err(SigningError::UnsupportedInputCount(2))
        ));

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_structural_errors_raised_before_derivation() {
        let (engine, provider) = counting_engine(Network::Regtest);

        let mut no_value = single_input_psbt(Network::Regtest, 50_000, 49_000);
        no_value.psbt.inputs[0].witness_utxo = None;
        assert!(matches!(
            engine.sign(&no_value.proposal()),
            Err(SigningError::MissingCommittedValue { input: 0 })
        ));

        let mut bad_sighash = single_input_psbt(Network::Regtest, 50_000, 49_000);
        bad_sighash.psbt.inputs[0].sighash_type = Some(PsbtSighashType::from_u32(0xff));
        assert!(matches!(
            engine.sign(&bad_sighash.proposal()),
            Err(SigningError::InvalidProposal(_))
        ));

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_preview_address_matches_derived_address() {
        for network in [Network::Bitcoin, Network::Testnet, Network::Signet, Network::Regtest] {
            let fixture = single_input_psbt(network, 50_000, 49_000);
            let engine = SigningEngine::new(test_provider(), network);

            let preview = preview(&fixture.proposal(), network).unwrap();
            let address = engine.derive_address().unwrap();
            assert_eq!(preview.inputs[0].address.to_string(), address.encoded);
        }
    }

    #[test]
    fn test_derive_address_bip86_vector() {
        let engine = SigningEngine::new(test_provider(), Network::Bitcoin);
        let address = engine.derive_address().unwrap();
        assert_eq!(address.derivation_path, "m/86'/0'/0'/0");
        assert_eq!(address.index, 0);
        assert_eq!(
            address.encoded,
            "bc1p5cyxnuxmeuwuvkwfem96lqzszd02n6xdcjrs20cac6yqjjwudpxqkedrcr"
        );
    }

    #[test]
    fn test_key_mismatch_rejected() {
        let mut fixture = single_input_psbt(Network::Regtest, 50_000, 49_000);
        // Claim the input belongs to a different key
        let other = XOnlyPublicKey::from_slice(
            &hex::decode("83dfe85a3151d2517290da461fe2815591ef69f2b18a2ce63f01697a8b313145").unwrap(),
        )
        .unwrap();
        fixture.psbt.inputs[0].tap_internal_key = Some(other);

        let engine = SigningEngine::new(test_provider(), Network::Regtest);
        assert!(matches!(
            engine.sign(&fixture.proposal()),
            Err(SigningError::KeyMismatch { input: 0, .. })
        ));
    }

    #[test]
    fn test_missing_committed_value() {
        let mut fixture = single_input_psbt(Network::Regtest, 50_000, 49_000);
        fixture.psbt.inputs[0].witness_utxo = None;

        let engine = SigningEngine::new(test_provider(), Network::Regtest);
        assert!(matches!(
            engine.sign(&fixture.proposal()),
            Err(SigningError::MissingCommittedValue { input: 0 })
        ));
    }

    #[test]
    fn test_partial_fields_cleared_and_nothing_mutated() {
        let fixture = single_input_psbt(Network::Regtest, 50_000, 49_000);
        let proposal = fixture.proposal();
        let engine = SigningEngine::new(test_provider(), Network::Regtest);

        engine.sign(&proposal).unwrap();
        // The caller's proposal is left unsigned
        assert!(proposal.psbt().inputs[0].final_script_witness.is_none());
        assert!(proposal.psbt().inputs[0].tap_internal_key.is_some());

        let mut input = proposal.psbt().inputs[0].clone();
        let sig = taproot::Signature {
            signature: schnorr::Signature::from_slice(&[1u8; 64]).unwrap(),
            sighash_type: TapSighashType::Default,
        };
        finalize_key_spend(&mut input, sig);
        assert!(input.final_script_witness.is_some());
        assert!(input.tap_internal_key.is_none());
        assert!(input.tap_key_origins.is_empty());
        assert!(input.partial_sigs.is_empty());
    }

    #[test]
    fn test_signing_is_deterministic() {
        let fixture = single_input_psbt(Network::Signet, 50_000, 49_000);
        let engine = SigningEngine::new(test_provider(), Network::Signet);
        assert_eq!(
            engine.sign(&fixture.proposal()).unwrap(),
            engine.sign(&fixture.proposal()).unwrap()
        );
    }

    #[test]
    fn test_preview_and_signature_follow_script_tree_root() {
        let mut fixture = single_input_psbt(Network::Regtest, 50_000, 49_000);
        let root = TapNodeHash::from_byte_array([9u8; 32]);
        let spent = committed_taproot_address(fixture.internal_key, Some(root), Network::Regtest);
        fixture.psbt.inputs[0].tap_merkle_root = Some(root);
        let mut prevout = fixture.psbt.inputs[0].witness_utxo.clone().unwrap();
        prevout.script_pubkey = spent.script_pubkey();
        fixture.psbt.inputs[0].witness_utxo = Some(prevout.clone());

        let shown = preview(&fixture.proposal(), Network::Regtest).unwrap();
        assert_eq!(shown.inputs[0].address.to_string(), spent.to_string());

        let engine = SigningEngine::new(test_provider(), Network::Regtest);
        let signed = engine.sign(&fixture.proposal()).unwrap();
        verify_key_spend(&signed, &prevout);
    }
}
