//! PSBT fixtures shared by the preview and signer tests

use super::derivation::{account_path, signing_path, taproot_address};
use super::proposal::TransactionProposal;
use crate::crypto::keys::{parse_path, KeyProvider, SeedKeyProvider};
use bitcoin::absolute::LockTime;
use bitcoin::bip32::DerivationPath;
use bitcoin::key::XOnlyPublicKey;
use bitcoin::psbt::Psbt;
use bitcoin::transaction::Version;
use bitcoin::{Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};

pub const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

pub fn test_provider() -> SeedKeyProvider {
    SeedKeyProvider::from_mnemonic(TEST_MNEMONIC, None).unwrap()
}

pub fn unknown_script() -> ScriptBuf {
    // OP_RETURN carries no address
    ScriptBuf::from_hex("6a0401020304").unwrap()
}

pub struct PsbtFixture {
    pub psbt: Psbt,
    pub internal_key: XOnlyPublicKey,
    pub previous_tx: Transaction,
}

impl PsbtFixture {
    pub fn proposal(&self) -> TransactionProposal {
        TransactionProposal::from_psbt(self.psbt.clone())
    }
}

fn x_only_at(provider: &SeedKeyProvider, path: &DerivationPath) -> XOnlyPublicKey {
    let key = provider.derive_key(path).unwrap();
    XOnlyPublicKey::from_slice(&key.x_only()).unwrap()
}

/// One P2TR input owned by the signing key, one output to index 1
pub fn single_input_psbt(network: Network, input_sats: u64, output_sats: u64) -> PsbtFixture {
    let provider = test_provider();
    let internal_key = x_only_at(&provider, &signing_path(network).unwrap());
    let destination_path = parse_path(&format!("{}/1", account_path(network))).unwrap();
    let destination = x_only_at(&provider, &destination_path);

    let previous_tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(input_sats),
            script_pubkey: taproot_address(internal_key, network).script_pubkey(),
        }],
    };

    let unsigned_tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint {
                txid: previous_tx.compute_txid(),
                vout: 0,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(output_sats),
            script_pubkey: taproot_address(destination, network).script_pubkey(),
        }],
    };

    let mut psbt = Psbt::from_unsigned_tx(unsigned_tx).unwrap();
    psbt.inputs[0].witness_utxo = Some(previous_tx.output[0].clone());
    psbt.inputs[0].tap_internal_key = Some(internal_key);

    PsbtFixture {
        psbt,
        internal_key,
        previous_tx,
    }
}
