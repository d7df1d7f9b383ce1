//! Transaction Preview
//!
//! Shows what a proposal spends and where the value goes before anything is
//! signed. Preview never touches key material.

use super::derivation::{committed_taproot_address, taproot_address};
use super::proposal::{resolve_input_key, resolve_output_key, TransactionProposal};
use crate::error::SigningError;
use bitcoin::Network;
use serde::{Serialize, Serializer};
use std::fmt;

/// Destination shown for an input or output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewAddress {
    Resolved(String),
    /// Neither derivation metadata nor a standard script
    Unknown,
}

impl fmt::Display for PreviewAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreviewAddress::Resolved(address) => f.write_str(address),
            PreviewAddress::Unknown => f.write_str("unknown"),
        }
    }
}

impl Serialize for PreviewAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewInput {
    /// Satoshis
    pub amount: u64,
    pub address: PreviewAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewOutput {
    /// Satoshis
    pub amount: u64,
    pub address: PreviewAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preview {
    pub inputs: Vec<PreviewInput>,
    pub outputs: Vec<PreviewOutput>,
}

impl Preview {
    /// Total committed input value minus total output value
    pub fn fee(&self) -> Option<u64> {
        let spent: u64 = self.inputs.iter().map(|i| i.amount).sum();
        let sent: u64 = self.outputs.iter().map(|o| o.amount).sum();
        spent.checked_sub(sent)
    }
}

/// Build a preview of a proposal
///
/// Fails only on the input: unsupported input count, no resolvable spending
/// key, or no committed value. Outputs that cannot be resolved are shown as
/// [`PreviewAddress::Unknown`].
pub fn preview(proposal: &TransactionProposal, network: Network) -> Result<Preview, SigningError> {
    proposal.ensure_single_input()?;
    let psbt = proposal.psbt();

    let mut inputs = Vec::with_capacity(psbt.inputs.len());
    for (index, input) in psbt.inputs.iter().enumerate() {
        let key = resolve_input_key(input).ok_or(SigningError::MissingSpendingKey { input: index })?;
        let amount = proposal.committed_value(index)?;
        inputs.push(PreviewInput {
            amount: amount.to_sat(),
            address: PreviewAddress::Resolved(
                committed_taproot_address(key.key(), input.tap_merkle_root, network).to_string(),
            ),
        });
    }

    let outputs = psbt
        .unsigned_tx
        .output
        .iter()
        .enumerate()
        .map(|(index, txout)| {
            let from_metadata = psbt.outputs.get(index).and_then(resolve_output_key);
            let address = match from_metadata {
                Some(key) => PreviewAddress::Resolved(taproot_address(key.key(), network).to_string()),
                None => match bitcoin::Address::from_script(&txout.script_pubkey, network) {
                    Ok(address) => PreviewAddress::Resolved(address.to_string()),
                    Err(_) => PreviewAddress::Unknown,
                },
            };
            PreviewOutput {
                amount: txout.value.to_sat(),
                address,
            }
        })
        .collect();

    tracing::debug!(
        inputs = inputs.len(),
        outputs = psbt.unsigned_tx.output.len(),
        "built transaction preview"
    );

    Ok(Preview { inputs, outputs })
}
