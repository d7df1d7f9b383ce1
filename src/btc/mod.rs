//! Bitcoin Taproot Signing
//!
//! - **derivation**: BIP-86 signing path and P2TR addresses per network
//! - **proposal**: PSBT proposal parsing and key resolution
//! - **preview**: what a proposal spends and where it sends
//! - **tweak**: BIP-341 key tweak
//! - **schnorr**: BIP-340 signatures
//! - **signer**: derive, tweak, sign, finalize

pub mod derivation;
pub mod preview;
pub mod proposal;
pub mod schnorr;
pub mod signer;
pub mod tweak;

#[cfg(test)]
pub(crate) mod testing;

pub use derivation::{account_path, committed_taproot_address, signing_path, taproot_address, Address};
pub use preview::{preview, Preview, PreviewAddress, PreviewInput, PreviewOutput};
pub use proposal::{TransactionProposal, SUPPORTED_INPUT_COUNT};
pub use signer::SigningEngine;
