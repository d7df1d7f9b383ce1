//! Error types
//!
//! One enum per concern. Every variant names the operation, input or field
//! it failed on so callers can surface it without extra context.

use thiserror::Error;

/// Failures from the key provider.
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid derivation path '{0}'")]
    InvalidPath(String),

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Key derivation failed at {path}: {reason}")]
    Derivation { path: String, reason: String },
}

/// Failures from preview and signing of a transaction proposal.
#[derive(Error, Debug)]
pub enum SigningError {
    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    #[error("Unsupported input count: expected exactly 1 input, got {0}")]
    UnsupportedInputCount(usize),

    #[error("Input {input}: missing committed value (witness_utxo)")]
    MissingCommittedValue { input: usize },

    #[error("Input {input}: missing spending key (tap_internal_key or derivation record)")]
    MissingSpendingKey { input: usize },

    #[error("Input {input}: spending key {expected} does not match derived key {derived}")]
    KeyMismatch {
        input: usize,
        expected: String,
        derived: String,
    },

    #[error("Invalid tweak: {0}")]
    InvalidTweak(&'static str),

    #[error("Signing input {input} failed: {reason}")]
    Signature { input: usize, reason: String },

    #[error("Key provider: {0}")]
    KeyProvider(#[from] KeyError),
}

/// Failures of the underlying Commando or relay transport.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Decryption failed: {0}")]
    Decrypt(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Relay error: {0}")]
    Relay(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Connection closed")]
    Closed,

    #[error("Timed out waiting for reply")]
    Timeout,

    #[error("Remote error {code}: {message}")]
    Remote { code: String, message: String },
}

/// Failures surfaced by every connector operation.
#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("{operation}: not implemented by the {backend} connector")]
    NotImplemented {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("{operation}: transport failure: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("{operation}: missing payment hash")]
    MissingPaymentHash { operation: &'static str },

    #[error("{field}: invalid amount format {value:?}")]
    InvalidAmountFormat { field: String, value: String },

    #[error("{operation}: invalid payment request: {reason}")]
    InvalidPaymentRequest {
        operation: &'static str,
        reason: String,
    },

    #[error("{operation}: invalid argument: {reason}")]
    InvalidArgument {
        operation: &'static str,
        reason: String,
    },

    #[error("{operation}: malformed response: {reason}")]
    InvalidResponse {
        operation: &'static str,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ConnectorError {
    pub fn transport(operation: &'static str, source: TransportError) -> Self {
        Self::Transport { operation, source }
    }

    pub fn invalid_response(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            operation,
            reason: reason.into(),
        }
    }
}

/// Failures while reading connector or signer configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown network '{0}'. Use: mainnet, testnet, signet, or regtest")]
    UnknownNetwork(String),

    #[error("Invalid connection URI: {0}")]
    InvalidUri(String),

    #[error("Invalid node public key: {0}")]
    InvalidPubkey(String),

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;
