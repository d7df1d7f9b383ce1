//! paycore
//!
//! Taproot signing and preview for single-input PSBTs, and a uniform
//! Lightning payment interface over Core Lightning (Commando) and Nostr
//! Wallet Connect.

pub mod btc;
pub mod commando;
pub mod config;
pub mod connector;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod nwc;

pub use btc::{preview, Preview, SigningEngine, TransactionProposal};
pub use config::{ConnectorConfig, SignerConfig};
pub use connector::{Capability, Connector};
pub use crypto::{KeyPair, KeyProvider, SeedKeyProvider};
pub use error::{ConfigError, ConnectorError, KeyError, SigningError, TransportError};
