//! Connector and signer configuration
//!
//! Connector configuration is JSON, tagged by `kind`:
//!
//! ```json
//! { "kind": "commando", "host": "127.0.0.1", "port": 9735,
//!   "pubkey": "02…", "rune": "…" }
//! { "kind": "nwc", "uri": "nostr+walletconnect://…", "timeout_secs": 30 }
//! ```
//!
//! A connector reads its configuration once at construction.

use crate::error::ConfigError;
use bitcoin::Network;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_COMMANDO_PORT: u16 = 9735;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ConnectorConfig {
    Commando(CommandoConfig),
    Nwc(NwcConfig),
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandoConfig {
    pub host: String,
    #[serde(default = "default_commando_port")]
    pub port: u16,
    /// Node static public key (33-byte compressed, hex)
    pub pubkey: String,
    pub rune: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NwcConfig {
    /// `nostr+walletconnect://…` connection URI
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

// Runes and NWC secrets stay out of logs
impl std::fmt::Debug for CommandoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandoConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("pubkey", &self.pubkey)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for NwcConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NwcConfig")
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

fn default_commando_port() -> u16 {
    DEFAULT_COMMANDO_PORT
}

impl CommandoConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl NwcConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl ConnectorConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}

/// Signing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignerConfig {
    pub network: Network,
}

impl SignerConfig {
    pub fn new(network: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            network: parse_network(network)?,
        })
    }
}

/// Parse a network name
pub fn parse_network(name: &str) -> Result<Network, ConfigError> {
    match name.to_lowercase().as_str() {
        "mainnet" | "bitcoin" | "main" => Ok(Network::Bitcoin),
        "testnet" | "test" | "testnet3" => Ok(Network::Testnet),
        "signet" => Ok(Network::Signet),
        "regtest" => Ok(Network::Regtest),
        _ => Err(ConfigError::UnknownNetwork(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commando_config() {
        let config = ConnectorConfig::from_json(
            r#"{"kind":"commando","host":"127.0.0.1","pubkey":"02aa","rune":"abc"}"#,
        )
        .unwrap();
        match config {
            ConnectorConfig::Commando(cfg) => {
                assert_eq!(cfg.port, DEFAULT_COMMANDO_PORT);
                assert_eq!(cfg.rune, "abc");
                assert_eq!(cfg.timeout(), None);
            }
            other => panic!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn test_parse_nwc_config() {
        let config = ConnectorConfig::from_json(
            r#"{"kind":"nwc","uri":"nostr+walletconnect://abc?relay=wss://r&secret=00","timeout_secs":5}"#,
        )
        .unwrap();
        match config {
            ConnectorConfig::Nwc(cfg) => assert_eq!(cfg.timeout(), Some(Duration::from_secs(5))),
            other => panic!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(matches!(
            ConnectorConfig::from_json(r#"{"kind":"lnd"}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_debug_hides_credentials() {
        let cfg = CommandoConfig {
            host: "h".into(),
            port: 1,
            pubkey: "02".into(),
            rune: "secret-rune".into(),
            timeout_secs: None,
        };
        assert!(!format!("{:?}", cfg).contains("secret-rune"));
    }

    #[test]
    fn test_parse_network() {
        assert_eq!(parse_network("mainnet").unwrap(), Network::Bitcoin);
        assert_eq!(parse_network("Signet").unwrap(), Network::Signet);
        assert_eq!(parse_network("regtest").unwrap(), Network::Regtest);
        assert_eq!(SignerConfig::new("testnet").unwrap().network, Network::Testnet);
        assert!(matches!(parse_network("liquid"), Err(ConfigError::UnknownNetwork(_))));
    }
}
