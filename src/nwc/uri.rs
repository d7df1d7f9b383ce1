//! Nostr Wallet Connect URI
//!
//! `nostr+walletconnect://<wallet pubkey>?relay=<url>&secret=<hex>[&lud16=<address>]`

use crate::error::ConfigError;
use url::Url;

pub const NWC_SCHEME: &str = "nostr+walletconnect";

#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionUri {
    /// Wallet service public key (x-only hex)
    pub wallet_pubkey: String,
    /// Relay URLs, in the order given
    pub relays: Vec<String>,
    /// Client secret key (hex)
    pub secret: String,
    pub lud16: Option<String>,
}

impl std::fmt::Debug for ConnectionUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionUri")
            .field("wallet_pubkey", &self.wallet_pubkey)
            .field("relays", &self.relays)
            .field("lud16", &self.lud16)
            .finish_non_exhaustive()
    }
}

fn is_hex_key(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

impl ConnectionUri {
    pub fn parse(uri: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(uri.trim()).map_err(|e| ConfigError::InvalidUri(e.to_string()))?;
        if url.scheme() != NWC_SCHEME {
            return Err(ConfigError::InvalidUri(format!(
                "expected {}:// scheme, got {}",
                NWC_SCHEME,
                url.scheme()
            )));
        }

        // `scheme://pubkey` puts the key in the host, `scheme:pubkey` in the path
        let wallet_pubkey = match url.host_str() {
            Some(host) => host.to_string(),
            None => url.path().trim_start_matches('/').to_string(),
        }
        .to_lowercase();
        if !is_hex_key(&wallet_pubkey) {
            return Err(ConfigError::InvalidPubkey(wallet_pubkey));
        }

        let mut relays = Vec::new();
        let mut secret = None;
        let mut lud16 = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "relay" => relays.push(value.into_owned()),
                "secret" => secret = Some(value.into_owned()),
                "lud16" => lud16 = Some(value.into_owned()),
                _ => {}
            }
        }

        if relays.is_empty() {
            return Err(ConfigError::InvalidUri("missing relay".into()));
        }
        let secret = secret.ok_or_else(|| ConfigError::InvalidUri("missing secret".into()))?;
        if !is_hex_key(&secret) {
            return Err(ConfigError::InvalidUri("secret must be 32 bytes of hex".into()));
        }

        Ok(Self {
            wallet_pubkey,
            relays,
            secret,
            lud16,
        })
    }
}
