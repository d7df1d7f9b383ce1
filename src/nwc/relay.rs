//! Relay transport for NIP-47
//!
//! Requests are kind 23194 events addressed to the wallet with a `p` tag and
//! NIP-04 encrypted content. The wallet answers with a kind 23195 event whose
//! `e` tag names the request.

use super::uri::ConnectionUri;
use super::wire::{NwcRequest, NwcResponse};
use super::NwcTransport;
use crate::error::{ConfigError, TransportError};
use async_trait::async_trait;
use nostr_sdk::nostr::nips::nip04;
use nostr_sdk::prelude::*;
use std::time::Duration;
use tokio::sync::broadcast;

/// Nostr relay client bound to one wallet service
pub struct RelayTransport {
    client: Client,
    keys: Keys,
    wallet: PublicKey,
    relays: Vec<String>,
    timeout: Option<Duration>,
}

fn relay_error(e: impl std::fmt::Display) -> TransportError {
    TransportError::Relay(e.to_string())
}

impl RelayTransport {
    pub fn new(uri: &ConnectionUri, timeout: Option<Duration>) -> Result<Self, ConfigError> {
        let secret = SecretKey::from_hex(&uri.secret).map_err(|e| ConfigError::InvalidUri(e.to_string()))?;
        let wallet = PublicKey::from_hex(&uri.wallet_pubkey)
            .map_err(|e| ConfigError::InvalidPubkey(e.to_string()))?;
        let keys = Keys::new(secret);

        Ok(Self {
            client: Client::new(keys.clone()),
            keys,
            wallet,
            relays: uri.relays.clone(),
            timeout,
        })
    }

    /// Client public key the wallet sees requests from
    pub fn client_pubkey(&self) -> String {
        self.keys.public_key().to_string()
    }

    async fn await_response(
        &self,
        notifications: &mut broadcast::Receiver<RelayPoolNotification>,
        request_id: EventId,
    ) -> Result<String, TransportError> {
        let request_hex = request_id.to_hex();
        loop {
            match notifications.recv().await {
                Ok(RelayPoolNotification::Event { event, .. }) => {
                    if event.kind == Kind::WalletConnectResponse
                        && event.pubkey == self.wallet
                        && references(&event, &request_hex)
                    {
                        return Ok(event.content.clone());
                    }
                }
                Ok(RelayPoolNotification::Shutdown) => return Err(TransportError::Closed),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "relay notifications lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(TransportError::Closed),
            }
        }
    }
}

/// True if the event carries an `e` tag naming `event_hex`
fn references(event: &Event, event_hex: &str) -> bool {
    event.tags.iter().any(|tag| {
        let fields = tag.as_slice();
        fields.len() >= 2 && fields[0] == "e" && fields[1] == event_hex
    })
}

#[async_trait]
impl NwcTransport for RelayTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        for relay in &self.relays {
            self.client.add_relay(relay.as_str()).await.map_err(relay_error)?;
        }
        self.client.connect().await;

        let filter = Filter::new()
            .kind(Kind::WalletConnectResponse)
            .author(self.wallet)
            .pubkey(self.keys.public_key())
            .since(Timestamp::now());
        self.client
            .subscribe(vec![filter], None)
            .await
            .map_err(relay_error)?;

        tracing::info!(relays = self.relays.len(), wallet = %self.wallet, "nwc relay session established");
        Ok(())
    }

    async fn request(&self, request: &NwcRequest) -> Result<NwcResponse, TransportError> {
        let content = serde_json::to_string(request)
            .map_err(|e| TransportError::Protocol(format!("request encoding: {}", e)))?;
        let encrypted = nip04::encrypt(self.keys.secret_key(), &self.wallet, content)
            .map_err(|e| TransportError::Protocol(format!("nip04 encrypt: {}", e)))?;

        let event = EventBuilder::new(Kind::WalletConnectRequest, encrypted)
            .tags(vec![Tag::public_key(self.wallet)])
            .sign_with_keys(&self.keys)
            .map_err(|e| TransportError::Protocol(format!("event signing: {}", e)))?;
        let event_id = event.id;

        // Subscribe to notifications before publishing so the reply can't be missed
        let mut notifications = self.client.notifications();
        self.client.send_event(event).await.map_err(relay_error)?;
        tracing::debug!(method = %request.method, id = %event_id, "nwc request published");

        let waiting = self.await_response(&mut notifications, event_id);
        let encrypted_reply = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, waiting)
                .await
                .map_err(|_| TransportError::Timeout)??,
            None => waiting.await?,
        };

        let decrypted = nip04::decrypt(self.keys.secret_key(), &self.wallet, &encrypted_reply)
            .map_err(|e| TransportError::Decrypt(e.to_string()))?;
        serde_json::from_str(&decrypted)
            .map_err(|e| TransportError::Protocol(format!("response decoding: {}", e)))
    }

    async fn disconnect(&self) {
        self.client.disconnect().await.ok();
        tracing::info!("nwc relay session closed");
    }
}

impl Drop for RelayTransport {
    fn drop(&mut self) {
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let client = self.client.clone();
            runtime.spawn(async move {
                client.disconnect().await.ok();
            });
        }
    }
}
