//! Payment Connectors
//!
//! One capability contract over interchangeable Lightning backends:
//!
//! - **Commando**: Core Lightning over a BOLT 8 session, authorized by a rune
//! - **NWC**: Nostr Wallet Connect (NIP-47) over a relay
//!
//! [`Connector`] is a closed sum type with explicit dispatch. Callers check
//! [`Connector::supports`] before invoking an operation, or receive
//! [`ConnectorError::NotImplemented`].
//!
//! Transport lifetime is bracketed by [`Connector::init`] and
//! [`Connector::unload`]; dropping a connector also tears the transport down.

pub mod amount;
pub mod invoice;
pub mod types;

pub use types::*;

use crate::commando::CommandoConnector;
use crate::config::ConnectorConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::nwc::NwcConnector;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operations of the connector contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    GetInfo,
    GetBalance,
    GetInvoices,
    GetTransactions,
    MakeInvoice,
    SendPayment,
    Keysend,
    CheckPayment,
    SignMessage,
    ConnectPeer,
}

impl Capability {
    pub const ALL: [Capability; 10] = [
        Capability::GetInfo,
        Capability::GetBalance,
        Capability::GetInvoices,
        Capability::GetTransactions,
        Capability::MakeInvoice,
        Capability::SendPayment,
        Capability::Keysend,
        Capability::CheckPayment,
        Capability::SignMessage,
        Capability::ConnectPeer,
    ];

    /// Operation name used in errors and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::GetInfo => "get_info",
            Capability::GetBalance => "get_balance",
            Capability::GetInvoices => "get_invoices",
            Capability::GetTransactions => "get_transactions",
            Capability::MakeInvoice => "make_invoice",
            Capability::SendPayment => "send_payment",
            Capability::Keysend => "keysend",
            Capability::CheckPayment => "check_payment",
            Capability::SignMessage => "sign_message",
            Capability::ConnectPeer => "connect_peer",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured payment backend
pub enum Connector {
    Commando(CommandoConnector),
    Nwc(NwcConnector),
}

impl Connector {
    /// Build a connector from configuration; no network activity until `init`
    pub fn from_config(config: &ConnectorConfig) -> ConnectorResult<Self> {
        match config {
            ConnectorConfig::Commando(cfg) => Ok(Connector::Commando(CommandoConnector::from_config(cfg)?)),
            ConnectorConfig::Nwc(cfg) => Ok(Connector::Nwc(NwcConnector::from_config(cfg)?)),
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Connector::Commando(_) => CommandoConnector::BACKEND,
            Connector::Nwc(_) => NwcConnector::BACKEND,
        }
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Connector::Commando(c) => c.capabilities(),
            Connector::Nwc(c) => c.capabilities(),
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    fn require(&self, capability: Capability) -> ConnectorResult<()> {
        if self.supports(capability) {
            Ok(())
        } else {
            Err(ConnectorError::NotImplemented {
                backend: self.backend(),
                operation: capability.as_str(),
            })
        }
    }

    pub async fn init(&self) -> ConnectorResult<()> {
        match self {
            Connector::Commando(c) => c.init().await,
            Connector::Nwc(c) => c.init().await,
        }
    }

    pub async fn unload(&self) -> ConnectorResult<()> {
        match self {
            Connector::Commando(c) => c.unload().await,
            Connector::Nwc(c) => c.unload().await,
        }
    }

    pub async fn get_info(&self) -> ConnectorResult<GetInfoResponse> {
        self.require(Capability::GetInfo)?;
        match self {
            Connector::Commando(c) => c.get_info().await,
            Connector::Nwc(c) => c.get_info().await,
        }
    }

    pub async fn get_balance(&self) -> ConnectorResult<GetBalanceResponse> {
        self.require(Capability::GetBalance)?;
        match self {
            Connector::Commando(c) => c.get_balance().await,
            Connector::Nwc(c) => c.get_balance().await,
        }
    }

    pub async fn get_invoices(&self) -> ConnectorResult<GetTransactionsResponse> {
        self.require(Capability::GetInvoices)?;
        match self {
            Connector::Commando(c) => c.get_invoices().await,
            Connector::Nwc(c) => c.get_invoices().await,
        }
    }

    pub async fn get_transactions(&self) -> ConnectorResult<GetTransactionsResponse> {
        self.require(Capability::GetTransactions)?;
        match self {
            Connector::Commando(c) => c.get_transactions().await,
            Connector::Nwc(c) => c.get_transactions().await,
        }
    }

    pub async fn make_invoice(&self, args: MakeInvoiceArgs) -> ConnectorResult<MakeInvoiceResponse> {
        self.require(Capability::MakeInvoice)?;
        match self {
            Connector::Commando(c) => c.make_invoice(args).await,
            Connector::Nwc(c) => c.make_invoice(args).await,
        }
    }

    pub async fn send_payment(&self, args: SendPaymentArgs) -> ConnectorResult<SendPaymentResponse> {
        self.require(Capability::SendPayment)?;
        match self {
            Connector::Commando(c) => c.send_payment(args).await,
            Connector::Nwc(c) => c.send_payment(args).await,
        }
    }

    pub async fn keysend(&self, args: KeysendArgs) -> ConnectorResult<SendPaymentResponse> {
        self.require(Capability::Keysend)?;
        match self {
            Connector::Commando(c) => c.keysend(args).await,
            Connector::Nwc(c) => c.keysend(args).await,
        }
    }

    /// Never fails on a lookup error; reports `paid: false` instead
    pub async fn check_payment(&self, args: CheckPaymentArgs) -> ConnectorResult<CheckPaymentResponse> {
        self.require(Capability::CheckPayment)?;
        match self {
            Connector::Commando(c) => c.check_payment(args).await,
            Connector::Nwc(c) => c.check_payment(args).await,
        }
    }

    pub async fn sign_message(&self, args: SignMessageArgs) -> ConnectorResult<SignMessageResponse> {
        self.require(Capability::SignMessage)?;
        match self {
            Connector::Commando(c) => c.sign_message(args).await,
            Connector::Nwc(c) => c.sign_message(args).await,
        }
    }

    pub async fn connect_peer(&self, args: ConnectPeerArgs) -> ConnectorResult<ConnectPeerResponse> {
        self.require(Capability::ConnectPeer)?;
        match self {
            Connector::Commando(c) => c.connect_peer(args).await,
            Connector::Nwc(c) => c.connect_peer(args).await,
        }
    }
}

impl From<CommandoConnector> for Connector {
    fn from(connector: CommandoConnector) -> Self {
        Connector::Commando(connector)
    }
}

impl From<NwcConnector> for Connector {
    fn from(connector: NwcConnector) -> Self {
        Connector::Nwc(connector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_names_are_unique() {
        let mut names: Vec<_> = Capability::ALL.iter().map(|c| c.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Capability::ALL.len());
        assert_eq!(
            serde_json::to_value(Capability::ConnectPeer).unwrap(),
            serde_json::json!("connect_peer")
        );
    }
}
