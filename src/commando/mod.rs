//! Commando Connector
//!
//! Core Lightning RPC over the node's Commando plugin. Each request travels
//! over a BOLT 8 session and carries the configured rune; the node decides
//! what the rune permits.
//!
//! - **noise**: BOLT 8 handshake and message encryption
//! - **wire**: BOLT 1 and Commando message codec
//! - **socket**: the multiplexed session implementing [`CommandoRpc`]

pub mod noise;
pub mod socket;
pub mod wire;

pub use socket::CommandoSession;

use crate::config::CommandoConfig;
use crate::connector::amount::{msat_to_sat, parse_msat, parse_optional_msat, sat_to_msat};
use crate::connector::types::*;
use crate::connector::Capability;
use crate::error::{ConfigError, ConnectorError, ConnectorResult, TransportError};
use async_trait::async_trait;
use rand::RngCore;
use serde_json::{json, Value};
use std::sync::Arc;

/// Request/response channel to a node's Commando plugin
#[async_trait]
pub trait CommandoRpc: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;

    /// Send one JSON-RPC call and return its `result`
    async fn call(&self, method: &str, params: Value, rune: &str) -> Result<Value, TransportError>;

    async fn disconnect(&self);
}

pub struct CommandoConnector {
    rpc: Arc<dyn CommandoRpc>,
    rune: String,
}

impl CommandoConnector {
    pub const BACKEND: &'static str = "commando";

    pub fn new(rpc: Arc<dyn CommandoRpc>, rune: impl Into<String>) -> Self {
        Self {
            rpc,
            rune: rune.into(),
        }
    }

    pub fn from_config(config: &CommandoConfig) -> ConnectorResult<Self> {
        let pubkey: [u8; 33] = hex::decode(&config.pubkey)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| ConfigError::InvalidPubkey(config.pubkey.clone()))?;
        let session = CommandoSession::new(config.host.clone(), config.port, pubkey, config.timeout());
        Ok(Self::new(Arc::new(session), config.rune.clone()))
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        &Capability::ALL
    }

    pub async fn init(&self) -> ConnectorResult<()> {
        self.rpc
            .connect()
            .await
            .map_err(|e| ConnectorError::transport("init", e))
    }

    pub async fn unload(&self) -> ConnectorResult<()> {
        self.rpc.disconnect().await;
        Ok(())
    }

    async fn call(&self, operation: &'static str, method: &str, params: Value) -> ConnectorResult<Value> {
        self.rpc
            .call(method, params, &self.rune)
            .await
            .map_err(|e| ConnectorError::transport(operation, e))
    }

    pub async fn get_info(&self) -> ConnectorResult<GetInfoResponse> {
        const OP: &str = "get_info";
        let info = self.call(OP, "getinfo", json!({})).await?;
        Ok(GetInfoResponse {
            alias: str_field(&info, "alias").unwrap_or_default(),
            pubkey: required_str(OP, &info, "id")?,
            color: str_field(&info, "color").unwrap_or_default(),
            network: str_field(&info, "network"),
            block_height: info
                .get("blockheight")
                .and_then(Value::as_u64)
                .and_then(|h| u32::try_from(h).ok()),
        })
    }

    /// Sum of our side of every channel, whatever its state
    pub async fn get_balance(&self) -> ConnectorResult<GetBalanceResponse> {
        const OP: &str = "get_balance";
        let funds = self.call(OP, "listfunds", json!({})).await?;
        let channels = array_field(OP, &funds, "channels")?;

        let mut total_msat: u64 = 0;
        for channel in channels {
            let msat = match channel.get("our_amount_msat") {
                Some(value) => parse_msat("our_amount_msat", value)?,
                None => {
                    let sat = channel
                        .get("channel_sat")
                        .and_then(Value::as_u64)
                        .ok_or_else(|| ConnectorError::invalid_response(OP, "channel without balance"))?;
                    sat_to_msat("channel_sat", sat)?
                }
            };
            total_msat = total_msat.saturating_add(msat);
        }

        Ok(GetBalanceResponse {
            balance: msat_to_sat(total_msat),
        })
    }

    async fn paid_invoices(&self, operation: &'static str) -> ConnectorResult<Vec<WalletTransaction>> {
        let listed = self.call(operation, "listinvoices", json!({})).await?;
        array_field(operation, &listed, "invoices")?
            .iter()
            .filter(|invoice| invoice.get("status").and_then(Value::as_str) == Some("paid"))
            .map(|invoice| invoice_to_transaction(operation, invoice))
            .collect()
    }

    /// Settled incoming invoices
    pub async fn get_invoices(&self) -> ConnectorResult<GetTransactionsResponse> {
        Ok(GetTransactionsResponse {
            transactions: self.paid_invoices("get_invoices").await?,
        })
    }

    /// Settled invoices and completed payments, newest first
    pub async fn get_transactions(&self) -> ConnectorResult<GetTransactionsResponse> {
        const OP: &str = "get_transactions";
        let mut transactions = self.paid_invoices(OP).await?;

        let pays = self.call(OP, "listpays", json!({})).await?;
        for pay in array_field(OP, &pays, "pays")? {
            if pay.get("status").and_then(Value::as_str) != Some("complete") {
                continue;
            }
            transactions.push(pay_to_transaction(OP, pay)?);
        }

        transactions.sort_by(|a, b| b.settled_at.cmp(&a.settled_at));
        Ok(GetTransactionsResponse { transactions })
    }

    pub async fn make_invoice(&self, args: MakeInvoiceArgs) -> ConnectorResult<MakeInvoiceResponse> {
        const OP: &str = "make_invoice";
        let params = json!({
            "amount_msat": sat_to_msat("amount", args.amount)?,
            "label": invoice_label(),
            "description": args.memo,
        });
        let invoice = self.call(OP, "invoice", params).await?;
        Ok(MakeInvoiceResponse {
            payment_request: required_str(OP, &invoice, "bolt11")?,
            payment_hash: required_str(OP, &invoice, "payment_hash")?,
        })
    }

    pub async fn send_payment(&self, args: SendPaymentArgs) -> ConnectorResult<SendPaymentResponse> {
        const OP: &str = "send_payment";
        let paid = self
            .call(OP, "pay", json!({ "bolt11": args.payment_request }))
            .await?;
        payment_result(OP, &paid)
    }

    pub async fn keysend(&self, args: KeysendArgs) -> ConnectorResult<SendPaymentResponse> {
        const OP: &str = "keysend";
        let mut params = json!({
            "destination": args.pubkey,
            "amount_msat": sat_to_msat("amount", args.amount)?,
        });
        if !args.custom_records.is_empty() {
            params["extratlvs"] = json!(hex_encode_records(&args.custom_records));
        }
        let paid = self.call(OP, "keysend", params).await?;
        payment_result(OP, &paid)
    }

    /// Paid only if exactly one invoice matches and it is `paid`
    ///
    /// A failed lookup reports `paid: false`.
    pub async fn check_payment(&self, args: CheckPaymentArgs) -> ConnectorResult<CheckPaymentResponse> {
        const OP: &str = "check_payment";
        let listed = self
            .call(OP, "listinvoices", json!({ "payment_hash": args.payment_hash }))
            .await;
        let invoices = match listed.and_then(|listed| array_field(OP, &listed, "invoices").cloned()) {
            Ok(invoices) => invoices,
            Err(e) => {
                tracing::warn!(
                    payment_hash = %args.payment_hash,
                    error = %e,
                    "invoice lookup failed, reporting unpaid"
                );
                return Ok(CheckPaymentResponse::not_paid());
            }
        };

        match invoices.as_slice() {
            [invoice] if invoice.get("status").and_then(Value::as_str) == Some("paid") => {
                Ok(CheckPaymentResponse {
                    paid: true,
                    preimage: str_field(invoice, "payment_preimage"),
                })
            }
            _ => {
                if invoices.len() > 1 {
                    tracing::warn!(
                        payment_hash = %args.payment_hash,
                        matches = invoices.len(),
                        "ambiguous invoice lookup, reporting unpaid"
                    );
                }
                Ok(CheckPaymentResponse::not_paid())
            }
        }
    }

    pub async fn sign_message(&self, args: SignMessageArgs) -> ConnectorResult<SignMessageResponse> {
        const OP: &str = "sign_message";
        let signed = self
            .call(OP, "signmessage", json!({ "message": args.message }))
            .await?;
        Ok(SignMessageResponse {
            message: args.message,
            signature: required_str(OP, &signed, "zbase")?,
        })
    }

    pub async fn connect_peer(&self, args: ConnectPeerArgs) -> ConnectorResult<ConnectPeerResponse> {
        const OP: &str = "connect_peer";
        let connected = self
            .call(OP, "connect", json!({ "id": args.pubkey, "host": args.host }))
            .await?;
        Ok(ConnectPeerResponse {
            pubkey: str_field(&connected, "id").unwrap_or(args.pubkey),
        })
    }
}

// ============================================================================
// Response Mapping
// ============================================================================

fn str_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

fn required_str(operation: &'static str, value: &Value, field: &str) -> ConnectorResult<String> {
    str_field(value, field)
        .ok_or_else(|| ConnectorError::invalid_response(operation, format!("missing {}", field)))
}

fn array_field<'a>(operation: &'static str, value: &'a Value, field: &str) -> ConnectorResult<&'a Vec<Value>> {
    value
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| ConnectorError::invalid_response(operation, format!("missing {} list", field)))
}

fn invoice_label() -> String {
    let mut nonce = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut nonce);
    format!("paycore-{}", hex::encode(nonce))
}

fn invoice_to_transaction(operation: &'static str, invoice: &Value) -> ConnectorResult<WalletTransaction> {
    let received = parse_optional_msat("amount_received_msat", invoice.get("amount_received_msat"))?;
    let requested = parse_optional_msat("amount_msat", invoice.get("amount_msat"))?;
    Ok(WalletTransaction {
        kind: TransactionType::Incoming,
        payment_hash: required_str(operation, invoice, "payment_hash")?,
        payment_request: str_field(invoice, "bolt11"),
        preimage: str_field(invoice, "payment_preimage"),
        memo: str_field(invoice, "description"),
        amount: msat_to_sat(received.or(requested).unwrap_or(0)),
        fees_paid: 0,
        settled_at: invoice.get("paid_at").and_then(Value::as_u64),
    })
}

fn pay_to_transaction(operation: &'static str, pay: &Value) -> ConnectorResult<WalletTransaction> {
    let amount = parse_optional_msat("amount_msat", pay.get("amount_msat"))?.unwrap_or(0);
    let sent = parse_optional_msat("amount_sent_msat", pay.get("amount_sent_msat"))?.unwrap_or(amount);
    Ok(WalletTransaction {
        kind: TransactionType::Outgoing,
        payment_hash: required_str(operation, pay, "payment_hash")?,
        payment_request: str_field(pay, "bolt11"),
        preimage: str_field(pay, "preimage"),
        memo: str_field(pay, "description"),
        amount: msat_to_sat(amount),
        fees_paid: msat_to_sat(sent.saturating_sub(amount)),
        settled_at: pay
            .get("completed_at")
            .or_else(|| pay.get("created_at"))
            .and_then(Value::as_u64),
    })
}

/// Map a `pay` or `keysend` result
fn payment_result(operation: &'static str, paid: &Value) -> ConnectorResult<SendPaymentResponse> {
    let amount = parse_msat(
        "amount_msat",
        paid.get("amount_msat")
            .ok_or_else(|| ConnectorError::invalid_response(operation, "missing amount_msat"))?,
    )?;
    let sent = parse_optional_msat("amount_sent_msat", paid.get("amount_sent_msat"))?.unwrap_or(amount);

    Ok(SendPaymentResponse {
        preimage: required_str(operation, paid, "payment_preimage")?,
        payment_hash: required_str(operation, paid, "payment_hash")?,
        route: PaymentRoute {
            total_amt: msat_to_sat(amount),
            total_fees: msat_to_sat(sent.saturating_sub(amount)),
        },
    })
}
