//! Nostr Wallet Connect Connector
//!
//! NIP-47 requests travel as encrypted events through the relays named in the
//! connection URI. The wallet service reports amounts in millisatoshis.
//!
//! - **uri**: `nostr+walletconnect://` parsing
//! - **wire**: request and response payloads
//! - **relay**: the nostr-sdk backed [`NwcTransport`]

pub mod relay;
pub mod uri;
pub mod wire;

pub use relay::RelayTransport;
pub use uri::ConnectionUri;

use crate::config::NwcConfig;
use crate::connector::amount::{msat_to_sat, parse_msat, parse_optional_msat, sat_to_msat};
use crate::connector::invoice::{decode_invoice, resolve_payment_hash};
use crate::connector::types::*;
use crate::connector::Capability;
use crate::crypto::helpers::payment_hash_from_preimage;
use crate::error::{ConnectorError, ConnectorResult, TransportError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use wire::*;

/// Request/response channel to a wallet service
#[async_trait]
pub trait NwcTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;

    async fn request(&self, request: &NwcRequest) -> Result<NwcResponse, TransportError>;

    async fn disconnect(&self);
}

pub struct NwcConnector {
    transport: Arc<dyn NwcTransport>,
}

const CAPABILITIES: [Capability; 9] = [
    Capability::GetInfo,
    Capability::GetBalance,
    Capability::GetInvoices,
    Capability::GetTransactions,
    Capability::MakeInvoice,
    Capability::SendPayment,
    Capability::Keysend,
    Capability::CheckPayment,
    Capability::SignMessage,
];

impl NwcConnector {
    pub const BACKEND: &'static str = "nwc";

    pub fn new(transport: Arc<dyn NwcTransport>) -> Self {
        Self { transport }
    }

    pub fn from_config(config: &NwcConfig) -> ConnectorResult<Self> {
        let uri = ConnectionUri::parse(&config.uri)?;
        let transport = RelayTransport::new(&uri, config.timeout())?;
        Ok(Self::new(Arc::new(transport)))
    }

    /// Everything except `connect_peer`
    pub fn capabilities(&self) -> &'static [Capability] {
        &CAPABILITIES
    }

    pub async fn init(&self) -> ConnectorResult<()> {
        self.transport
            .connect()
            .await
            .map_err(|e| ConnectorError::transport("init", e))
    }

    pub async fn unload(&self) -> ConnectorResult<()> {
        self.transport.disconnect().await;
        Ok(())
    }

    async fn call(&self, operation: &'static str, method: &str, params: Value) -> ConnectorResult<Value> {
        let request = NwcRequest::new(method, params);
        self.transport
            .request(&request)
            .await
            .and_then(NwcResponse::into_result)
            .map_err(|e| ConnectorError::transport(operation, e))
    }

    pub async fn get_info(&self) -> ConnectorResult<GetInfoResponse> {
        const OP: &str = "get_info";
        let info = self.call(OP, METHOD_GET_INFO, json!({})).await?;
        Ok(GetInfoResponse {
            alias: str_field(&info, "alias").unwrap_or_default(),
            pubkey: str_field(&info, "pubkey").unwrap_or_default(),
            color: str_field(&info, "color").unwrap_or_default(),
            network: str_field(&info, "network"),
            block_height: info
                .get("block_height")
                .and_then(Value::as_u64)
                .and_then(|h| u32::try_from(h).ok()),
        })
    }

    pub async fn get_balance(&self) -> ConnectorResult<GetBalanceResponse> {
        const OP: &str = "get_balance";
        let result = self.call(OP, METHOD_GET_BALANCE, json!({})).await?;
        let msat = result
            .get("balance")
            .ok_or_else(|| ConnectorError::invalid_response(OP, "missing balance"))?;
        Ok(GetBalanceResponse {
            balance: msat_to_sat(parse_msat("balance", msat)?),
        })
    }

    async fn settled_transactions(&self, operation: &'static str, params: Value) -> ConnectorResult<Vec<WalletTransaction>> {
        let listed = self.call(operation, METHOD_LIST_TRANSACTIONS, params).await?;
        let entries = listed
            .get("transactions")
            .and_then(Value::as_array)
            .ok_or_else(|| ConnectorError::invalid_response(operation, "missing transactions list"))?;

        let mut transactions = entries
            .iter()
            .filter(|entry| is_settled(entry))
            .map(|entry| to_transaction(operation, entry))
            .collect::<ConnectorResult<Vec<_>>>()?;
        transactions.sort_by(|a, b| b.settled_at.cmp(&a.settled_at));
        Ok(transactions)
    }

    /// Settled incoming invoices
    pub async fn get_invoices(&self) -> ConnectorResult<GetTransactionsResponse> {
        Ok(GetTransactionsResponse {
            transactions: self
                .settled_transactions("get_invoices", json!({ "type": "incoming" }))
                .await?,
        })
    }

    /// Settled invoices and payments, newest first
    pub async fn get_transactions(&self) -> ConnectorResult<GetTransactionsResponse> {
        Ok(GetTransactionsResponse {
            transactions: self.settled_transactions("get_transactions", json!({})).await?,
        })
    }

    pub async fn make_invoice(&self, args: MakeInvoiceArgs) -> ConnectorResult<MakeInvoiceResponse> {
        const OP: &str = "make_invoice";
        let params = json!({
            "amount": sat_to_msat("amount", args.amount)?,
            "description": args.memo,
        });
        let result = self.call(OP, METHOD_MAKE_INVOICE, params).await?;
        let payment_request = str_field(&result, "invoice")
            .ok_or_else(|| ConnectorError::invalid_response(OP, "missing invoice"))?;

        let payment_hash = match str_field(&result, "payment_hash").filter(|h| !h.is_empty()) {
            Some(hash) => hash,
            None => {
                let decoded = decode_invoice(OP, &payment_request)?;
                resolve_payment_hash(OP, None, Some(&decoded))?
            }
        };

        Ok(MakeInvoiceResponse {
            payment_request,
            payment_hash,
        })
    }

    /// The invoice is decoded before anything is sent to the wallet
    pub async fn send_payment(&self, args: SendPaymentArgs) -> ConnectorResult<SendPaymentResponse> {
        const OP: &str = "send_payment";
        let decoded = decode_invoice(OP, &args.payment_request)?;
        let payment_hash = resolve_payment_hash(OP, None, Some(&decoded))?;

        let result = self
            .call(OP, METHOD_PAY_INVOICE, json!({ "invoice": args.payment_request }))
            .await?;
        let preimage = str_field(&result, "preimage")
            .ok_or_else(|| ConnectorError::invalid_response(OP, "missing preimage"))?;
        let fees = parse_optional_msat("fees_paid", result.get("fees_paid"))?.unwrap_or(0);

        Ok(SendPaymentResponse {
            preimage,
            payment_hash,
            route: PaymentRoute {
                total_amt: msat_to_sat(decoded.amount_msat.unwrap_or(0)),
                total_fees: msat_to_sat(fees),
            },
        })
    }

    /// The wallet returns only a preimage; the payment hash is its SHA256
    pub async fn keysend(&self, args: KeysendArgs) -> ConnectorResult<SendPaymentResponse> {
        const OP: &str = "keysend";
        let amount_msat = sat_to_msat("amount", args.amount)?;
        let mut params = json!({
            "amount": amount_msat,
            "pubkey": args.pubkey,
        });
        if !args.custom_records.is_empty() {
            let records = tlv_records(OP, &args.custom_records)?;
            params["tlv_records"] = json!(records);
        }

        let result = self.call(OP, METHOD_PAY_KEYSEND, params).await?;
        let preimage = str_field(&result, "preimage")
            .ok_or_else(|| ConnectorError::invalid_response(OP, "missing preimage"))?;
        let payment_hash = payment_hash_from_preimage(&preimage)
            .map_err(|e| ConnectorError::invalid_response(OP, format!("preimage: {}", e)))?;
        let fees = parse_optional_msat("fees_paid", result.get("fees_paid"))?.unwrap_or(0);

        Ok(SendPaymentResponse {
            preimage,
            payment_hash,
            route: PaymentRoute {
                total_amt: args.amount,
                total_fees: msat_to_sat(fees),
            },
        })
    }

    /// Any lookup failure reads as unpaid
    pub async fn check_payment(&self, args: CheckPaymentArgs) -> ConnectorResult<CheckPaymentResponse> {
        const OP: &str = "check_payment";
        let lookup = self
            .call(OP, METHOD_LOOKUP_INVOICE, json!({ "payment_hash": args.payment_hash }))
            .await;

        match lookup {
            Ok(invoice) if is_settled(&invoice) => Ok(CheckPaymentResponse {
                paid: true,
                preimage: str_field(&invoice, "preimage").filter(|p| !p.is_empty()),
            }),
            Ok(_) => Ok(CheckPaymentResponse::not_paid()),
            Err(e) => {
                tracing::warn!(payment_hash = %args.payment_hash, error = %e, "invoice lookup failed, reporting unpaid");
                Ok(CheckPaymentResponse::not_paid())
            }
        }
    }

    pub async fn sign_message(&self, args: SignMessageArgs) -> ConnectorResult<SignMessageResponse> {
        const OP: &str = "sign_message";
        let result = self
            .call(OP, METHOD_SIGN_MESSAGE, json!({ "message": args.message }))
            .await?;
        Ok(SignMessageResponse {
            message: str_field(&result, "message").unwrap_or(args.message),
            signature: str_field(&result, "signature")
                .ok_or_else(|| ConnectorError::invalid_response(OP, "missing signature"))?,
        })
    }

    pub async fn connect_peer(&self, _args: ConnectPeerArgs) -> ConnectorResult<ConnectPeerResponse> {
        Err(ConnectorError::NotImplemented {
            backend: Self::BACKEND,
            operation: "connect_peer",
        })
    }
}

fn str_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

fn is_settled(entry: &Value) -> bool {
    entry.get("settled_at").map_or(false, |v| !v.is_null())
        || entry.get("state").and_then(Value::as_str) == Some("settled")
}

fn to_transaction(operation: &'static str, entry: &Value) -> ConnectorResult<WalletTransaction> {
    let kind = match entry.get("type").and_then(Value::as_str) {
        Some("incoming") => TransactionType::Incoming,
        Some("outgoing") => TransactionType::Outgoing,
        other => {
            return Err(ConnectorError::invalid_response(
                operation,
                format!("unknown transaction type {:?}", other),
            ))
        }
    };
    Ok(WalletTransaction {
        kind,
        payment_hash: str_field(entry, "payment_hash")
            .ok_or_else(|| ConnectorError::invalid_response(operation, "missing payment_hash"))?,
        payment_request: str_field(entry, "invoice"),
        preimage: str_field(entry, "preimage").filter(|p| !p.is_empty()),
        memo: str_field(entry, "description"),
        amount: msat_to_sat(parse_optional_msat("amount", entry.get("amount"))?.unwrap_or(0)),
        fees_paid: msat_to_sat(parse_optional_msat("fees_paid", entry.get("fees_paid"))?.unwrap_or(0)),
        settled_at: entry.get("settled_at").and_then(Value::as_u64),
    })
}

fn tlv_records(
    operation: &'static str,
    records: &std::collections::BTreeMap<String, String>,
) -> ConnectorResult<Vec<TlvRecord>> {
    hex_encode_records(records)
        .into_iter()
        .map(|(tlv_type, value)| {
            let tlv_type = tlv_type.parse::<u64>().map_err(|_| ConnectorError::InvalidArgument {
                operation,
                reason: format!("TLV type {:?} is not an integer", tlv_type),
            })?;
            Ok(TlvRecord { tlv_type, value })
        })
        .collect()
}
