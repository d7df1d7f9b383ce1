use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use paycore::config::{parse_network, ConnectorConfig};
use paycore::connector::types::*;
use paycore::{preview, Connector, SeedKeyProvider, SigningEngine, TransactionProposal};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Parser)]
#[command(name = "paycore")]
#[command(about = "Taproot PSBT signing and Lightning payment connectors", long_about = None)]
struct Cli {
    /// Network (mainnet, testnet, signet, regtest)
    #[arg(long, global = true, env = "PAYCORE_NETWORK", default_value = "mainnet")]
    network: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the Taproot signing address for a mnemonic
    Address {
        #[command(flatten)]
        seed: SeedArgs,
    },

    /// Show inputs, outputs and fee of an unsigned PSBT
    Preview {
        /// PSBT, hex or base64
        psbt: String,
    },

    /// Sign a single-input PSBT and print the finalized transaction hex
    Sign {
        /// PSBT, hex or base64
        psbt: String,

        #[command(flatten)]
        seed: SeedArgs,
    },

    /// Run one connector operation and print the `{ "data": .. }` envelope
    Connector {
        /// Connector config: a JSON file path or inline JSON
        #[arg(long, env = "PAYCORE_CONNECTOR")]
        config: String,

        #[command(subcommand)]
        op: ConnectorOp,
    },
}

#[derive(clap::Args)]
struct SeedArgs {
    /// BIP-39 mnemonic
    #[arg(long, env = "PAYCORE_MNEMONIC", hide_env_values = true)]
    mnemonic: String,

    /// Optional BIP-39 passphrase
    #[arg(long, env = "PAYCORE_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,
}

impl SeedArgs {
    fn provider(&self) -> Result<SeedKeyProvider> {
        SeedKeyProvider::from_mnemonic(&self.mnemonic, self.passphrase.as_deref())
            .context("Failed to load mnemonic")
    }
}

#[derive(Subcommand)]
enum ConnectorOp {
    GetInfo,
    GetBalance,
    GetInvoices,
    GetTransactions,
    MakeInvoice {
        /// Satoshis
        #[arg(long)]
        amount: u64,
        #[arg(long, default_value = "")]
        memo: String,
    },
    SendPayment {
        /// BOLT 11 payment request
        payment_request: String,
    },
    Keysend {
        /// Destination node public key (hex)
        #[arg(long)]
        pubkey: String,
        /// Satoshis
        #[arg(long)]
        amount: u64,
        /// Custom TLV record as TYPE=VALUE (repeatable)
        #[arg(long = "record", value_parser = parse_record)]
        records: Vec<(String, String)>,
    },
    CheckPayment {
        payment_hash: String,
    },
    SignMessage {
        message: String,
    },
    ConnectPeer {
        /// Node public key (hex)
        pubkey: String,
        /// host or host:port
        host: String,
    },
}

fn parse_record(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(tlv_type, value)| (tlv_type.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected TYPE=VALUE, got {:?}", raw))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_connector_config(source: &str) -> Result<ConnectorConfig> {
    let config = if source.trim_start().starts_with('{') {
        ConnectorConfig::from_json(source)
    } else {
        ConnectorConfig::load(Path::new(source))
    };
    config.context("Failed to load connector config")
}

async fn run_connector(config: &ConnectorConfig, op: ConnectorOp) -> Result<()> {
    let connector = Connector::from_config(config).context("Failed to build connector")?;
    connector.init().await.context("Failed to connect")?;

    let outcome = dispatch(&connector, op).await;
    connector.unload().await.ok();

    let data = outcome?;
    print_json(&Envelope::new(data))
}

async fn dispatch(connector: &Connector, op: ConnectorOp) -> Result<serde_json::Value> {
    let data = match op {
        ConnectorOp::GetInfo => serde_json::to_value(connector.get_info().await?)?,
        ConnectorOp::GetBalance => serde_json::to_value(connector.get_balance().await?)?,
        ConnectorOp::GetInvoices => serde_json::to_value(connector.get_invoices().await?)?,
        ConnectorOp::GetTransactions => serde_json::to_value(connector.get_transactions().await?)?,
        ConnectorOp::MakeInvoice { amount, memo } => {
            serde_json::to_value(connector.make_invoice(MakeInvoiceArgs { amount, memo }).await?)?
        }
        ConnectorOp::SendPayment { payment_request } => {
            serde_json::to_value(connector.send_payment(SendPaymentArgs { payment_request }).await?)?
        }
        ConnectorOp::Keysend {
            pubkey,
            amount,
            records,
        } => {
            let args = KeysendArgs {
                pubkey,
                amount,
                custom_records: records.into_iter().collect::<BTreeMap<_, _>>(),
            };
            serde_json::to_value(connector.keysend(args).await?)?
        }
        ConnectorOp::CheckPayment { payment_hash } => {
            serde_json::to_value(connector.check_payment(CheckPaymentArgs { payment_hash }).await?)?
        }
        ConnectorOp::SignMessage { message } => {
            serde_json::to_value(connector.sign_message(SignMessageArgs { message }).await?)?
        }
        ConnectorOp::ConnectPeer { pubkey, host } => {
            serde_json::to_value(connector.connect_peer(ConnectPeerArgs { pubkey, host }).await?)?
        }
    };
    Ok(data)
}

#[tokio::main]
async fn main() -> Result<()> {
    paycore::logging::init_logging();
    let cli = Cli::parse();
    let network = parse_network(&cli.network)?;

    match cli.command {
        Commands::Address { seed } => {
            let engine = SigningEngine::new(seed.provider()?, network);
            print_json(&engine.derive_address()?)?;
        }
        Commands::Preview { psbt } => {
            let proposal = TransactionProposal::parse(&psbt).context("Failed to parse PSBT")?;
            print_json(&preview(&proposal, network)?)?;
        }
        Commands::Sign { psbt, seed } => {
            let engine = SigningEngine::new(seed.provider()?, network);
            let tx_hex = TransactionProposal::parse(&psbt)
                .and_then(|proposal| engine.sign(&proposal))
                .context("Signing failed")?;
            println!("{}", tx_hex);
        }
        Commands::Connector { config, op } => {
            let config = load_connector_config(&config)?;
            run_connector(&config, op).await?;
        }
    }

    Ok(())
}
