use super::context::{NodeArgs, NodeContext};
use crate::builder::Recipient;
use crate::cluster::{CoordinationOutcome, SignCommand};
use crate::errors::{AppError, AppResult};
use crate::transaction::RawTransaction;
use crate::utils::currency::btc_to_sats;
use clap::Args;
use std::io::Read;
use std::path::PathBuf;

/// `ADDRESS=BTC` as given on the command line
pub fn parse_recipient(raw: &str) -> AppResult<Recipient> {
    let (address, amount) = raw.split_once('=').ok_or_else(|| {
        AppError::InvalidData(format!("Recipient '{}' is not ADDRESS=AMOUNT", raw))
    })?;
    let btc: f64 = amount
        .trim()
        .parse()
        .map_err(|_| AppError::InvalidData(format!("Amount '{}' is not a number", amount)))?;
    Ok(Recipient::new(address.trim(), btc_to_sats(btc)?))
}

fn print_outcome(outcome: &CoordinationOutcome) -> AppResult<()> {
    let summary = serde_json::json!({
        "transaction": outcome.transaction.to_hex(),
        "state": outcome.state,
        "signers": outcome.signers,
        "submitted": outcome.submitted,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Build a transaction and sign it with the user's key
#[derive(Args)]
pub struct PrepareCommand {
    #[arg(long)]
    user_id: String,

    /// Source address; repeat for several, change goes to the first
    #[arg(long = "from", required = true)]
    from_addresses: Vec<String>,

    /// Recipient as ADDRESS=BTC; repeat for several
    #[arg(long = "to", required = true)]
    recipients: Vec<String>,

    #[command(flatten)]
    node: NodeArgs,
}

impl PrepareCommand {
    pub async fn run(&self) -> AppResult<()> {
        let recipients = self
            .recipients
            .iter()
            .map(|r| parse_recipient(r))
            .collect::<AppResult<Vec<_>>>()?;

        let context = NodeContext::connect(&self.node).await?;
        let outcome = context
            .coordinator()?
            .prepare_transaction(&self.from_addresses, &recipients, &self.user_id)
            .await?;
        print_outcome(&outcome)
    }
}

/// Collect cosigner signatures across the cluster
#[derive(Args)]
pub struct ApproveCommand {
    /// Hex-encoded transaction
    transaction: String,

    /// Address whose inputs are being approved
    #[arg(long)]
    address: String,

    #[arg(long)]
    user_id: Option<String>,

    #[command(flatten)]
    node: NodeArgs,
}

impl ApproveCommand {
    pub async fn run(&self) -> AppResult<()> {
        let transaction = RawTransaction::from_hex(&self.transaction)?;
        let context = NodeContext::connect(&self.node).await?;
        let outcome = context
            .coordinator()?
            .approve_transaction(&transaction, &self.address, self.user_id.as_deref())
            .await?;
        print_outcome(&outcome)
    }
}

/// Broadcast a transaction through the ledger node
#[derive(Args)]
pub struct SubmitCommand {
    transaction: String,

    #[command(flatten)]
    node: NodeArgs,
}

impl SubmitCommand {
    pub async fn run(&self) -> AppResult<()> {
        let transaction = RawTransaction::from_hex(&self.transaction)?;
        let context = NodeContext::connect(&self.node).await?;
        let txid = context.coordinator()?.submit_transaction(&transaction).await?;
        println!("{}", txid);
        Ok(())
    }
}

/// Answer a sign command (JSON) read from a file or stdin
#[derive(Args)]
pub struct HandleSignCommand {
    /// Command file; stdin when omitted
    #[arg(long)]
    input: Option<PathBuf>,

    #[command(flatten)]
    node: NodeArgs,
}

impl HandleSignCommand {
    pub async fn run(&self) -> AppResult<()> {
        let raw = match &self.input {
            Some(path) => std::fs::read_to_string(path)?,
            None => {
                let mut buffer = String::new();
                std::io::stdin().read_to_string(&mut buffer)?;
                buffer
            }
        };
        let command: SignCommand = serde_json::from_str(&raw)?;

        let context = NodeContext::connect(&self.node).await?;
        let response = context.coordinator()?.handle_sign_command(&command).await?;
        println!("{}", serde_json::to_string(&response)?);
        Ok(())
    }
}
