use crate::errors::AppResult;
use clap::{Parser, Subcommand};

pub mod commands;

/// Custodial M-of-N Bitcoin cosigner
#[derive(Parser)]
#[command(name = "cosigner")]
#[command(about = "Custodial M-of-N Bitcoin cosigner")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Test ledger node RPC connectivity
    TestRpc(commands::test_rpc::TestRpcCommand),
    /// Derive a fresh address for a user
    NewAddress(commands::address::NewAddressCommand),
    /// Build and register a threshold address
    MultisigAddress(commands::address::MultisigAddressCommand),
    /// Show the spendable balance of an address
    Balance(commands::address::BalanceCommand),
    /// Build a transaction and sign it with the user's key
    Prepare(commands::transaction::PrepareCommand),
    /// Collect cosigner signatures from the cluster
    Approve(commands::transaction::ApproveCommand),
    /// Broadcast a signed transaction
    Submit(commands::transaction::SubmitCommand),
    /// Answer a sign command from another cluster node
    HandleSign(commands::transaction::HandleSignCommand),
    /// Show an address's payment history
    History(commands::history::HistoryCommand),
    /// Rebuild threshold addresses from node account labels
    Rediscover(commands::rediscover::RediscoverCommand),
}

pub async fn run() -> AppResult<()> {
    // Uses RUST_LOG (defaults to "error" if not set)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("error")),
        )
        .try_init();

    let cli = Cli::parse();

    match cli.command {
        Commands::TestRpc(command) => command.run().await,
        Commands::NewAddress(command) => command.run().await,
        Commands::MultisigAddress(command) => command.run().await,
        Commands::Balance(command) => command.run().await,
        Commands::Prepare(command) => command.run().await,
        Commands::Approve(command) => command.run().await,
        Commands::Submit(command) => command.run().await,
        Commands::HandleSign(command) => command.run().await,
        Commands::History(command) => command.run().await,
        Commands::Rediscover(command) => command.run().await,
    }
}
