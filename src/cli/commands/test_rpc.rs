use super::context::NodeArgs;
use crate::errors::{AppError, AppResult};
use crate::rpc::{BitcoinRpcClient, LedgerNode};
use clap::Args;
use tracing::{error, info};

/// Check that the ledger node answers and its wallet is reachable
#[derive(Args)]
pub struct TestRpcCommand {
    #[command(flatten)]
    node: NodeArgs,
}

impl TestRpcCommand {
    pub async fn run(&self) -> AppResult<()> {
        let config = self.node.load_config()?;
        info!("Testing connection to: {}", config.bitcoin_rpc.url);

        let client = match BitcoinRpcClient::new(config.bitcoin_rpc.clone()).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to create RPC client: {}", e);
                println!("Ledger node connection FAILED: {}", e);
                println!("\nTroubleshooting tips:");
                println!("1. Check that Bitcoin Core is running with a loaded wallet");
                println!("2. Verify the RPC URL and credentials");
                println!("3. Check that the RPC server is enabled in bitcoin.conf");
                return Err(e.into());
            }
        };

        client
            .test_connection()
            .await
            .map_err(|e| AppError::Config(format!("RPC test failed: {}", e)))?;

        let accounts = client.list_accounts().await?;
        println!("Ledger node connection PASSED");
        println!("Wallet labels visible: {}", accounts.len());
        println!("Concurrent request limit: {}", client.get_concurrent_limit());
        Ok(())
    }
}
