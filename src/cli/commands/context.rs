//! Shared wiring for commands that talk to the ledger node

use crate::cluster::{HttpClusterTransport, SigningCoordinator};
use crate::config::AppConfig;
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::rpc::{BitcoinRpcClient, LedgerNode, RemoteSigner};
use crate::wallet::CosignerWallet;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Overrides common to every node-facing command
#[derive(Args, Debug, Clone, Default)]
pub struct NodeArgs {
    /// Registry database path (overrides config.toml)
    #[arg(long)]
    pub database_path: Option<PathBuf>,

    /// Bitcoin RPC URL (overrides config.toml)
    #[arg(long)]
    pub rpc_url: Option<String>,

    /// Bitcoin RPC username (overrides config.toml)
    #[arg(long)]
    pub rpc_username: Option<String>,

    /// Bitcoin RPC password (overrides config.toml)
    #[arg(long)]
    pub rpc_password: Option<String>,
}

impl NodeArgs {
    /// Config file and environment, then these flags on top
    pub fn load_config(&self) -> AppResult<AppConfig> {
        let mut app_config = match AppConfig::load() {
            Ok(config) => {
                info!("Configuration loaded successfully");
                config
            }
            Err(e) => {
                warn!("Failed to load configuration: {}", e);
                return Err(AppError::Config(e.to_string()));
            }
        };

        if let Some(path) = &self.database_path {
            app_config.database.path = path.clone();
        }
        if let Some(url) = &self.rpc_url {
            app_config.bitcoin_rpc.url = url.clone();
        }
        if let Some(username) = &self.rpc_username {
            app_config.bitcoin_rpc.username = username.clone();
        }
        if let Some(password) = &self.rpc_password {
            app_config.bitcoin_rpc.password = password.clone();
        }
        Ok(app_config)
    }
}

/// Everything a command needs, connected
pub struct NodeContext {
    pub config: AppConfig,
    pub wallet: CosignerWallet,
}

impl NodeContext {
    pub async fn connect(args: &NodeArgs) -> AppResult<Self> {
        let config = args.load_config()?;

        let client = Arc::new(BitcoinRpcClient::new(config.bitcoin_rpc.clone()).await?);
        let ledger: Arc<dyn LedgerNode> = client.clone();
        let remote: Arc<dyn RemoteSigner> = client;

        let store = Database::open_shared(&config.database.path.to_string_lossy())?;
        let signer_id = config
            .cluster
            .nodes
            .iter()
            .find(|node| node.originator)
            .map(|node| node.id.clone())
            .unwrap_or_else(|| "local".to_string());

        let wallet = CosignerWallet::new(
            &signer_id,
            &config.wallet,
            ledger,
            Some(remote),
            Some(store),
        )?;
        Ok(Self { config, wallet })
    }

    pub fn coordinator(&self) -> AppResult<SigningCoordinator> {
        let transport = HttpClusterTransport::new(self.config.cluster.node_timeout_seconds)?;
        Ok(SigningCoordinator::new(
            &self.config.cluster,
            self.wallet.builder(),
            self.wallet.signer(),
            self.wallet.ledger(),
            Arc::new(transport),
        ))
    }
}
