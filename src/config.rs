use bitcoin::Network;
use config::{Config, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Application configuration loaded from config.toml or environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub wallet: WalletConfig,
    pub cluster: ClusterConfig,
    pub bitcoin_rpc: BitcoinRpcConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Durable redeem-script and address-index store
    pub path: PathBuf,
}

/// Key derivation, threshold and coin-selection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    pub network: String,
    pub server_private_key: String,
    pub max_deterministic_addresses: u32,
    pub min_signatures: u32,
    /// Fixed cosigner public keys (hex), appended to every threshold address
    pub multisig_accounts: Vec<String>,
    pub min_confirmations: u32,
    pub max_confirmations: u32,
    pub fixed_fee_sats: u64,
    pub rediscovery_interval_seconds: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: "regtest".to_string(),
            server_private_key: String::new(),
            max_deterministic_addresses: 100,
            min_signatures: 2,
            multisig_accounts: Vec::new(),
            min_confirmations: 0,
            max_confirmations: 9_999_999,
            fixed_fee_sats: 200_000,
            rediscovery_interval_seconds: 60,
        }
    }
}

impl WalletConfig {
    /// Parsed network; unknown names are a configuration error
    pub fn network(&self) -> Result<Network, ConfigError> {
        Network::from_str(&self.network).map_err(|e| {
            ConfigError::Message(format!("Unknown network '{}': {}", self.network, e))
        })
    }
}

/// How the coordinator hands signatures to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningType {
    /// Gather every reachable signature, then broadcast once
    CollectThenSubmit,
    /// Broadcast after each newly added signature
    SendEach,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterNodeConfig {
    pub id: String,
    pub url: String,
    /// True for the node this process runs as
    #[serde(default)]
    pub originator: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub signing_type: SigningType,
    pub node_timeout_seconds: u64,
    #[serde(default)]
    pub nodes: Vec<ClusterNodeConfig>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            signing_type: SigningType::CollectThenSubmit,
            node_timeout_seconds: 30,
            nodes: vec![ClusterNodeConfig {
                id: "local".to_string(),
                url: "http://localhost:8446".to_string(),
                originator: true,
            }],
        }
    }
}

/// Bitcoin Core RPC configuration for the ledger node collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoinRpcConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub timeout_seconds: u64,
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_seconds: u64,
    pub concurrent_requests: usize,
}

impl Default for BitcoinRpcConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8332".to_string(),
            username: "bitcoin".to_string(),
            password: "password".to_string(),
            timeout_seconds: 60,
            max_retries: 10,
            initial_backoff_ms: 100,
            backoff_multiplier: 2.0,
            max_backoff_seconds: 30,
            concurrent_requests: 10,
        }
    }
}

impl AppConfig {
    /// Load configuration from config.toml file and environment variables
    /// Environment variables take precedence over file configuration
    pub fn load() -> Result<Self, ConfigError> {
        let rpc = BitcoinRpcConfig::default();
        let wallet = WalletConfig::default();
        let cluster = ClusterConfig::default();
        let config = Config::builder()
            .set_default("database.path", "./cosigner.db")?
            // Wallet defaults
            .set_default("wallet.network", wallet.network)?
            .set_default("wallet.server_private_key", wallet.server_private_key)?
            .set_default(
                "wallet.max_deterministic_addresses",
                wallet.max_deterministic_addresses as i64,
            )?
            .set_default("wallet.min_signatures", wallet.min_signatures as i64)?
            .set_default("wallet.multisig_accounts", Vec::<String>::new())?
            .set_default("wallet.min_confirmations", wallet.min_confirmations as i64)?
            .set_default("wallet.max_confirmations", wallet.max_confirmations as i64)?
            .set_default("wallet.fixed_fee_sats", wallet.fixed_fee_sats)?
            .set_default(
                "wallet.rediscovery_interval_seconds",
                wallet.rediscovery_interval_seconds,
            )?
            // Cluster defaults
            .set_default("cluster.signing_type", "collect_then_submit")?
            .set_default("cluster.node_timeout_seconds", cluster.node_timeout_seconds)?
            // Bitcoin RPC defaults
            .set_default("bitcoin_rpc.url", rpc.url)?
            .set_default("bitcoin_rpc.username", rpc.username)?
            .set_default("bitcoin_rpc.password", rpc.password)?
            .set_default("bitcoin_rpc.timeout_seconds", rpc.timeout_seconds)?
            .set_default("bitcoin_rpc.max_retries", rpc.max_retries as i64)?
            .set_default("bitcoin_rpc.initial_backoff_ms", rpc.initial_backoff_ms)?
            .set_default("bitcoin_rpc.backoff_multiplier", rpc.backoff_multiplier)?
            .set_default("bitcoin_rpc.max_backoff_seconds", rpc.max_backoff_seconds)?
            .set_default(
                "bitcoin_rpc.concurrent_requests",
                rpc.concurrent_requests as i64,
            )?
            // Load from config.toml if it exists
            .add_source(File::with_name("config").required(false))
            // COSIGNER_WALLET__MIN_SIGNATURES style overrides
            .add_source(config::Environment::with_prefix("COSIGNER").separator("__"))
            .build()?;

        let mut app_config: AppConfig = config.try_deserialize()?;

        if app_config.cluster.nodes.is_empty() {
            app_config.cluster.nodes = cluster.nodes;
        }

        // Flat names kept for operators used to the RPC client's variables
        if let Ok(url) = env::var("BITCOIN_RPC_URL") {
            app_config.bitcoin_rpc.url = url;
        }
        if let Ok(username) = env::var("BITCOIN_RPC_USERNAME") {
            app_config.bitcoin_rpc.username = username;
        }
        if let Ok(password) = env::var("BITCOIN_RPC_PASSWORD") {
            app_config.bitcoin_rpc.password = password;
        }
        if let Ok(secret) = env::var("COSIGNER_SERVER_KEY") {
            app_config.wallet.server_private_key = secret;
        }

        app_config.validate()?;
        Ok(app_config)
    }

    /// Get default config values for CLI argument defaults
    pub fn get_defaults() -> Result<Self, ConfigError> {
        match Self::load() {
            Ok(config) => Ok(config),
            Err(_) => Ok(Self {
                database: DatabaseConfig {
                    path: PathBuf::from("./cosigner.db"),
                },
                wallet: WalletConfig::default(),
                cluster: ClusterConfig::default(),
                bitcoin_rpc: BitcoinRpcConfig::default(),
            }),
        }
    }

    /// Reject configurations the signing engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.wallet.network()?;

        if self.wallet.server_private_key.is_empty() {
            return Err(ConfigError::Message(
                "Server private key not configured. Set COSIGNER_SERVER_KEY or wallet.server_private_key in config.toml".to_string(),
            ));
        }
        if self.wallet.min_signatures == 0 {
            return Err(ConfigError::Message(
                "wallet.min_signatures must be at least 1".to_string(),
            ));
        }
        if self.wallet.max_deterministic_addresses == 0 {
            return Err(ConfigError::Message(
                "wallet.max_deterministic_addresses must be at least 1".to_string(),
            ));
        }
        if self.wallet.min_confirmations > self.wallet.max_confirmations {
            return Err(ConfigError::Message(format!(
                "wallet.min_confirmations ({}) exceeds wallet.max_confirmations ({})",
                self.wallet.min_confirmations, self.wallet.max_confirmations
            )));
        }
        if !self.cluster.nodes.iter().any(|node| node.originator) {
            return Err(ConfigError::Message(
                "cluster.nodes must contain the originator node".to_string(),
            ));
        }
        Ok(())
    }
}
