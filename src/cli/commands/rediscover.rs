use super::context::{NodeArgs, NodeContext};
use crate::errors::{AppError, AppResult};
use clap::Args;
use tracing::info;

/// Rebuild threshold addresses from the node's `PK-` accounts
#[derive(Args)]
pub struct RediscoverCommand {
    /// Keep sweeping on the configured interval instead of running once
    #[arg(long)]
    watch: bool,

    /// Sweep interval in seconds (overrides config.toml)
    #[arg(long)]
    interval: Option<u64>,

    #[command(flatten)]
    node: NodeArgs,
}

impl RediscoverCommand {
    pub async fn run(&self) -> AppResult<()> {
        let context = NodeContext::connect(&self.node).await?;

        if !self.watch {
            let report = context.wallet.rediscover().await?;
            println!(
                "Scanned {} accounts, registered {} threshold addresses, skipped {}",
                report.accounts_scanned, report.newly_registered, report.skipped
            );
            return Ok(());
        }

        let interval = self
            .interval
            .unwrap_or(context.config.wallet.rediscovery_interval_seconds);
        info!("Watching for new accounts every {}s", interval);
        context
            .wallet
            .rediscovery_sweep(interval)
            .spawn()
            .await
            .map_err(|e| AppError::InvalidData(format!("Rediscovery task ended: {}", e)))
    }
}
