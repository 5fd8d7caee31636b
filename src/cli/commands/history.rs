use super::context::{NodeArgs, NodeContext};
use crate::errors::AppResult;
use clap::Args;

/// Payment history of an address with counterparties resolved
#[derive(Args)]
pub struct HistoryCommand {
    address: String,

    /// Entries to return
    #[arg(long, default_value_t = 100)]
    count: usize,

    /// Entries to skip
    #[arg(long, default_value_t = 0)]
    skip: usize,

    #[command(flatten)]
    node: NodeArgs,
}

impl HistoryCommand {
    pub async fn run(&self) -> AppResult<()> {
        let context = NodeContext::connect(&self.node).await?;
        let history = context
            .wallet
            .get_transactions(&self.address, self.count, self.skip)
            .await?;
        println!("{}", serde_json::to_string_pretty(&history)?);
        Ok(())
    }
}
