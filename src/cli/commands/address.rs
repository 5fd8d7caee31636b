use super::context::{NodeArgs, NodeContext};
use crate::errors::AppResult;
use crate::utils::currency::format_sats_as_btc;
use clap::Args;
use tracing::info;

/// Derive a fresh single-key address for a user
#[derive(Args)]
pub struct NewAddressCommand {
    /// User identifier the key is derived from
    #[arg(long)]
    user_id: String,

    /// Rounds to skip before probing
    #[arg(long, default_value_t = 0)]
    skip: u32,

    #[command(flatten)]
    node: NodeArgs,
}

impl NewAddressCommand {
    pub async fn run(&self) -> AppResult<()> {
        let context = NodeContext::connect(&self.node).await?;
        let address = context.wallet.create_address(&self.user_id, self.skip).await?;
        println!("{}", address);
        Ok(())
    }
}

/// Build and register a threshold address
#[derive(Args)]
pub struct MultisigAddressCommand {
    #[arg(long)]
    user_id: String,

    /// Participant addresses or hex public keys
    #[arg(required = true)]
    participants: Vec<String>,

    #[command(flatten)]
    node: NodeArgs,
}

impl MultisigAddressCommand {
    pub async fn run(&self) -> AppResult<()> {
        let context = NodeContext::connect(&self.node).await?;
        let address = context
            .wallet
            .get_multisig_address(&self.participants, &self.user_id)
            .await?;
        println!("{}", address);
        Ok(())
    }
}

/// Spendable balance of an address
#[derive(Args)]
pub struct BalanceCommand {
    address: String,

    #[command(flatten)]
    node: NodeArgs,
}

impl BalanceCommand {
    pub async fn run(&self) -> AppResult<()> {
        let context = NodeContext::connect(&self.node).await?;
        let balance = context.wallet.get_balance(&self.address).await?;
        info!("{} holds {} sats", self.address, balance);
        println!("{}", format_sats_as_btc(balance));
        Ok(())
    }
}
