//! Periodic sweep that rebuilds threshold addresses from `PK-` account labels
//!
//! Single-key accounts are imported under `PK-<hex public key>`, so the
//! threshold address paired with each one can be recomputed from the label
//! alone. With the durable store this is a consistency sweep; without it, it
//! is the only way registrations come back after a restart.

use super::registry::{RedeemScriptRegistry, ThresholdPolicy};
use crate::errors::AppResult;
use crate::keys::parse_pubkey_label;
use crate::rpc::LedgerNode;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RediscoveryReport {
    pub accounts_scanned: usize,
    pub newly_registered: usize,
    pub skipped: usize,
}

/// One pass over the node's account labels
pub async fn rediscover(
    registry: &RedeemScriptRegistry,
    ledger: &dyn LedgerNode,
    policy: &ThresholdPolicy,
) -> AppResult<RediscoveryReport> {
    let accounts = ledger.list_accounts().await?;
    let mut report = RediscoveryReport {
        accounts_scanned: accounts.len(),
        ..RediscoveryReport::default()
    };

    for account in &accounts {
        let Some(key_hex) = parse_pubkey_label(account) else {
            continue;
        };
        let Ok(key) = hex::decode(key_hex) else {
            warn!("Account label {} does not carry hex", account);
            report.skipped += 1;
            continue;
        };

        match registry.restore_from_public_key(&key, policy) {
            Ok(true) => report.newly_registered += 1,
            Ok(false) => {}
            Err(e) => {
                warn!("Could not rebuild threshold address for {}: {}", account, e);
                report.skipped += 1;
            }
        }
    }

    debug!(
        "Rediscovery scanned {} accounts, registered {}",
        report.accounts_scanned, report.newly_registered
    );
    Ok(report)
}

/// Background task running [`rediscover`] on a fixed interval
pub struct RediscoverySweep {
    registry: RedeemScriptRegistry,
    ledger: Arc<dyn LedgerNode>,
    policy: ThresholdPolicy,
    interval_secs: u64,
}

impl RediscoverySweep {
    pub fn new(
        registry: RedeemScriptRegistry,
        ledger: Arc<dyn LedgerNode>,
        policy: ThresholdPolicy,
        interval_secs: u64,
    ) -> Self {
        Self {
            registry,
            ledger,
            policy,
            interval_secs: interval_secs.max(1),
        }
    }

    /// Run forever; a failed sweep is logged and retried on the next tick
    pub async fn start_monitoring(self) {
        let mut timer = interval(Duration::from_secs(self.interval_secs));
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Starting redeem script rediscovery every {}s",
            self.interval_secs
        );

        loop {
            timer.tick().await;

            match rediscover(&self.registry, self.ledger.as_ref(), &self.policy).await {
                Ok(report) if report.newly_registered > 0 => info!(
                    "Rediscovered {} threshold addresses",
                    report.newly_registered
                ),
                Ok(_) => {}
                Err(e) => error!("Rediscovery sweep failed: {}", e),
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.start_monitoring())
    }
}
