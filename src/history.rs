//! Counterparty reconstruction for wallet history
//!
//! The ledger's payment list only names our side of each payment. Senders of
//! a receive are found by following every input back to the output it spends
//! and decoding that output's script into an address.

use crate::errors::{AppError, AppResult};
use crate::rpc::{LedgerNode, Payment, PaymentCategory};
use crate::transaction::{decode_redeem_script_address, RawInput, RawTransaction, Txid};
use bitcoin::Network;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Upper bound on payments requested from the ledger per scan
pub const HISTORY_SCAN_LIMIT: usize = 1_000_000;

/// Parent transactions fetched at once while tracing inputs
const SENDER_LOOKUP_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDetails {
    pub tx_hash: Txid,
    /// Resolved senders, deduplicated; `None` for an input that could not be traced
    pub from_addresses: Vec<Option<String>>,
    pub to_addresses: Vec<String>,
    /// Satoshis as reported by the ledger, negative for sends
    pub amount: i64,
}

impl TransactionDetails {
    /// Funds moving between the same set of addresses
    pub fn is_self_transfer(&self) -> bool {
        let senders: HashSet<Option<&str>> =
            self.from_addresses.iter().map(|a| a.as_deref()).collect();
        let recipients: HashSet<Option<&str>> =
            self.to_addresses.iter().map(|a| Some(a.as_str())).collect();
        senders == recipients
    }
}

pub struct HistoryReconstructor {
    ledger: Arc<dyn LedgerNode>,
    network: Network,
}

impl HistoryReconstructor {
    pub fn new(ledger: Arc<dyn LedgerNode>, network: Network) -> Self {
        Self { ledger, network }
    }

    /// Address paid by the output `input` spends
    async fn resolve_sender(&self, input: &RawInput) -> AppResult<String> {
        let parent = self.ledger.get_raw_transaction(&input.prev_txid).await?;
        let output = parent.outputs.get(input.prev_index as usize).ok_or_else(|| {
            AppError::InvalidData(format!(
                "{} has no output {}",
                input.prev_txid, input.prev_index
            ))
        })?;
        decode_redeem_script_address(&output.script, self.network)
    }

    /// Senders of `transaction` in input order, unresolvable ones recorded as `None`
    pub async fn resolve_senders(&self, transaction: &RawTransaction) -> Vec<Option<String>> {
        let resolved: Vec<Option<String>> = stream::iter(transaction.inputs.iter())
            .map(|input| async move {
                match self.resolve_sender(input).await {
                    Ok(address) => Some(address),
                    Err(e) => {
                        debug!(
                            "Could not trace input {}:{}: {}",
                            input.prev_txid, input.prev_index, e
                        );
                        None
                    }
                }
            })
            .buffered(SENDER_LOOKUP_CONCURRENCY)
            .collect()
            .await;

        let mut senders: Vec<Option<String>> = Vec::with_capacity(resolved.len());
        for sender in resolved {
            if !senders.contains(&sender) {
                senders.push(sender);
            }
        }
        senders
    }

    async fn details_for(
        &self,
        payment: &Payment,
        address: &str,
    ) -> AppResult<Option<TransactionDetails>> {
        match payment.category {
            PaymentCategory::Receive => {
                if payment.address.as_deref() != Some(address) {
                    return Ok(None);
                }
                let transaction = self.ledger.get_raw_transaction(&payment.txid).await?;
                Ok(Some(TransactionDetails {
                    tx_hash: payment.txid,
                    from_addresses: self.resolve_senders(&transaction).await,
                    to_addresses: vec![address.to_string()],
                    amount: payment.amount,
                }))
            }
            PaymentCategory::Send => {
                let transaction = self.ledger.get_raw_transaction(&payment.txid).await?;
                let senders = self.resolve_senders(&transaction).await;
                if !senders.iter().any(|s| s.as_deref() == Some(address)) {
                    return Ok(None);
                }
                Ok(Some(TransactionDetails {
                    tx_hash: payment.txid,
                    from_addresses: vec![Some(address.to_string())],
                    to_addresses: payment.address.iter().cloned().collect(),
                    amount: payment.amount,
                }))
            }
            PaymentCategory::Other => Ok(None),
        }
    }

    /// History of `address`, self-transfers removed, then `skip` / `count` applied
    pub async fn get_transactions(
        &self,
        address: &str,
        count: usize,
        skip: usize,
    ) -> AppResult<Vec<TransactionDetails>> {
        let payments = self.ledger.list_transactions(HISTORY_SCAN_LIMIT, 0).await?;
        debug!("Scanning {} payments for {}", payments.len(), address);

        let mut history = Vec::new();
        for payment in &payments {
            match self.details_for(payment, address).await {
                Ok(Some(details)) if details.is_self_transfer() => {
                    debug!("Dropping self transfer {}", details.tx_hash);
                }
                Ok(Some(details)) => history.push(details),
                Ok(None) => {}
                Err(e) => warn!("Skipping payment {}: {}", payment.txid, e),
            }
        }

        Ok(history.into_iter().skip(skip).take(count).collect())
    }
}
