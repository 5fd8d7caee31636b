//! Coin selection and unsigned transaction assembly

use crate::address::{self, AddressKind};
use crate::config::WalletConfig;
use crate::errors::{AppError, AppResult};
use crate::multisig::RedeemScriptRegistry;
use crate::rpc::{LedgerNode, Outpoint};
use crate::transaction::script::{p2pkh_script, p2sh_script};
use crate::transaction::{RawInput, RawOutput, RawTransaction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub address: String,
    /// Satoshis
    pub amount: u64,
}

impl Recipient {
    pub fn new(address: impl Into<String>, amount: u64) -> Self {
        Self {
            address: address.into(),
            amount,
        }
    }
}

/// Result of walking the unspent outputs against the recipient list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinSelection {
    pub inputs: Vec<Outpoint>,
    pub payments: Vec<Recipient>,
    /// Remainder after payments and fee; may be zero
    pub change: u64,
    pub fee: u64,
}

impl CoinSelection {
    pub fn input_total(&self) -> u64 {
        self.inputs
            .iter()
            .fold(0u64, |total, o| total.saturating_add(o.amount))
    }
}

/// Walk `outpoints` in the order given, paying recipients as the running subtotal allows
///
/// A recipient is paid once the subtotal strictly exceeds its amount, so an
/// output that exactly matches a payment is not enough on its own. After the
/// last payment, outputs keep being consumed until the fee is covered.
pub fn select_coins(
    outpoints: &[Outpoint],
    recipients: &[Recipient],
    fee: u64,
) -> AppResult<CoinSelection> {
    if recipients.is_empty() {
        return Err(AppError::InvalidData("No recipients given".to_string()));
    }
    let required = recipients
        .iter()
        .try_fold(fee, |total, r| total.checked_add(r.amount))
        .ok_or_else(|| AppError::InvalidData("Payment total overflows".to_string()))?;

    let mut inputs = Vec::new();
    let mut payments = Vec::with_capacity(recipients.len());
    let mut subtotal: u64 = 0;
    let mut next = 0;

    for outpoint in outpoints {
        inputs.push(outpoint.clone());
        subtotal = subtotal
            .checked_add(outpoint.amount)
            .ok_or_else(|| AppError::InvalidData("Unspent total overflows".to_string()))?;

        while let Some(recipient) = recipients.get(next) {
            if subtotal <= recipient.amount {
                break;
            }
            subtotal -= recipient.amount;
            payments.push(recipient.clone());
            next += 1;
        }

        if next == recipients.len() && subtotal >= fee {
            return Ok(CoinSelection {
                inputs,
                payments,
                change: subtotal - fee,
                fee,
            });
        }
    }

    let available = outpoints
        .iter()
        .fold(0u64, |total, o| total.saturating_add(o.amount));
    Err(AppError::InsufficientFunds {
        required,
        available,
    })
}

/// Output script for `address`, classified through the registry
pub fn output_script(registry: &RedeemScriptRegistry, address: &str) -> AppResult<Vec<u8>> {
    let decoded = address::decode(address, registry.network())?;
    Ok(match registry.classify(address)? {
        AddressKind::PubKeyHash => p2pkh_script(&decoded.hash),
        AddressKind::ScriptHash => p2sh_script(&decoded.hash),
    })
}

/// Unsigned transaction for a selection: inputs in selection order, payments then change
pub fn assemble(
    selection: &CoinSelection,
    change_address: &str,
    registry: &RedeemScriptRegistry,
) -> AppResult<RawTransaction> {
    let inputs = selection
        .inputs
        .iter()
        .map(|o| RawInput::spending(o.txid, o.output_index))
        .collect();

    let mut outputs = Vec::with_capacity(selection.payments.len() + 1);
    for payment in &selection.payments {
        outputs.push(RawOutput {
            amount: payment.amount,
            script: output_script(registry, &payment.address)?,
        });
    }
    if selection.change > 0 {
        outputs.push(RawOutput {
            amount: selection.change,
            script: output_script(registry, change_address)?,
        });
    }

    Ok(RawTransaction {
        inputs,
        outputs,
        ..RawTransaction::default()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuilderSettings {
    pub fixed_fee_sats: u64,
    pub min_confirmations: u32,
    pub max_confirmations: u32,
}

impl From<&WalletConfig> for BuilderSettings {
    fn from(wallet: &WalletConfig) -> Self {
        Self {
            fixed_fee_sats: wallet.fixed_fee_sats,
            min_confirmations: wallet.min_confirmations,
            max_confirmations: wallet.max_confirmations,
        }
    }
}

#[derive(Clone)]
pub struct TransactionBuilder {
    ledger: Arc<dyn LedgerNode>,
    registry: RedeemScriptRegistry,
    settings: BuilderSettings,
}

impl TransactionBuilder {
    pub fn new(
        ledger: Arc<dyn LedgerNode>,
        registry: RedeemScriptRegistry,
        settings: BuilderSettings,
    ) -> Self {
        Self {
            ledger,
            registry,
            settings,
        }
    }

    /// Unsigned transaction paying `recipients` from `from_addresses`, change to the first of them
    pub async fn build(
        &self,
        from_addresses: &[String],
        recipients: &[Recipient],
    ) -> AppResult<RawTransaction> {
        let change_address = from_addresses
            .first()
            .ok_or_else(|| AppError::InvalidData("No source addresses given".to_string()))?;

        let outpoints = self
            .ledger
            .list_unspent(
                self.settings.min_confirmations,
                self.settings.max_confirmations,
                from_addresses,
            )
            .await?;
        debug!(
            "{} unspent outputs available across {} addresses",
            outpoints.len(),
            from_addresses.len()
        );

        let selection = select_coins(&outpoints, recipients, self.settings.fixed_fee_sats)?;
        let transaction = assemble(&selection, change_address, &self.registry)?;

        info!(
            "Built transaction spending {} inputs ({} sats) to {} outputs, change {} sats",
            selection.inputs.len(),
            selection.input_total(),
            transaction.outputs.len(),
            selection.change
        );
        Ok(transaction)
    }
}
