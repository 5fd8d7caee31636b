//! How far along a transaction is toward being spendable

use super::script_sig::threshold_signatures;
use crate::transaction::RawTransaction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SigningState {
    Unsigned,
    PartiallySigned { present: usize, required: usize },
    FullySigned,
}

impl SigningState {
    pub fn is_fully_signed(&self) -> bool {
        matches!(self, SigningState::FullySigned)
    }
}

/// `(present, required)` signatures for one input script
///
/// Threshold scripts carry their own M in the trailing redeem script. An
/// empty script has nothing to say about what it needs, so `default_required`
/// is assumed. Any other non-empty script is a complete standard spend.
pub fn input_progress(script: &[u8], default_required: usize) -> (usize, usize) {
    if script.is_empty() {
        return (0, default_required.max(1));
    }
    match threshold_signatures(script) {
        Some((signatures, redeem_script)) => {
            let required = crate::transaction::parse_multisig_redeem_script(&redeem_script)
                .map(|(m, _)| m)
                .unwrap_or(default_required);
            (signatures.len(), required)
        }
        None => (1, 1),
    }
}

/// Least-signed input decides the state of the whole transaction
///
/// A transaction without inputs has nothing signed and is `Unsigned`.
pub fn signing_state(transaction: &RawTransaction, default_required: usize) -> SigningState {
    if transaction.inputs.is_empty() {
        return SigningState::Unsigned;
    }

    let progress: Vec<(usize, usize)> = transaction
        .inputs
        .iter()
        .map(|input| input_progress(&input.script, default_required))
        .collect();

    if progress.iter().all(|(present, required)| present >= required) {
        return SigningState::FullySigned;
    }
    if progress.iter().all(|(present, _)| *present == 0) {
        return SigningState::Unsigned;
    }

    let (present, required) = progress
        .iter()
        .filter(|(present, required)| present < required)
        .min_by_key(|(present, _)| *present)
        .copied()
        .unwrap_or((0, default_required));
    SigningState::PartiallySigned { present, required }
}
