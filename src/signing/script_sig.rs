//! Input script assembly and partial-signature merging
//!
//! Standard inputs: `<sig> <pubkey>`.
//! Threshold inputs: `OP_0 <sig>... <redeem script>`, signatures in the order
//! they were added. Adding a signature strips the trailing redeem-script push,
//! appends the signature, and re-appends the redeem script.

use super::ecdsa::is_signature_push;
use crate::errors::{AppError, AppResult};
use crate::transaction::script::OP_0;
use crate::transaction::{
    parse_multisig_redeem_script, parse_script, push_data, RawTransaction, ScriptElement,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One signer's contribution to one input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSignature {
    pub signer_id: String,
    pub input_index: usize,
    /// DER signature with the hash-type byte appended
    #[serde(with = "hex::serde")]
    pub der_signature: Vec<u8>,
}

/// What a given input needs to be spent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpendingCondition {
    Standard {
        public_key: Vec<u8>,
        script_pub_key: Vec<u8>,
    },
    Threshold {
        redeem_script: Vec<u8>,
    },
}

impl SpendingCondition {
    /// Script placed in the signed input when computing the sighash
    pub fn script_code(&self) -> &[u8] {
        match self {
            SpendingCondition::Standard { script_pub_key, .. } => script_pub_key,
            SpendingCondition::Threshold { redeem_script } => redeem_script,
        }
    }
}

fn pushed(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 3);
    push_data(&mut out, data);
    out
}

/// Signatures and redeem script of a threshold input script, if it is one
pub fn threshold_signatures(script: &[u8]) -> Option<(Vec<Vec<u8>>, Vec<u8>)> {
    let elements = parse_script(script).ok()?;
    let (last, rest) = elements.split_last()?;
    let ScriptElement::Push(redeem_script) = last else {
        return None;
    };
    parse_multisig_redeem_script(redeem_script)?;

    let signatures = rest
        .iter()
        .filter_map(|element| match element {
            ScriptElement::Push(data) if is_signature_push(data) => Some(data.clone()),
            _ => None,
        })
        .collect();
    Some((signatures, redeem_script.clone()))
}

/// Merge `signature` into the input it names
pub fn apply_signature(
    transaction: &mut RawTransaction,
    signature: &PartialSignature,
    condition: &SpendingCondition,
) -> AppResult<()> {
    let input_count = transaction.inputs.len();
    let input = transaction
        .inputs
        .get_mut(signature.input_index)
        .ok_or_else(|| {
            AppError::InvalidData(format!(
                "Signature for input {} but transaction has {} inputs",
                signature.input_index, input_count
            ))
        })?;

    match condition {
        SpendingCondition::Standard { public_key, .. } => {
            let mut script = pushed(&signature.der_signature);
            push_data(&mut script, public_key);
            input.script = script;
        }
        SpendingCondition::Threshold { redeem_script } => {
            if let Some((existing, _)) = threshold_signatures(&input.script) {
                if existing.contains(&signature.der_signature) {
                    debug!(
                        "Input {} already carries this signature from {}",
                        signature.input_index, signature.signer_id
                    );
                    return Ok(());
                }
            }

            let redeem_push = pushed(redeem_script);
            let mut script = std::mem::take(&mut input.script);
            if script.ends_with(&redeem_push) {
                script.truncate(script.len() - redeem_push.len());
            }
            if script.is_empty() {
                script.push(OP_0);
            }
            push_data(&mut script, &signature.der_signature);
            script.extend_from_slice(&redeem_push);
            input.script = script;
        }
    }

    debug!(
        "Applied signature from {} to input {}",
        signature.signer_id, signature.input_index
    );
    Ok(())
}

/// Fold signatures found in `signed` into `current`
///
/// `signed` must be the same transaction apart from input scripts. Threshold
/// inputs gain whichever signatures they are missing; an unsigned standard
/// input adopts the returned script. Returns the number of signatures added.
pub fn merge_signed_transaction(
    current: &mut RawTransaction,
    signed: &RawTransaction,
    signer_id: &str,
) -> AppResult<usize> {
    if current.with_stripped_input_scripts() != signed.with_stripped_input_scripts() {
        return Err(AppError::InvalidData(format!(
            "{} returned a different transaction ({} vs {})",
            signer_id,
            signed.txid(),
            current.txid()
        )));
    }

    let mut added = 0;
    for (index, returned) in signed.inputs.iter().enumerate() {
        if returned.script == current.inputs[index].script || returned.script.is_empty() {
            continue;
        }

        match threshold_signatures(&returned.script) {
            Some((signatures, redeem_script)) => {
                let condition = SpendingCondition::Threshold { redeem_script };
                let known = threshold_signatures(&current.inputs[index].script)
                    .map(|(existing, _)| existing)
                    .unwrap_or_default();

                for der_signature in signatures {
                    if known.contains(&der_signature) {
                        continue;
                    }
                    let partial = PartialSignature {
                        signer_id: signer_id.to_string(),
                        input_index: index,
                        der_signature,
                    };
                    apply_signature(current, &partial, &condition)?;
                    added += 1;
                }
            }
            None if current.inputs[index].script.is_empty() => {
                current.inputs[index].script = returned.script.clone();
                added += 1;
            }
            None => {}
        }
    }
    Ok(added)
}
