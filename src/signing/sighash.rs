//! Legacy signature hash
//!
//! The signed message for input `i` is the transaction with every input
//! script emptied, input `i`'s script replaced by its spending condition, and
//! the 4-byte little-endian hash type appended; the digest is SHA-256d.
//! Only SIGHASH_ALL semantics are modelled: every input and output is covered.

use crate::errors::{AppError, AppResult};
use crate::transaction::RawTransaction;
use bitcoin::hashes::{sha256d, Hash};

pub const SIGHASH_ALL: u32 = 0x01;

/// Serialised signing view of `transaction` for `input_index`, hash type included
pub fn signing_preimage(
    transaction: &RawTransaction,
    input_index: usize,
    script_for_input: &[u8],
    hash_type: u32,
) -> AppResult<Vec<u8>> {
    if input_index >= transaction.inputs.len() {
        return Err(AppError::InvalidData(format!(
            "Input {} out of range ({} inputs)",
            input_index,
            transaction.inputs.len()
        )));
    }

    let mut view = transaction.with_stripped_input_scripts();
    view.inputs[input_index].script = script_for_input.to_vec();

    let mut preimage = view.encode();
    preimage.extend_from_slice(&hash_type.to_le_bytes());
    Ok(preimage)
}

pub fn compute_sighash(
    transaction: &RawTransaction,
    input_index: usize,
    script_for_input: &[u8],
    hash_type: u32,
) -> AppResult<[u8; 32]> {
    let preimage = signing_preimage(transaction, input_index, script_for_input, hash_type)?;
    Ok(sha256d::Hash::hash(&preimage).to_byte_array())
}
