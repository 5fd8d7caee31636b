//! Script construction and inspection for the templates the cosigner uses
//!
//! - pay-to-pubkey-hash: `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`
//! - pay-to-script-hash: `OP_HASH160 <20> OP_EQUAL`
//! - multisig redeem script: `OP_m <pubkey>... OP_n OP_CHECKMULTISIG`

use super::error::{CodecError, CodecResult};
use crate::address::{self, AddressKind};
use crate::errors::{AppError, AppResult};
use bitcoin::Network;
use serde::{Deserialize, Serialize};

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKMULTISIG: u8 = 0xae;

/// Largest N a standard multisig redeem script can encode with small-int opcodes
pub const MAX_MULTISIG_KEYS: usize = 16;

/// Output script classes, named the way the ledger node reports them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptPubKeyType {
    PubKey,
    PubKeyHash,
    ScriptHash,
    MultiSig,
    NullData,
    NonStandard,
}

/// One parsed script element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptElement {
    Op(u8),
    Push(Vec<u8>),
}

/// Append a minimal data push for `data`
pub fn push_data(out: &mut Vec<u8>, data: &[u8]) {
    let len = data.len();
    if len < OP_PUSHDATA1 as usize {
        out.push(len as u8);
    } else if len <= 0xff {
        out.push(OP_PUSHDATA1);
        out.push(len as u8);
    } else if len <= 0xffff {
        out.push(OP_PUSHDATA2);
        out.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        out.push(OP_PUSHDATA4);
        out.extend_from_slice(&(len as u32).to_le_bytes());
    }
    out.extend_from_slice(data);
}

/// Split a script into opcodes and pushes
pub fn parse_script(script: &[u8]) -> CodecResult<Vec<ScriptElement>> {
    let mut elements = Vec::new();
    let mut pos = 0;

    while pos < script.len() {
        let opcode = script[pos];
        let start = pos;
        pos += 1;

        let len = match opcode {
            0x01..=0x4b => opcode as usize,
            OP_PUSHDATA1 => {
                let bytes = script
                    .get(pos..pos + 1)
                    .ok_or(CodecError::TruncatedPush { offset: start })?;
                pos += 1;
                bytes[0] as usize
            }
            OP_PUSHDATA2 => {
                let bytes = script
                    .get(pos..pos + 2)
                    .ok_or(CodecError::TruncatedPush { offset: start })?;
                pos += 2;
                u16::from_le_bytes([bytes[0], bytes[1]]) as usize
            }
            OP_PUSHDATA4 => {
                let bytes = script
                    .get(pos..pos + 4)
                    .ok_or(CodecError::TruncatedPush { offset: start })?;
                pos += 4;
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
            }
            _ => {
                elements.push(ScriptElement::Op(opcode));
                continue;
            }
        };

        let data = script
            .get(pos..pos.saturating_add(len))
            .ok_or(CodecError::TruncatedPush { offset: start })?;
        elements.push(ScriptElement::Push(data.to_vec()));
        pos += len;
    }

    Ok(elements)
}

pub fn p2pkh_script(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[OP_DUP, OP_HASH160]);
    push_data(&mut script, pubkey_hash);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

pub fn p2sh_script(script_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(23);
    script.push(OP_HASH160);
    push_data(&mut script, script_hash);
    script.push(OP_EQUAL);
    script
}

/// Output script paying to `address`
pub fn script_for_address(address: &str, network: Network) -> AppResult<Vec<u8>> {
    let decoded = address::decode(address, network)?;
    Ok(match decoded.kind {
        AddressKind::PubKeyHash => p2pkh_script(&decoded.hash),
        AddressKind::ScriptHash => p2sh_script(&decoded.hash),
    })
}

fn small_int_opcode(n: usize) -> Option<u8> {
    (1..=MAX_MULTISIG_KEYS)
        .contains(&n)
        .then(|| OP_1 + (n as u8 - 1))
}

fn small_int_value(opcode: u8) -> Option<usize> {
    (OP_1..=OP_16)
        .contains(&opcode)
        .then(|| (opcode - OP_1) as usize + 1)
}

/// `OP_m <pubkey>... OP_n OP_CHECKMULTISIG`, keys kept in the given order
pub fn multisig_redeem_script(threshold: usize, public_keys: &[Vec<u8>]) -> AppResult<Vec<u8>> {
    let m = small_int_opcode(threshold).ok_or_else(|| {
        AppError::InvalidData(format!("Threshold {} outside 1..=16", threshold))
    })?;
    let n = small_int_opcode(public_keys.len()).ok_or_else(|| {
        AppError::InvalidData(format!(
            "{} public keys outside 1..=16",
            public_keys.len()
        ))
    })?;
    if threshold > public_keys.len() {
        return Err(AppError::InvalidData(format!(
            "Threshold {} exceeds {} public keys",
            threshold,
            public_keys.len()
        )));
    }

    let mut script = vec![m];
    for key in public_keys {
        push_data(&mut script, key);
    }
    script.push(n);
    script.push(OP_CHECKMULTISIG);
    Ok(script)
}

/// Threshold and ordered keys of a multisig redeem script
pub fn parse_multisig_redeem_script(script: &[u8]) -> Option<(usize, Vec<Vec<u8>>)> {
    let elements = parse_script(script).ok()?;
    let (first, rest) = elements.split_first()?;
    let (last, rest) = rest.split_last()?;
    let (count, keys) = rest.split_last()?;

    let threshold = match first {
        ScriptElement::Op(op) => small_int_value(*op)?,
        _ => return None,
    };
    if *last != ScriptElement::Op(OP_CHECKMULTISIG) {
        return None;
    }
    let n = match count {
        ScriptElement::Op(op) => small_int_value(*op)?,
        _ => return None,
    };

    let keys = keys
        .iter()
        .map(|element| match element {
            ScriptElement::Push(key) => Some(key.clone()),
            ScriptElement::Op(_) => None,
        })
        .collect::<Option<Vec<_>>>()?;

    (keys.len() == n && threshold <= n).then_some((threshold, keys))
}

pub fn classify_output_script(script: &[u8]) -> ScriptPubKeyType {
    match script {
        [OP_DUP, OP_HASH160, 0x14, .., OP_EQUALVERIFY, OP_CHECKSIG] if script.len() == 25 => {
            ScriptPubKeyType::PubKeyHash
        }
        [OP_HASH160, 0x14, .., OP_EQUAL] if script.len() == 23 => ScriptPubKeyType::ScriptHash,
        [0x21, .., OP_CHECKSIG] if script.len() == 35 => ScriptPubKeyType::PubKey,
        [0x41, .., OP_CHECKSIG] if script.len() == 67 => ScriptPubKeyType::PubKey,
        [0x6a, ..] => ScriptPubKeyType::NullData,
        _ if parse_multisig_redeem_script(script).is_some() => ScriptPubKeyType::MultiSig,
        _ => ScriptPubKeyType::NonStandard,
    }
}

/// Destination address of an output script or multisig redeem script
///
/// Pay-to-pubkey outputs resolve to the key's pay-to-pubkey-hash address and
/// bare multisig scripts to the script-hash address wrapping them.
pub fn decode_redeem_script_address(script: &[u8], network: Network) -> AppResult<String> {
    match classify_output_script(script) {
        ScriptPubKeyType::PubKeyHash => {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&script[3..23]);
            Ok(address::encode(AddressKind::PubKeyHash, &hash, network))
        }
        ScriptPubKeyType::ScriptHash => {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&script[2..22]);
            Ok(address::encode(AddressKind::ScriptHash, &hash, network))
        }
        ScriptPubKeyType::PubKey => {
            let key = &script[1..script.len() - 1];
            Ok(address::p2pkh_address(key, network))
        }
        ScriptPubKeyType::MultiSig => Ok(address::p2sh_address(script, network)),
        other => Err(AppError::AddressDecode(format!(
            "No address for {:?} script {}",
            other,
            hex::encode(script)
        ))),
    }
}
