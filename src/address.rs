//! Versioned, checksummed (Base58Check) legacy addresses
//!
//! Only the two address classes the cosigner produces are understood:
//! pay-to-pubkey-hash for single-key accounts and pay-to-script-hash for
//! threshold addresses.

use crate::errors::{AppError, AppResult};
use bitcoin::base58;
use bitcoin::hashes::{hash160, Hash};
use bitcoin::Network;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressKind {
    PubKeyHash,
    ScriptHash,
}

/// Address payload after version and checksum validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedAddress {
    pub kind: AddressKind,
    pub hash: [u8; 20],
}

/// (pubkey-hash, script-hash) version bytes
fn version_bytes(network: Network) -> (u8, u8) {
    match network {
        Network::Bitcoin => (0x00, 0x05),
        _ => (0x6f, 0xc4),
    }
}

pub fn hash160(data: &[u8]) -> [u8; 20] {
    hash160::Hash::hash(data).to_byte_array()
}

pub fn encode(kind: AddressKind, hash: &[u8; 20], network: Network) -> String {
    let (pkh, sh) = version_bytes(network);
    let version = match kind {
        AddressKind::PubKeyHash => pkh,
        AddressKind::ScriptHash => sh,
    };
    let mut payload = Vec::with_capacity(21);
    payload.push(version);
    payload.extend_from_slice(hash);
    base58::encode_check(&payload)
}

pub fn decode(address: &str, network: Network) -> AppResult<DecodedAddress> {
    let payload = base58::decode_check(address)
        .map_err(|e| AppError::AddressDecode(format!("{}: {}", address, e)))?;
    if payload.len() != 21 {
        return Err(AppError::AddressDecode(format!(
            "{}: payload is {} bytes, expected 21",
            address,
            payload.len()
        )));
    }

    let (pkh, sh) = version_bytes(network);
    let kind = match payload[0] {
        v if v == pkh => AddressKind::PubKeyHash,
        v if v == sh => AddressKind::ScriptHash,
        v => {
            return Err(AppError::AddressDecode(format!(
                "{}: version byte {:#04x} is not valid on {}",
                address, v, network
            )))
        }
    };

    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload[1..]);
    Ok(DecodedAddress { kind, hash })
}

/// Pay-to-pubkey-hash address for a serialised public key
pub fn p2pkh_address(public_key: &[u8], network: Network) -> String {
    encode(AddressKind::PubKeyHash, &hash160(public_key), network)
}

/// Pay-to-script-hash address for a redeem script
pub fn p2sh_address(redeem_script: &[u8], network: Network) -> String {
    encode(AddressKind::ScriptHash, &hash160(redeem_script), network)
}

/// True when the address decodes as a script-hash address
pub fn is_script_hash_address(address: &str, network: Network) -> bool {
    matches!(
        decode(address, network),
        Ok(DecodedAddress {
            kind: AddressKind::ScriptHash,
            ..
        })
    )
}
