//! Account labels used when importing watch-only addresses into the ledger node

use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Prefix of the label attached to every per-user address import
pub const PUBKEY_LABEL_PREFIX: &str = "PK-";

lazy_static! {
    static ref PUBKEY_LABEL: Regex = Regex::new(r"^PK-(.+)$").unwrap();
}

/// Storage tag for a user identifier: hex SHA-256 of its bytes
///
/// Threshold addresses are imported under this tag so the ledger never sees
/// raw user identifiers.
pub fn encode_user_key(user_id: &str) -> String {
    hex::encode(Sha256::digest(user_id.as_bytes()))
}

/// `PK-<hex public key>`
pub fn pubkey_label(public_key_hex: &str) -> String {
    format!("{}{}", PUBKEY_LABEL_PREFIX, public_key_hex)
}

/// Public key hex carried by a `PK-` label, if the label is one
pub fn parse_pubkey_label(label: &str) -> Option<&str> {
    PUBKEY_LABEL
        .captures(label)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
