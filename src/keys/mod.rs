//! Deterministic key derivation and address ownership

pub mod derivation;
pub mod index;
pub mod labels;

pub use derivation::{
    derive, find_unused_address, probe_rounds, resolve_owner, DerivedKey, KeyDeriver,
};
pub use index::{AddressIndex, IndexEntry};
pub use labels::{encode_user_key, parse_pubkey_label, pubkey_label, PUBKEY_LABEL_PREFIX};
