//! Custodial M-of-N Bitcoin cosigner
//!
//! Deterministic per-user keys, P2SH threshold addresses, a field-exact raw
//! transaction codec, coin selection, legacy sighash signing, and collection
//! of partial signatures across a cluster of signer nodes.

pub mod address;
pub mod builder;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod database;
pub mod errors;
pub mod history;
pub mod keys;
pub mod multisig;
pub mod rpc;
pub mod signing;
pub mod transaction;
pub mod utils;
pub mod wallet;
