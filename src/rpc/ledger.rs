//! Capability interfaces for the ledger node and its wallet signer
//!
//! The signing engine only ever talks to the node through these traits.
//! `BitcoinRpcClient` implements both against Bitcoin Core; tests use an
//! in-memory node.

use crate::errors::AppResult;
use crate::transaction::{RawTransaction, Txid};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Unspent output as reported by the ledger node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outpoint {
    pub txid: Txid,
    pub output_index: u32,
    /// Satoshis
    pub amount: u64,
    #[serde(with = "hex::serde")]
    pub script_pub_key: Vec<u8>,
    pub address: String,
}

/// Previous output handed to an external signer alongside the transaction
///
/// A node wallet that only watches a threshold address has no redeem script
/// for it, so the script travels with the signing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutpointDetails {
    pub txid: Txid,
    pub output_index: u32,
    pub amount: u64,
    #[serde(with = "hex::serde")]
    pub script_pub_key: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeem_script: Option<Vec<u8>>,
}

impl OutpointDetails {
    pub fn new(outpoint: &Outpoint, redeem_script: Option<Vec<u8>>) -> Self {
        Self {
            txid: outpoint.txid,
            output_index: outpoint.output_index,
            amount: outpoint.amount,
            script_pub_key: outpoint.script_pub_key.clone(),
            redeem_script,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentCategory {
    Receive,
    Send,
    #[serde(other)]
    Other,
}

/// One wallet history entry (`listtransactions` row)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub txid: Txid,
    pub address: Option<String>,
    pub category: PaymentCategory,
    /// Satoshis, negative for sends
    pub amount: i64,
}

/// Ledger node collaborator
#[async_trait]
pub trait LedgerNode: Send + Sync {
    /// Unspent outputs within the confirmation window
    ///
    /// An empty address list means every watched address.
    async fn list_unspent(
        &self,
        min_confirmations: u32,
        max_confirmations: u32,
        addresses: &[String],
    ) -> AppResult<Vec<Outpoint>>;

    async fn get_raw_transaction(&self, txid: &Txid) -> AppResult<RawTransaction>;

    async fn get_addresses_by_account(&self, account: &str) -> AppResult<Vec<String>>;

    /// Every account label the node knows about
    async fn list_accounts(&self) -> AppResult<Vec<String>>;

    /// Watch-only import under `label`
    async fn import_address(&self, address: &str, label: &str, rescan: bool) -> AppResult<()>;

    /// Load a threshold script into the node wallet under `label`, returning its address
    async fn add_multisig_address(
        &self,
        threshold: usize,
        public_keys: &[String],
        label: &str,
    ) -> AppResult<String>;

    async fn send_raw_transaction(&self, transaction: &RawTransaction) -> AppResult<Txid>;

    /// Wallet history across all accounts, newest last
    async fn list_transactions(&self, count: usize, skip: usize) -> AppResult<Vec<Payment>>;
}

/// Signer that holds keys outside this process (the node's own wallet)
#[async_trait]
pub trait RemoteSigner: Send + Sync {
    /// Sign whatever inputs the remote side has keys for; unknown inputs are left untouched
    ///
    /// `sig_hash_data` describes the outputs being spent, redeem scripts included.
    async fn sign_raw_transaction(
        &self,
        transaction: &RawTransaction,
        sig_hash_data: &[OutpointDetails],
    ) -> AppResult<RawTransaction>;
}
