//! Common Test Utilities
//!
//! In-memory ledger node, scripted cluster transport and key fixtures shared
//! by the integration tests. Nothing here needs a running Bitcoin Core.

#![allow(dead_code)]

use async_trait::async_trait;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use bitcoin::Network;
use cosigner::cluster::{ClusterTransport, SignCommand, SignResponse, TransportError};
use cosigner::config::{ClusterNodeConfig, WalletConfig};
use cosigner::errors::{AppError, AppResult, RpcError};
use cosigner::multisig::compute_threshold_address;
use cosigner::rpc::{LedgerNode, Outpoint, OutpointDetails, Payment, RemoteSigner};
use cosigner::signing::{
    apply_signature, sign_input, threshold_signatures, Secp256k1Signer, SpendingCondition,
};
use cosigner::transaction::{
    parse_multisig_redeem_script, script_for_address, RawInput, RawOutput, RawTransaction, Txid,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NETWORK: Network = Network::Regtest;
pub const SERVER_SECRET: &str = "integration-server-secret";

/// A cosigner key held outside the derivation scheme (a node wallet key)
#[derive(Clone)]
pub struct KeyHolder {
    pub secret: SecretKey,
    pub public_key: Vec<u8>,
}

impl KeyHolder {
    pub fn new(seed: u8) -> Self {
        let secret = SecretKey::from_slice(&[seed; 32]).unwrap();
        let public_key = PublicKey::from_secret_key(&Secp256k1::new(), &secret)
            .serialize()
            .to_vec();
        Self { secret, public_key }
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(&self.public_key)
    }

    /// Add this key's signature to every partially signed threshold input it is a party to
    pub fn sign_all(
        &self,
        transaction: &RawTransaction,
        signer_id: &str,
    ) -> AppResult<RawTransaction> {
        let mut signed = transaction.clone();
        for (index, input) in transaction.inputs.iter().enumerate() {
            let Some((_, redeem_script)) = threshold_signatures(&input.script) else {
                continue;
            };
            let Some((_, keys)) = parse_multisig_redeem_script(&redeem_script) else {
                continue;
            };
            if !keys.contains(&self.public_key) {
                continue;
            }

            let condition = SpendingCondition::Threshold { redeem_script };
            let signature = sign_input(
                &Secp256k1Signer,
                signer_id,
                transaction,
                index,
                &self.secret,
                &condition,
            )?;
            apply_signature(&mut signed, &signature, &condition)?;
        }
        Ok(signed)
    }
}

impl KeyHolder {
    /// Sign the way a node wallet does: only inputs whose previous output came
    /// with a redeem script naming this key
    pub fn sign_with_prevouts(
        &self,
        transaction: &RawTransaction,
        sig_hash_data: &[OutpointDetails],
        signer_id: &str,
    ) -> AppResult<RawTransaction> {
        let mut signed = transaction.clone();
        for (index, input) in transaction.inputs.iter().enumerate() {
            let Some(redeem_script) = sig_hash_data
                .iter()
                .find(|d| input.spends(&d.txid, d.output_index))
                .and_then(|d| d.redeem_script.clone())
            else {
                continue;
            };
            let Some((_, keys)) = parse_multisig_redeem_script(&redeem_script) else {
                continue;
            };
            if !keys.contains(&self.public_key) {
                continue;
            }

            let condition = SpendingCondition::Threshold { redeem_script };
            let signature = sign_input(
                &Secp256k1Signer,
                signer_id,
                transaction,
                index,
                &self.secret,
                &condition,
            )?;
            apply_signature(&mut signed, &signature, &condition)?;
        }
        Ok(signed)
    }
}

/// Wallet config for a 2-of-N deployment with the given fixed cosigners
pub fn wallet_config(cosigners: &[&KeyHolder]) -> WalletConfig {
    WalletConfig {
        server_private_key: SERVER_SECRET.to_string(),
        max_deterministic_addresses: 20,
        min_signatures: 2,
        multisig_accounts: cosigners.iter().map(|k| k.public_key_hex()).collect(),
        ..WalletConfig::default()
    }
}

pub fn node(id: &str, originator: bool) -> ClusterNodeConfig {
    ClusterNodeConfig {
        id: id.to_string(),
        url: format!("http://{}.cluster.test:8446", id),
        originator,
    }
}

#[derive(Default)]
struct LedgerState {
    unspent: Vec<Outpoint>,
    transactions: HashMap<Txid, RawTransaction>,
    accounts: HashMap<String, Vec<String>>,
    payments: Vec<Payment>,
    broadcasts: Vec<RawTransaction>,
    multisig_imports: Vec<MultisigImport>,
    sign_requests: Vec<Vec<OutpointDetails>>,
    fail_imports: bool,
    funding_counter: u8,
}

/// One `add_multisig_address` call as the node saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigImport {
    pub address: String,
    pub label: String,
    pub redeem_script: Vec<u8>,
}

/// In-memory ledger node; its wallet optionally holds one cosigner key
#[derive(Clone, Default)]
pub struct MockLedger {
    state: Arc<Mutex<LedgerState>>,
    wallet_key: Option<KeyHolder>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wallet_key(key: KeyHolder) -> Self {
        Self {
            state: Arc::default(),
            wallet_key: Some(key),
        }
    }

    pub fn add_transaction(&self, transaction: RawTransaction) -> Txid {
        let txid = transaction.txid();
        self.state.lock().unwrap().transactions.insert(txid, transaction);
        txid
    }

    /// Create a confirmed parent paying `amount` to `address` and list its output as unspent
    pub fn fund(&self, address: &str, amount: u64) -> Outpoint {
        let script_pub_key = script_for_address(address, NETWORK).unwrap();
        let counter = {
            let mut state = self.state.lock().unwrap();
            state.funding_counter += 1;
            state.funding_counter
        };
        let parent = RawTransaction {
            inputs: vec![RawInput::spending(Txid::from_wire_bytes([counter; 32]), 0)],
            outputs: vec![RawOutput {
                amount,
                script: script_pub_key.clone(),
            }],
            ..RawTransaction::default()
        };
        let txid = self.add_transaction(parent);

        let outpoint = Outpoint {
            txid,
            output_index: 0,
            amount,
            script_pub_key,
            address: address.to_string(),
        };
        self.state.lock().unwrap().unspent.push(outpoint.clone());
        outpoint
    }

    pub fn add_account(&self, label: &str, addresses: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .accounts
            .insert(label.to_string(), addresses.iter().map(|a| a.to_string()).collect());
    }

    pub fn add_payment(&self, payment: Payment) {
        self.state.lock().unwrap().payments.push(payment);
    }

    pub fn accounts(&self) -> HashMap<String, Vec<String>> {
        self.state.lock().unwrap().accounts.clone()
    }

    pub fn broadcasts(&self) -> Vec<RawTransaction> {
        self.state.lock().unwrap().broadcasts.clone()
    }

    pub fn multisig_imports(&self) -> Vec<MultisigImport> {
        self.state.lock().unwrap().multisig_imports.clone()
    }

    /// Previous-output data passed with each wallet signing request
    pub fn sign_requests(&self) -> Vec<Vec<OutpointDetails>> {
        self.state.lock().unwrap().sign_requests.clone()
    }

    pub fn fail_imports(&self, fail: bool) {
        self.state.lock().unwrap().fail_imports = fail;
    }
}

#[async_trait]
impl LedgerNode for MockLedger {
    async fn list_unspent(
        &self,
        _min_confirmations: u32,
        _max_confirmations: u32,
        addresses: &[String],
    ) -> AppResult<Vec<Outpoint>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .unspent
            .iter()
            .filter(|o| addresses.is_empty() || addresses.contains(&o.address))
            .cloned()
            .collect())
    }

    async fn get_raw_transaction(&self, txid: &Txid) -> AppResult<RawTransaction> {
        self.state
            .lock()
            .unwrap()
            .transactions
            .get(txid)
            .cloned()
            .ok_or_else(|| {
                AppError::Rpc(RpcError::TransactionNotFound {
                    txid: txid.to_string(),
                })
            })
    }

    async fn get_addresses_by_account(&self, account: &str) -> AppResult<Vec<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .accounts
            .get(account)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_accounts(&self) -> AppResult<Vec<String>> {
        let mut labels: Vec<String> = self.state.lock().unwrap().accounts.keys().cloned().collect();
        labels.sort();
        Ok(labels)
    }

    async fn import_address(&self, address: &str, label: &str, _rescan: bool) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_imports {
            return Err(AppError::Rpc(RpcError::CallFailed {
                method: "importaddress".to_string(),
                message: "wallet is locked".to_string(),
            }));
        }
        state
            .accounts
            .entry(label.to_string())
            .or_default()
            .push(address.to_string());
        Ok(())
    }

    async fn add_multisig_address(
        &self,
        threshold: usize,
        public_keys: &[String],
        label: &str,
    ) -> AppResult<String> {
        let keys = public_keys
            .iter()
            .map(hex::decode)
            .collect::<Result<Vec<_>, _>>()?;
        let entry = compute_threshold_address(keys, threshold, NETWORK)?;
        self.state.lock().unwrap().multisig_imports.push(MultisigImport {
            address: entry.address.clone(),
            label: label.to_string(),
            redeem_script: entry.redeem_script,
        });
        Ok(entry.address)
    }

    async fn send_raw_transaction(&self, transaction: &RawTransaction) -> AppResult<Txid> {
        self.state.lock().unwrap().broadcasts.push(transaction.clone());
        Ok(transaction.txid())
    }

    async fn list_transactions(&self, count: usize, skip: usize) -> AppResult<Vec<Payment>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .payments
            .iter()
            .skip(skip)
            .take(count)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RemoteSigner for MockLedger {
    async fn sign_raw_transaction(
        &self,
        transaction: &RawTransaction,
        sig_hash_data: &[OutpointDetails],
    ) -> AppResult<RawTransaction> {
        self.state
            .lock()
            .unwrap()
            .sign_requests
            .push(sig_hash_data.to_vec());
        match &self.wallet_key {
            Some(key) => key.sign_with_prevouts(transaction, sig_hash_data, "node-wallet"),
            None => Ok(transaction.clone()),
        }
    }
}

/// How a scripted remote node answers
#[derive(Clone)]
pub enum NodeBehaviour {
    Sign(KeyHolder),
    Unchanged,
    Fail,
    Hang,
}

/// Cluster transport answering from a script instead of the network
#[derive(Clone, Default)]
pub struct MockTransport {
    behaviours: Arc<Mutex<HashMap<String, NodeBehaviour>>>,
    calls: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(self, id: &str, behaviour: NodeBehaviour) -> Self {
        self.behaviours.lock().unwrap().insert(id.to_string(), behaviour);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterTransport for MockTransport {
    async fn send_sign_command(
        &self,
        node: &ClusterNodeConfig,
        command: &SignCommand,
    ) -> Result<SignResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behaviour = self.behaviours.lock().unwrap().get(&node.id).cloned();

        let transaction = command.decode_transaction().map_err(|e| TransportError::InvalidResponse {
            node: node.id.clone(),
            message: e.to_string(),
        })?;

        match behaviour {
            Some(NodeBehaviour::Sign(key)) => {
                let signed = key.sign_all(&transaction, &node.id).map_err(|e| {
                    TransportError::InvalidResponse {
                        node: node.id.clone(),
                        message: e.to_string(),
                    }
                })?;
                Ok(SignResponse::new(&node.id, &signed))
            }
            Some(NodeBehaviour::Unchanged) => Ok(SignResponse::new(&node.id, &transaction)),
            Some(NodeBehaviour::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(SignResponse::new(&node.id, &transaction))
            }
            Some(NodeBehaviour::Fail) | None => Err(TransportError::Unreachable {
                node: node.id.clone(),
                message: "connection refused".to_string(),
            }),
        }
    }
}
