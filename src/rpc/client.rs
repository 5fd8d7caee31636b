use crate::config::BitcoinRpcConfig;
use crate::errors::{AppError, AppResult, RpcError, RpcResult};
use crate::rpc::ledger::{
    LedgerNode, Outpoint, OutpointDetails, Payment, PaymentCategory, RemoteSigner,
};
use crate::rpc::{execute_with_timeout, RetryPolicy, TransactionCache};
use crate::transaction::{RawTransaction, Txid};
use crate::utils::currency::{btc_to_sats, sats_to_btc, signed_btc_to_sats};
use async_trait::async_trait;
use corepc_client::client_sync::{v28::Client, Auth};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::{debug, info};

/// Requests handled by the RPC worker task
#[derive(Debug)]
pub enum RpcRequest {
    Call {
        method: String,
        params: Vec<Value>,
        tx: oneshot::Sender<RpcResult<Value>>,
    },
    TestConnection {
        tx: oneshot::Sender<RpcResult<()>>,
    },
}

/// Bitcoin Core client: async front end over a blocking JSON-RPC client
///
/// Every call is funnelled through a worker task that bounds concurrency and
/// retries transient failures with exponential backoff.
pub struct BitcoinRpcClient {
    request_tx: mpsc::Sender<RpcRequest>,
    error_count: Arc<AtomicU64>,
    cache: TransactionCache,
    concurrent_requests: usize,
}

impl BitcoinRpcClient {
    /// Connect, verify the node answers, and spawn the worker
    pub async fn new(config: BitcoinRpcConfig) -> RpcResult<Self> {
        let (request_tx, request_rx) = mpsc::channel(100);
        let error_count = Arc::new(AtomicU64::new(0));

        let client = Self::create_sync_client(&config)?;
        tokio::task::spawn_blocking({
            let client = Arc::clone(&client);
            move || -> RpcResult<()> {
                client.get_blockchain_info().map_err(|e| {
                    RpcError::ConnectionFailed(format!(
                        "Failed to connect to Bitcoin RPC - check URL, credentials, and that Bitcoin Core is running: {}",
                        e
                    ))
                })?;
                Ok(())
            }
        })
        .await
        .map_err(|e| RpcError::ConnectionFailed(format!("Connection test task failed: {}", e)))??;

        info!("Bitcoin RPC connection established successfully");

        let concurrent_requests = config.concurrent_requests;
        let worker = RpcWorker::new(config, client, Arc::clone(&error_count));
        tokio::spawn(worker.run(request_rx));

        Ok(Self {
            request_tx,
            error_count,
            cache: TransactionCache::new(),
            concurrent_requests,
        })
    }

    /// Raw JSON-RPC call through the worker
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> RpcResult<T> {
        let (tx, rx) = oneshot::channel();

        self.request_tx
            .send(RpcRequest::Call {
                method: method.to_string(),
                params,
                tx,
            })
            .await
            .map_err(|_| RpcError::ConnectionFailed("Failed to send RPC request".to_string()))?;

        let value = rx
            .await
            .map_err(|_| RpcError::ConnectionFailed("RPC worker channel closed".to_string()))??;

        serde_json::from_value(value).map_err(|e| {
            RpcError::DeserialisationFailed(format!("{} response: {}", method, e))
        })
    }

    pub async fn test_connection(&self) -> RpcResult<()> {
        let (tx, rx) = oneshot::channel();

        self.request_tx
            .send(RpcRequest::TestConnection { tx })
            .await
            .map_err(|_| RpcError::ConnectionFailed("Failed to send RPC request".to_string()))?;

        rx.await
            .map_err(|_| RpcError::ConnectionFailed("RPC worker channel closed".to_string()))?
    }

    pub fn get_error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn get_cache_stats(&self) -> crate::rpc::CacheStats {
        self.cache.get_stats()
    }

    pub fn get_concurrent_limit(&self) -> usize {
        self.concurrent_requests
    }

    fn create_sync_client(config: &BitcoinRpcConfig) -> RpcResult<Arc<Client>> {
        let auth = Auth::UserPass(config.username.clone(), config.password.clone());
        let client = Client::new_with_auth(&config.url, auth).map_err(|e| {
            RpcError::ConnectionFailed(format!("Failed to create Bitcoin RPC client: {}", e))
        })?;

        Ok(Arc::new(client))
    }
}

/// `listunspent` row
#[derive(Debug, Deserialize)]
struct UnspentEntry {
    txid: String,
    vout: u32,
    #[serde(default)]
    address: Option<String>,
    amount: f64,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: String,
}

/// `listtransactions` row
#[derive(Debug, Deserialize)]
struct TransactionEntry {
    txid: String,
    #[serde(default)]
    address: Option<String>,
    category: PaymentCategory,
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct SignedHex {
    hex: String,
    #[serde(default)]
    complete: bool,
}

fn parse_txid(txid: &str) -> RpcResult<Txid> {
    Txid::from_str(txid).map_err(|_| RpcError::InvalidTxid {
        txid: txid.to_string(),
    })
}

/// `prevtxs` argument of `signrawtransactionwithwallet`
fn prevtxs_param(sig_hash_data: &[OutpointDetails]) -> Value {
    let entries: Vec<Value> = sig_hash_data
        .iter()
        .map(|details| {
            let mut entry = json!({
                "txid": details.txid.to_string(),
                "vout": details.output_index,
                "scriptPubKey": hex::encode(&details.script_pub_key),
                "amount": sats_to_btc(details.amount),
            });
            if let Some(redeem_script) = &details.redeem_script {
                entry["redeemScript"] = json!(hex::encode(redeem_script));
            }
            entry
        })
        .collect();
    Value::Array(entries)
}

fn sign_params(transaction: &RawTransaction, sig_hash_data: &[OutpointDetails]) -> Vec<Value> {
    vec![
        json!(transaction.to_hex()),
        prevtxs_param(sig_hash_data),
        json!("ALL"),
    ]
}

#[derive(Debug, Deserialize)]
struct MultisigEntry {
    address: String,
}

#[async_trait]
impl LedgerNode for BitcoinRpcClient {
    async fn list_unspent(
        &self,
        min_confirmations: u32,
        max_confirmations: u32,
        addresses: &[String],
    ) -> AppResult<Vec<Outpoint>> {
        let entries: Vec<UnspentEntry> = self
            .call(
                "listunspent",
                vec![json!(min_confirmations), json!(max_confirmations), json!(addresses)],
            )
            .await?;

        let mut outpoints = Vec::with_capacity(entries.len());
        for entry in entries {
            // Bare multisig and other addressless outputs are never ours to spend
            let Some(address) = entry.address else {
                continue;
            };
            outpoints.push(Outpoint {
                txid: parse_txid(&entry.txid)?,
                output_index: entry.vout,
                amount: btc_to_sats(entry.amount)?,
                script_pub_key: hex::decode(&entry.script_pub_key)?,
                address,
            });
        }
        Ok(outpoints)
    }

    async fn get_raw_transaction(&self, txid: &Txid) -> AppResult<RawTransaction> {
        if let Some(cached) = self.cache.get(txid) {
            return Ok(cached);
        }

        let tx_hex: String = self
            .call("getrawtransaction", vec![json!(txid.to_string())])
            .await?;
        let transaction = RawTransaction::from_hex(&tx_hex)?;
        self.cache.put(*txid, transaction.clone());
        Ok(transaction)
    }

    /// Accounts are wallet labels on current Bitcoin Core
    async fn get_addresses_by_account(&self, account: &str) -> AppResult<Vec<String>> {
        let result: RpcResult<HashMap<String, Value>> =
            self.call("getaddressesbylabel", vec![json!(account)]).await;
        match result {
            Ok(addresses) => Ok(addresses.into_keys().collect()),
            Err(e) if e.to_string().contains("No addresses with label") => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_accounts(&self) -> AppResult<Vec<String>> {
        Ok(self.call("listlabels", vec![]).await?)
    }

    async fn import_address(&self, address: &str, label: &str, rescan: bool) -> AppResult<()> {
        let _: Value = self
            .call(
                "importaddress",
                vec![json!(address), json!(label), json!(rescan)],
            )
            .await?;
        debug!("Imported watch-only address {}", address);
        Ok(())
    }

    async fn add_multisig_address(
        &self,
        threshold: usize,
        public_keys: &[String],
        label: &str,
    ) -> AppResult<String> {
        let entry: MultisigEntry = self
            .call(
                "addmultisigaddress",
                vec![json!(threshold), json!(public_keys), json!(label), json!("legacy")],
            )
            .await?;
        debug!("Node wallet holds redeem script for {}", entry.address);
        Ok(entry.address)
    }

    async fn send_raw_transaction(&self, transaction: &RawTransaction) -> AppResult<Txid> {
        let txid: String = self
            .call("sendrawtransaction", vec![json!(transaction.to_hex())])
            .await?;
        info!("Broadcast transaction {}", txid);
        Ok(parse_txid(&txid)?)
    }

    async fn list_transactions(&self, count: usize, skip: usize) -> AppResult<Vec<Payment>> {
        let entries: Vec<TransactionEntry> = self
            .call(
                "listtransactions",
                vec![json!("*"), json!(count), json!(skip), json!(true)],
            )
            .await?;

        entries
            .into_iter()
            .map(|entry| {
                Ok(Payment {
                    txid: parse_txid(&entry.txid)?,
                    address: entry.address,
                    category: entry.category,
                    amount: signed_btc_to_sats(entry.amount)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl RemoteSigner for BitcoinRpcClient {
    async fn sign_raw_transaction(
        &self,
        transaction: &RawTransaction,
        sig_hash_data: &[OutpointDetails],
    ) -> AppResult<RawTransaction> {
        let signed: SignedHex = self
            .call(
                "signrawtransactionwithwallet",
                sign_params(transaction, sig_hash_data),
            )
            .await?;
        debug!("Node wallet signing complete: {}", signed.complete);
        RawTransaction::from_hex(&signed.hex).map_err(AppError::from)
    }
}

/// Worker that owns the blocking client
#[derive(Clone)]
struct RpcWorker {
    client: Arc<Client>,
    config: BitcoinRpcConfig,
    policy: RetryPolicy,
    semaphore: Arc<Semaphore>,
    error_count: Arc<AtomicU64>,
}

impl RpcWorker {
    fn new(config: BitcoinRpcConfig, client: Arc<Client>, error_count: Arc<AtomicU64>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.concurrent_requests.max(1)));
        Self {
            client,
            policy: RetryPolicy::from_config(&config),
            config,
            semaphore,
            error_count,
        }
    }

    async fn run(self, mut request_rx: mpsc::Receiver<RpcRequest>) {
        info!(
            "RPC worker started with {} concurrent request limit",
            self.config.concurrent_requests
        );

        while let Some(request) = request_rx.recv().await {
            let worker = self.clone();
            tokio::spawn(async move {
                worker.handle_request(request).await;
            });
        }

        info!("RPC worker shutting down");
    }

    async fn handle_request(&self, request: RpcRequest) {
        match request {
            RpcRequest::Call { method, params, tx } => {
                let result = self.call_with_retry(&method, params).await;
                let _ = tx.send(result);
            }
            RpcRequest::TestConnection { tx } => {
                let result = self.test_connection_impl().await;
                let _ = tx.send(result);
            }
        }
    }

    async fn call_with_retry(&self, method: &str, params: Vec<Value>) -> RpcResult<Value> {
        let _permit = self.semaphore.acquire().await.map_err(|e| {
            RpcError::ConnectionFailed(format!("Failed to acquire semaphore: {}", e))
        })?;

        let error_count = Arc::clone(&self.error_count);
        self.policy
            .run(
                method,
                || {
                    let client = Arc::clone(&self.client);
                    let method = method.to_string();
                    let params = params.clone();
                    move || -> RpcResult<Value> {
                        client
                            .call::<Value>(&method, &params)
                            .map_err(|e| RpcError::CallFailed {
                                method,
                                message: e.to_string(),
                            })
                    }
                },
                || {
                    error_count.fetch_add(1, Ordering::Relaxed);
                },
            )
            .await
    }

    async fn test_connection_impl(&self) -> RpcResult<()> {
        let client = Arc::clone(&self.client);

        match execute_with_timeout(self.config.timeout_seconds, move || -> RpcResult<()> {
            let info = client
                .get_blockchain_info()
                .map_err(|e| RpcError::CallFailed {
                    method: "get_blockchain_info".to_string(),
                    message: e.to_string(),
                })?;
            debug!(
                "Bitcoin Core connection test successful - chain: {}, blocks: {}",
                info.chain, info.blocks
            );
            Ok(())
        })
        .await
        {
            Ok(result) => result.map_err(|e| RpcError::CallFailed {
                method: "spawn_blocking".to_string(),
                message: format!("Connection test task failed: {}", e),
            })?,
            Err(_) => Err(RpcError::Timeout {
                timeout_seconds: self.config.timeout_seconds,
                operation: "connection_test".to_string(),
            }),
        }
    }
}
