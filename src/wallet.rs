//! `CosignerWallet`: the address lifecycle and transaction operations in one place
//!
//! Wires the derivation, registry, builder, signer and history components
//! against one ledger node. Everything here is a thin orchestration layer;
//! the rules live in the components.

use crate::builder::{BuilderSettings, Recipient, TransactionBuilder};
use crate::config::WalletConfig;
use crate::database::SharedDatabase;
use crate::errors::{AppError, AppResult};
use crate::history::{HistoryReconstructor, TransactionDetails};
use crate::keys::{encode_user_key, pubkey_label, AddressIndex, KeyDeriver};
use crate::multisig::{
    rediscover, RedeemScriptRegistry, RediscoveryReport, RediscoverySweep, ThresholdPolicy,
};
use crate::rpc::{LedgerNode, RemoteSigner};
use crate::signing::{signing_state, Secp256k1Signer, SigningState, TransactionSigner};
use crate::transaction::{RawTransaction, Txid};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct CosignerWallet {
    ledger: Arc<dyn LedgerNode>,
    deriver: KeyDeriver,
    registry: RedeemScriptRegistry,
    policy: ThresholdPolicy,
    builder: TransactionBuilder,
    signer: Arc<TransactionSigner>,
    history: HistoryReconstructor,
    settings: BuilderSettings,
}

impl CosignerWallet {
    /// Assemble the wallet; with a store the registry and address index are durable
    pub fn new(
        signer_id: &str,
        config: &WalletConfig,
        ledger: Arc<dyn LedgerNode>,
        remote: Option<Arc<dyn RemoteSigner>>,
        store: Option<SharedDatabase>,
    ) -> AppResult<Self> {
        let network = config
            .network()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let (index, registry) = match store {
            Some(store) => (
                AddressIndex::with_store(store.clone())?,
                RedeemScriptRegistry::with_store(network, store)?,
            ),
            None => (AddressIndex::new(), RedeemScriptRegistry::new(network)),
        };

        let deriver = KeyDeriver::from_config(config, index)?;
        let policy = ThresholdPolicy::from_config(config)?;
        let settings = BuilderSettings::from(config);
        let builder = TransactionBuilder::new(ledger.clone(), registry.clone(), settings);
        let signer = Arc::new(TransactionSigner::new(
            signer_id,
            deriver.clone(),
            registry.clone(),
            policy.clone(),
            ledger.clone(),
            remote,
            Arc::new(Secp256k1Signer),
            settings,
        ));
        let history = HistoryReconstructor::new(ledger.clone(), network);

        Ok(Self {
            ledger,
            deriver,
            registry,
            policy,
            builder,
            signer,
            history,
            settings,
        })
    }

    pub fn ledger(&self) -> Arc<dyn LedgerNode> {
        self.ledger.clone()
    }

    pub fn registry(&self) -> &RedeemScriptRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    pub fn deriver(&self) -> &KeyDeriver {
        &self.deriver
    }

    pub fn builder(&self) -> TransactionBuilder {
        self.builder.clone()
    }

    pub fn signer(&self) -> Arc<TransactionSigner> {
        self.signer.clone()
    }

    /// Fresh single-key address for `user_id`, starting the probe at round `1 + skip`
    ///
    /// The address is imported watch-only under `PK-<public key>` so the
    /// rediscovery sweep can rebuild its threshold address later.
    pub async fn create_address(&self, user_id: &str, skip: u32) -> AppResult<String> {
        let start_round = skip.saturating_add(1);
        let user_tag = encode_user_key(user_id);
        let starting_key = self.deriver.derive(user_id, start_round);

        let mut known: HashSet<String> = self
            .ledger
            .get_addresses_by_account(&pubkey_label(&starting_key.public_key_hex()))
            .await?
            .into_iter()
            .collect();
        known.extend(self.deriver.index().addresses_for(&user_tag));

        let key = self
            .deriver
            .find_unused_address(user_id, &known, start_round)?;
        self.ledger
            .import_address(&key.address, &pubkey_label(&key.public_key_hex()), true)
            .await?;
        self.deriver.record_issued(user_id, &key)?;

        info!("Created address {} at round {}", key.address, key.round);
        Ok(key.address)
    }

    /// Threshold address over `addresses` plus the fixed cosigners
    ///
    /// Addresses belonging to the user are replaced by their public keys. The
    /// result is registered, imported under the hashed user label, loaded into
    /// the node wallet with its redeem script, and indexed against the user's
    /// key round.
    pub async fn get_multisig_address(
        &self,
        addresses: &[String],
        user_id: &str,
    ) -> AppResult<String> {
        let entry = self.registry.build_threshold_address(
            addresses,
            &self.policy,
            &self.deriver,
            Some(user_id),
        )?;

        let user_tag = encode_user_key(user_id);
        self.ledger
            .import_address(&entry.address, &user_tag, true)
            .await?;

        // Best effort; signing requests carry the redeem script as well
        let public_keys: Vec<String> = entry.ordered_public_keys.iter().map(hex::encode).collect();
        if let Err(e) = self
            .ledger
            .add_multisig_address(entry.threshold, &public_keys, &user_tag)
            .await
        {
            warn!("Node wallet did not load redeem script for {}: {}", entry.address, e);
        }

        if let Some(owner) = addresses
            .iter()
            .find_map(|candidate| self.deriver.resolve_owner(user_id, candidate))
        {
            self.deriver
                .index()
                .record(&entry.address, &user_tag, owner.round)?;
        }

        info!(
            "Threshold address {} ({} of {})",
            entry.address,
            entry.threshold,
            entry.ordered_public_keys.len()
        );
        Ok(entry.address)
    }

    pub async fn get_addresses(&self, user_id: &str) -> AppResult<Vec<String>> {
        self.ledger
            .get_addresses_by_account(&encode_user_key(user_id))
            .await
    }

    /// Watch a foreign address, no label
    pub async fn register_address(&self, address: &str) -> AppResult<()> {
        self.ledger.import_address(address, "", true).await
    }

    /// Unspent satoshis at `address` within the confirmation window
    pub async fn get_balance(&self, address: &str) -> AppResult<u64> {
        let outpoints = self
            .ledger
            .list_unspent(
                self.settings.min_confirmations,
                self.settings.max_confirmations,
                &[address.to_string()],
            )
            .await?;
        Ok(outpoints.iter().map(|o| o.amount).sum())
    }

    pub async fn create_transaction(
        &self,
        from_addresses: &[String],
        recipients: &[Recipient],
    ) -> AppResult<RawTransaction> {
        self.builder.build(from_addresses, recipients).await
    }

    pub async fn sign_transaction(
        &self,
        transaction: &RawTransaction,
        address: &str,
        user_id: Option<&str>,
    ) -> AppResult<RawTransaction> {
        self.signer
            .sign_for_address(transaction, address, user_id)
            .await
    }

    pub async fn send_transaction(&self, transaction: &RawTransaction) -> AppResult<Txid> {
        let txid = self.ledger.send_raw_transaction(transaction).await?;
        debug!("Ledger accepted {}", txid);
        Ok(txid)
    }

    pub async fn get_transactions(
        &self,
        address: &str,
        count: usize,
        skip: usize,
    ) -> AppResult<Vec<TransactionDetails>> {
        self.history.get_transactions(address, count, skip).await
    }

    pub fn signing_state(&self, transaction: &RawTransaction) -> SigningState {
        signing_state(transaction, self.policy.threshold)
    }

    /// Single rediscovery pass, outside the periodic sweep
    pub async fn rediscover(&self) -> AppResult<RediscoveryReport> {
        rediscover(&self.registry, self.ledger.as_ref(), &self.policy).await
    }

    pub fn rediscovery_sweep(&self, interval_secs: u64) -> RediscoverySweep {
        RediscoverySweep::new(
            self.registry.clone(),
            self.ledger.clone(),
            self.policy.clone(),
            interval_secs,
        )
    }
}
