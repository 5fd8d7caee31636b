//! Threshold (M-of-N) addresses and the registry of their redeem scripts
//!
//! A pay-to-script-hash address can only be spent by presenting its redeem
//! script, which the address itself does not reveal. The registry is the
//! process-wide map from address to redeem script; with a store attached it
//! writes through to SQLite and warms itself from it at start-up.

use crate::address::{self, AddressKind};
use crate::config::WalletConfig;
use crate::database::{RedeemScriptOperations, SharedDatabase};
use crate::errors::{AppError, AppResult};
use crate::keys::{DerivedKey, KeyDeriver};
use crate::transaction::multisig_redeem_script;
use bitcoin::secp256k1::PublicKey;
use bitcoin::Network;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdAddress {
    pub address: String,
    #[serde(with = "hex::serde")]
    pub redeem_script: Vec<u8>,
    /// Keys in redeem-script order
    pub ordered_public_keys: Vec<Vec<u8>>,
    pub threshold: usize,
}

/// Deployment-wide signing policy: M plus the always-included cosigner keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdPolicy {
    pub threshold: usize,
    pub fixed_cosigners: Vec<Vec<u8>>,
}

impl ThresholdPolicy {
    pub fn new(threshold: usize, fixed_cosigners: Vec<Vec<u8>>) -> Self {
        Self {
            threshold,
            fixed_cosigners,
        }
    }

    /// Decode `multisig_accounts`; blank entries are skipped
    pub fn from_config(wallet: &WalletConfig) -> AppResult<Self> {
        let mut fixed_cosigners = Vec::new();
        for account in wallet.multisig_accounts.iter().map(|a| a.trim()) {
            if account.is_empty() {
                continue;
            }
            fixed_cosigners.push(parse_public_key(account).ok_or_else(|| {
                AppError::Config(format!(
                    "wallet.multisig_accounts entry '{}' is not a public key",
                    account
                ))
            })?);
        }
        Ok(Self::new(wallet.min_signatures as usize, fixed_cosigners))
    }
}

/// Hex SEC1 public key (compressed or uncompressed), validated on the curve
pub fn parse_public_key(candidate: &str) -> Option<Vec<u8>> {
    let bytes = hex::decode(candidate).ok()?;
    PublicKey::from_slice(&bytes).ok()?;
    Some(bytes)
}

/// Redeem script and P2SH address for `public_keys`, in the given order
pub fn compute_threshold_address(
    public_keys: Vec<Vec<u8>>,
    threshold: usize,
    network: Network,
) -> AppResult<ThresholdAddress> {
    let redeem_script = multisig_redeem_script(threshold, &public_keys)?;
    Ok(ThresholdAddress {
        address: address::p2sh_address(&redeem_script, network),
        redeem_script,
        ordered_public_keys: public_keys,
        threshold,
    })
}

#[derive(Clone)]
pub struct RedeemScriptRegistry {
    entries: Arc<Mutex<HashMap<String, ThresholdAddress>>>,
    store: Option<SharedDatabase>,
    network: Network,
}

impl RedeemScriptRegistry {
    /// Volatile registry; entries are lost on restart until rediscovered
    pub fn new(network: Network) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            store: None,
            network,
        }
    }

    /// Write-through registry warmed from the durable store
    pub fn with_store(network: Network, store: SharedDatabase) -> AppResult<Self> {
        let stored = {
            let db = store.lock().unwrap_or_else(PoisonError::into_inner);
            db.load_redeem_scripts()?
        };

        let entries: HashMap<String, ThresholdAddress> = stored
            .into_iter()
            .map(|entry| (entry.address.clone(), entry))
            .collect();
        info!("Redeem script registry warmed with {} entries", entries.len());

        Ok(Self {
            entries: Arc::new(Mutex::new(entries)),
            store: Some(store),
            network,
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Insert unless already present; returns true when the address is new
    pub fn register(&self, entry: ThresholdAddress) -> AppResult<bool> {
        {
            let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            if entries.contains_key(&entry.address) {
                return Ok(false);
            }
        }

        if let Some(store) = &self.store {
            let mut db = store.lock().unwrap_or_else(PoisonError::into_inner);
            db.insert_redeem_script(&entry)?;
        }

        debug!("Registered threshold address {}", entry.address);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.insert(entry.address.clone(), entry).is_none())
    }

    pub fn get(&self, address: &str) -> Option<ThresholdAddress> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
    }

    pub fn redeem_script(&self, address: &str) -> Option<Vec<u8>> {
        self.get(address).map(|entry| entry.redeem_script)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Address class used to pick an output script template
    ///
    /// Registered addresses are threshold addresses by definition; anything
    /// else is classified by its version byte.
    pub fn classify(&self, address: &str) -> AppResult<AddressKind> {
        if self.contains(address) {
            return Ok(AddressKind::ScriptHash);
        }
        Ok(address::decode(address, self.network)?.kind)
    }

    pub fn is_threshold_address(&self, address: &str) -> bool {
        matches!(self.classify(address), Ok(AddressKind::ScriptHash))
    }

    /// Turn participants into public keys
    ///
    /// A participant that is one of the user's derived addresses is replaced
    /// by the derived public key; otherwise it must already be a hex key.
    pub fn resolve_participants(
        &self,
        participants: &[String],
        deriver: &KeyDeriver,
        user_id: Option<&str>,
    ) -> AppResult<Vec<Vec<u8>>> {
        participants
            .iter()
            .map(|participant| {
                if let Some(owner) =
                    user_id.and_then(|user| deriver.resolve_owner(user, participant))
                {
                    return Ok(owner.public_key_bytes().to_vec());
                }
                parse_public_key(participant).ok_or_else(|| {
                    AppError::AddressDecode(format!(
                        "{} is neither a public key nor an address derivable for this user",
                        participant
                    ))
                })
            })
            .collect()
    }

    /// Resolve participants, append the fixed cosigners, build and register
    pub fn build_threshold_address(
        &self,
        participants: &[String],
        policy: &ThresholdPolicy,
        deriver: &KeyDeriver,
        user_id: Option<&str>,
    ) -> AppResult<ThresholdAddress> {
        let mut keys = self.resolve_participants(participants, deriver, user_id)?;
        keys.extend(policy.fixed_cosigners.iter().cloned());

        let entry = compute_threshold_address(keys, policy.threshold, self.network)?;
        self.register(entry.clone())?;
        Ok(entry)
    }

    /// Threshold address for a single derived key plus the fixed cosigners, not registered
    pub fn threshold_address_for_key(
        &self,
        key: &DerivedKey,
        policy: &ThresholdPolicy,
    ) -> AppResult<ThresholdAddress> {
        let mut keys = vec![key.public_key_bytes().to_vec()];
        keys.extend(policy.fixed_cosigners.iter().cloned());
        compute_threshold_address(keys, policy.threshold, self.network)
    }

    /// Rebuild and register the threshold address behind a `PK-` account
    pub fn restore_from_public_key(
        &self,
        public_key: &[u8],
        policy: &ThresholdPolicy,
    ) -> AppResult<bool> {
        if PublicKey::from_slice(public_key).is_err() {
            warn!("Skipping malformed public key {}", hex::encode(public_key));
            return Ok(false);
        }
        let mut keys = vec![public_key.to_vec()];
        keys.extend(policy.fixed_cosigners.iter().cloned());
        self.register(compute_threshold_address(keys, policy.threshold, self.network)?)
    }
}
