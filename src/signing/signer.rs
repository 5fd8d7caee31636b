//! Signing a transaction for one address
//!
//! The signer never stores private keys. Given a user id it re-derives the
//! user's keys round by round until one of them, or the threshold address
//! built from it, is the address being spent.

use super::ecdsa::{encode_der, EcdsaSigner};
use super::script_sig::{
    apply_signature, merge_signed_transaction, PartialSignature, SpendingCondition,
};
use super::sighash::{compute_sighash, SIGHASH_ALL};
use crate::builder::BuilderSettings;
use crate::errors::{AppError, AppResult};
use crate::keys::{encode_user_key, DerivedKey, KeyDeriver};
use crate::multisig::{RedeemScriptRegistry, ThresholdAddress, ThresholdPolicy};
use crate::rpc::{LedgerNode, OutpointDetails, RemoteSigner};
use crate::transaction::RawTransaction;
use bitcoin::secp256k1::SecretKey;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sign `input_index` of `transaction` against `condition`
pub fn sign_input(
    signer: &dyn EcdsaSigner,
    signer_id: &str,
    transaction: &RawTransaction,
    input_index: usize,
    private_key: &SecretKey,
    condition: &SpendingCondition,
) -> AppResult<PartialSignature> {
    let digest = compute_sighash(transaction, input_index, condition.script_code(), SIGHASH_ALL)?;
    let (r, s) = signer.sign(&digest, private_key)?;

    let mut der_signature = encode_der(&r, &s);
    der_signature.push(SIGHASH_ALL as u8);

    Ok(PartialSignature {
        signer_id: signer_id.to_string(),
        input_index,
        der_signature,
    })
}

/// A user key able to spend an address, and how
#[derive(Debug, Clone)]
pub struct SigningKey {
    pub key: DerivedKey,
    /// Set when the address is the threshold address built from `key`
    pub threshold: Option<ThresholdAddress>,
}

pub struct TransactionSigner {
    signer_id: String,
    deriver: KeyDeriver,
    registry: RedeemScriptRegistry,
    policy: ThresholdPolicy,
    ledger: Arc<dyn LedgerNode>,
    remote: Option<Arc<dyn RemoteSigner>>,
    ecdsa: Arc<dyn EcdsaSigner>,
    settings: BuilderSettings,
}

impl TransactionSigner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        signer_id: &str,
        deriver: KeyDeriver,
        registry: RedeemScriptRegistry,
        policy: ThresholdPolicy,
        ledger: Arc<dyn LedgerNode>,
        remote: Option<Arc<dyn RemoteSigner>>,
        ecdsa: Arc<dyn EcdsaSigner>,
        settings: BuilderSettings,
    ) -> Self {
        Self {
            signer_id: signer_id.to_string(),
            deriver,
            registry,
            policy,
            ledger,
            remote,
            ecdsa,
            settings,
        }
    }

    pub fn signer_id(&self) -> &str {
        &self.signer_id
    }

    pub fn registry(&self) -> &RedeemScriptRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    fn matches(&self, key: &DerivedKey, address: &str) -> Option<SigningKey> {
        if key.address == address {
            return Some(SigningKey {
                key: key.clone(),
                threshold: None,
            });
        }
        if let Some(entry) = self.registry.get(address) {
            let public_key = key.public_key_bytes();
            return entry
                .ordered_public_keys
                .iter()
                .any(|k| k.as_slice() == public_key.as_slice())
                .then(|| SigningKey {
                    key: key.clone(),
                    threshold: Some(entry),
                });
        }
        match self.registry.threshold_address_for_key(key, &self.policy) {
            Ok(threshold) if threshold.address == address => Some(SigningKey {
                key: key.clone(),
                threshold: Some(threshold),
            }),
            _ => None,
        }
    }

    /// Find the user's key for `address`: reverse index first, then the round probe
    pub fn resolve_signing_key(&self, user_id: &str, address: &str) -> Option<SigningKey> {
        if let Some(entry) = self.deriver.index().lookup(address) {
            if entry.user_tag == encode_user_key(user_id) {
                let key = self.deriver.derive(user_id, entry.round);
                if let Some(found) = self.matches(&key, address) {
                    return Some(found);
                }
            }
        }

        let mut found = None;
        self.deriver.probe(user_id, |key| {
            found = self.matches(key, address);
            found.is_some()
        });
        found
    }

    /// Sign every input of `transaction` that spends `address`
    ///
    /// Without a user id the node's wallet is asked instead. When no key for
    /// the address can be derived the transaction comes back unchanged.
    pub async fn sign_for_address(
        &self,
        transaction: &RawTransaction,
        address: &str,
        user_id: Option<&str>,
    ) -> AppResult<RawTransaction> {
        let Some(user_id) = user_id else {
            let sig_hash_data = self.sig_hash_data(transaction, address).await?;
            return self.sign_remote(transaction, address, &sig_hash_data).await;
        };

        let Some(signing_key) = self.resolve_signing_key(user_id, address) else {
            debug!("No derivable key for {} within {} rounds", address, self.deriver.max_rounds());
            return Ok(transaction.clone());
        };
        debug!("Signing for {} with round {} key", address, signing_key.key.round);

        let condition_for = |script_pub_key: &[u8]| -> AppResult<SpendingCondition> {
            match &signing_key.threshold {
                Some(threshold) => {
                    let redeem_script = self
                        .registry
                        .redeem_script(address)
                        .unwrap_or_else(|| threshold.redeem_script.clone());
                    Ok(SpendingCondition::Threshold { redeem_script })
                }
                None => Ok(SpendingCondition::Standard {
                    public_key: signing_key.key.public_key_bytes().to_vec(),
                    script_pub_key: script_pub_key.to_vec(),
                }),
            }
        };
        if let Some(threshold) = &signing_key.threshold {
            self.registry.register(threshold.clone())?;
        }

        let outpoints = self
            .ledger
            .list_unspent(
                self.settings.min_confirmations,
                self.settings.max_confirmations,
                &[address.to_string()],
            )
            .await?;

        let mut signed = transaction.clone();
        let mut count = 0;
        for (index, input) in transaction.inputs.iter().enumerate() {
            let Some(outpoint) = outpoints.iter().find(|o| {
                o.address == address && input.spends(&o.txid, o.output_index)
            }) else {
                continue;
            };

            let condition = condition_for(&outpoint.script_pub_key)?;
            let signature = sign_input(
                self.ecdsa.as_ref(),
                &self.signer_id,
                transaction,
                index,
                &signing_key.key.private_key,
                &condition,
            )?;
            apply_signature(&mut signed, &signature, &condition)?;
            count += 1;
        }

        if count == 0 {
            warn!("Transaction {} has no unspent inputs from {}", transaction.txid(), address);
        } else {
            info!("Signed {} inputs spending {}", count, address);
        }
        Ok(signed)
    }

    /// Previous outputs of `transaction` held by `address`, with the registered redeem script
    pub async fn sig_hash_data(
        &self,
        transaction: &RawTransaction,
        address: &str,
    ) -> AppResult<Vec<OutpointDetails>> {
        let outpoints = self
            .ledger
            .list_unspent(
                self.settings.min_confirmations,
                self.settings.max_confirmations,
                &[address.to_string()],
            )
            .await?;

        Ok(outpoints
            .iter()
            .filter(|o| {
                transaction
                    .inputs
                    .iter()
                    .any(|input| input.spends(&o.txid, o.output_index))
            })
            .map(|o| OutpointDetails::new(o, self.registry.redeem_script(&o.address)))
            .collect())
    }

    /// Hand the transaction to the node wallet
    ///
    /// Returns `SigningUnavailable` when no remote signer is configured; a
    /// failed remote call leaves the transaction unchanged.
    pub async fn sign_remote(
        &self,
        transaction: &RawTransaction,
        address: &str,
        sig_hash_data: &[OutpointDetails],
    ) -> AppResult<RawTransaction> {
        let remote = self.remote.as_ref().ok_or_else(|| AppError::SigningUnavailable {
            address: address.to_string(),
        })?;

        let returned = match remote.sign_raw_transaction(transaction, sig_hash_data).await {
            Ok(returned) => returned,
            Err(e) => {
                warn!("Remote signing for {} failed: {}", address, e);
                return Ok(transaction.clone());
            }
        };

        let mut signed = transaction.clone();
        match merge_signed_transaction(&mut signed, &returned, "remote-wallet") {
            Ok(added) => {
                debug!("Remote wallet added {} signatures", added);
                Ok(signed)
            }
            Err(e) => {
                warn!("Discarding remote signature for {}: {}", address, e);
                Ok(transaction.clone())
            }
        }
    }
}
