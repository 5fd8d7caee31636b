//! Deterministic per-user keys
//!
//! A user's key for a given round is `HMAC-SHA256(server secret, user id ||
//! round)` interpreted as a secp256k1 scalar. Nothing here is persisted: the
//! same inputs always rebuild the same key, so the server only ever needs its
//! secret plus the user identifier.

use super::index::AddressIndex;
use super::labels::encode_user_key;
use crate::address;
use crate::config::WalletConfig;
use crate::errors::{AppError, AppResult};
use bitcoin::hashes::hmac::{Hmac, HmacEngine};
use bitcoin::hashes::{sha256, Hash, HashEngine};
use bitcoin::secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use bitcoin::Network;
use lazy_static::lazy_static;
use std::collections::HashSet;
use tracing::debug;

lazy_static! {
    pub(crate) static ref SECP: Secp256k1<All> = Secp256k1::new();
}

/// Key material for one (user, round) pair
#[derive(Clone, PartialEq, Eq)]
pub struct DerivedKey {
    pub private_key: SecretKey,
    pub public_key: PublicKey,
    pub address: String,
    pub round: u32,
}

impl DerivedKey {
    /// Compressed SEC1 public key
    pub fn public_key_bytes(&self) -> [u8; 33] {
        self.public_key.serialize()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("public_key", &self.public_key_hex())
            .field("address", &self.address)
            .field("round", &self.round)
            .finish_non_exhaustive()
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut engine = HmacEngine::<sha256::Hash>::new(key);
    engine.input(data);
    Hmac::<sha256::Hash>::from_engine(engine).to_byte_array()
}

/// Derive the key for `(user_id, server_secret, round)`
pub fn derive(user_id: &str, server_secret: &str, round: u32, network: Network) -> DerivedKey {
    let mut message = Vec::with_capacity(user_id.len() + 4);
    message.extend_from_slice(user_id.as_bytes());
    message.extend_from_slice(&round.to_be_bytes());

    let mut digest = hmac_sha256(server_secret.as_bytes(), &message);
    // Zero or >= curve order: re-hash until the digest is a valid scalar
    let private_key = loop {
        match SecretKey::from_slice(&digest) {
            Ok(key) => break key,
            Err(_) => digest = hmac_sha256(server_secret.as_bytes(), &digest),
        }
    };

    let public_key = PublicKey::from_secret_key(&*SECP, &private_key);
    let address = address::p2pkh_address(&public_key.serialize(), network);

    DerivedKey {
        private_key,
        public_key,
        address,
        round,
    }
}

/// Walk rounds `start..=max_rounds` and return the first key accepted by `matches`
pub fn probe_rounds<F>(
    user_id: &str,
    server_secret: &str,
    network: Network,
    start: u32,
    max_rounds: u32,
    mut matches: F,
) -> Option<DerivedKey>
where
    F: FnMut(&DerivedKey) -> bool,
{
    (start.max(1)..=max_rounds)
        .map(|round| derive(user_id, server_secret, round, network))
        .find(|key| matches(key))
}

/// First key from round 1 whose address is not already in `known_addresses`
pub fn find_unused_address(
    user_id: &str,
    server_secret: &str,
    known_addresses: &HashSet<String>,
    max_rounds: u32,
    network: Network,
) -> AppResult<DerivedKey> {
    probe_rounds(user_id, server_secret, network, 1, max_rounds, |key| {
        !known_addresses.contains(&key.address)
    })
    .ok_or(AppError::ExhaustedRounds { max_rounds })
}

/// Re-derive from round 1 until `candidate` is produced, or give up at `max_rounds`
pub fn resolve_owner(
    candidate: &str,
    user_id: &str,
    server_secret: &str,
    max_rounds: u32,
    network: Network,
) -> Option<DerivedKey> {
    probe_rounds(user_id, server_secret, network, 1, max_rounds, |key| {
        key.address == candidate
    })
}

/// Derivation bound to the server's configuration and the reverse index
#[derive(Clone)]
pub struct KeyDeriver {
    server_secret: String,
    network: Network,
    max_rounds: u32,
    index: AddressIndex,
}

impl KeyDeriver {
    pub fn new(
        server_secret: &str,
        network: Network,
        max_rounds: u32,
        index: AddressIndex,
    ) -> Self {
        Self {
            server_secret: server_secret.to_string(),
            network,
            max_rounds,
            index,
        }
    }

    pub fn from_config(wallet: &WalletConfig, index: AddressIndex) -> AppResult<Self> {
        let network = wallet
            .network()
            .map_err(|e| AppError::Config(e.to_string()))?;
        Ok(Self::new(
            &wallet.server_private_key,
            network,
            wallet.max_deterministic_addresses,
            index,
        ))
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    pub fn index(&self) -> &AddressIndex {
        &self.index
    }

    pub fn derive(&self, user_id: &str, round: u32) -> DerivedKey {
        derive(user_id, &self.server_secret, round, self.network)
    }

    /// Collision probe starting at `start_round`
    ///
    /// Nothing is indexed here; callers record the key once it is handed out.
    pub fn find_unused_address(
        &self,
        user_id: &str,
        known_addresses: &HashSet<String>,
        start_round: u32,
    ) -> AppResult<DerivedKey> {
        let key = probe_rounds(
            user_id,
            &self.server_secret,
            self.network,
            start_round,
            self.max_rounds,
            |key| !known_addresses.contains(&key.address),
        )
        .ok_or(AppError::ExhaustedRounds {
            max_rounds: self.max_rounds,
        })?;

        debug!("Derived unused address {} at round {}", key.address, key.round);
        Ok(key)
    }

    /// Remember that `key` was handed out to `user_id`
    pub fn record_issued(&self, user_id: &str, key: &DerivedKey) -> AppResult<()> {
        self.index
            .record(&key.address, &encode_user_key(user_id), key.round)
    }

    /// Is `candidate` one of this user's addresses?
    ///
    /// The reverse index answers in one derivation; addresses created out of
    /// band fall back to the linear probe.
    pub fn resolve_owner(&self, user_id: &str, candidate: &str) -> Option<DerivedKey> {
        if let Some(entry) = self.index.lookup(candidate) {
            if entry.user_tag == encode_user_key(user_id) {
                let key = self.derive(user_id, entry.round);
                if key.address == candidate {
                    return Some(key);
                }
            }
        }

        resolve_owner(
            candidate,
            user_id,
            &self.server_secret,
            self.max_rounds,
            self.network,
        )
    }

    /// First key in `1..=max_rounds` accepted by `matches`
    pub fn probe<F>(&self, user_id: &str, matches: F) -> Option<DerivedKey>
    where
        F: FnMut(&DerivedKey) -> bool,
    {
        probe_rounds(
            user_id,
            &self.server_secret,
            self.network,
            1,
            self.max_rounds,
            matches,
        )
    }
}
