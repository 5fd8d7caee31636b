//! Operation traits implemented by [`Database`](super::Database)

use crate::errors::AppResult;
use crate::multisig::ThresholdAddress;

/// Persistence behind the redeem-script registry
pub trait RedeemScriptOperations {
    /// Insert unless the address is already stored
    fn insert_redeem_script(&mut self, entry: &ThresholdAddress) -> AppResult<()>;

    fn get_redeem_script(&self, address: &str) -> AppResult<Option<ThresholdAddress>>;

    /// Everything stored, oldest first
    fn load_redeem_scripts(&self) -> AppResult<Vec<ThresholdAddress>>;
}

/// Persistence behind the derived-address reverse index
pub trait AddressIndexOperations {
    /// Insert or replace the owner of `address`
    fn record_derived_address(&mut self, address: &str, user_tag: &str, round: u32)
        -> AppResult<()>;

    fn lookup_derived_address(&self, address: &str) -> AppResult<Option<(String, u32)>>;

    /// `(address, user_tag, round)` rows
    fn load_derived_addresses(&self) -> AppResult<Vec<(String, String, u32)>>;
}
