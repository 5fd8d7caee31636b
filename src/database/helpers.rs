//! Row mapping shared by the operation impls

use crate::multisig::ThresholdAddress;
use rusqlite::types::Type;
use rusqlite::Row;

fn conversion_error(
    column: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

/// Map a `redeem_scripts` row (address, redeem_script, public_keys, threshold)
pub fn threshold_address_from_row(row: &Row) -> rusqlite::Result<ThresholdAddress> {
    let address: String = row.get(0)?;
    let script_hex: String = row.get(1)?;
    let keys_json: String = row.get(2)?;
    let threshold: i64 = row.get(3)?;

    let redeem_script = hex::decode(&script_hex).map_err(|e| conversion_error(1, e))?;
    let key_hexes: Vec<String> =
        serde_json::from_str(&keys_json).map_err(|e| conversion_error(2, e))?;
    let ordered_public_keys = key_hexes
        .iter()
        .map(hex::decode)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| conversion_error(2, e))?;

    Ok(ThresholdAddress {
        address,
        redeem_script,
        ordered_public_keys,
        threshold: threshold as usize,
    })
}

/// JSON array of hex keys, preserving script order
pub fn public_keys_json(keys: &[Vec<u8>]) -> String {
    let hexes: Vec<String> = keys.iter().map(hex::encode).collect();
    serde_json::Value::from(hexes).to_string()
}
