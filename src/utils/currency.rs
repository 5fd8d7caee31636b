//! Conversions between the ledger node's decimal BTC amounts and satoshis
//!
//! Bitcoin Core reports amounts as JSON numbers in BTC. Everything inside the
//! signing engine works in integer satoshis, so values are converted once at
//! the RPC boundary.

use crate::errors::{AppError, AppResult};

/// Satoshis per Bitcoin
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Convert a BTC amount reported by the ledger node into satoshis
///
/// Rounds to the nearest satoshi; Bitcoin Core never reports more than eight
/// decimal places but the float round trip can land a hair below.
///
/// # Examples
/// ```
/// use cosigner::utils::currency::btc_to_sats;
///
/// assert_eq!(btc_to_sats(0.05).unwrap(), 5_000_000);
/// assert_eq!(btc_to_sats(0.00000001).unwrap(), 1);
/// ```
pub fn btc_to_sats(btc: f64) -> AppResult<u64> {
    if !btc.is_finite() || btc < 0.0 {
        return Err(AppError::InvalidData(format!(
            "Amount {} is not a valid non-negative BTC value",
            btc
        )));
    }
    Ok((btc * SATS_PER_BTC as f64).round() as u64)
}

/// Signed variant for wallet history, where sends are negative
pub fn signed_btc_to_sats(btc: f64) -> AppResult<i64> {
    let magnitude = btc_to_sats(btc.abs())? as i64;
    Ok(if btc < 0.0 { -magnitude } else { magnitude })
}

/// Satoshis as the decimal BTC value the ledger node expects in requests
pub fn sats_to_btc(sats: u64) -> f64 {
    sats as f64 / SATS_PER_BTC as f64
}

/// Format a satoshi amount as dual BTC + sats display
///
/// # Examples
/// ```
/// use cosigner::utils::currency::format_sats_as_btc;
///
/// assert_eq!(format_sats_as_btc(1_800_000), "0.01800000 BTC (1800000 sats)");
/// ```
pub fn format_sats_as_btc(sats: u64) -> String {
    format!(
        "{}.{:08} BTC ({} sats)",
        sats / SATS_PER_BTC,
        sats % SATS_PER_BTC,
        sats
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_btc_to_sats() {
        assert_eq!(btc_to_sats(1.0).unwrap(), 100_000_000);
        assert_eq!(btc_to_sats(0.03).unwrap(), 3_000_000);
        assert_eq!(btc_to_sats(0.002).unwrap(), 200_000);
        assert_eq!(btc_to_sats(0.0).unwrap(), 0);
    }

    #[test]
    fn test_btc_to_sats_rejects_garbage() {
        assert!(btc_to_sats(-0.5).is_err());
        assert!(btc_to_sats(f64::NAN).is_err());
        assert!(btc_to_sats(f64::INFINITY).is_err());
    }

    #[test]
    fn test_signed_btc_to_sats() {
        assert_eq!(signed_btc_to_sats(-0.03).unwrap(), -3_000_000);
        assert_eq!(signed_btc_to_sats(0.03).unwrap(), 3_000_000);
    }

    #[test]
    fn test_sats_to_btc() {
        assert_eq!(sats_to_btc(5_000_000), 0.05);
        assert_eq!(btc_to_sats(sats_to_btc(1_800_001)).unwrap(), 1_800_001);
    }

    #[test]
    fn test_format_sats_as_btc() {
        assert_eq!(
            format_sats_as_btc(100_000_000),
            "1.00000000 BTC (100000000 sats)"
        );
        assert_eq!(format_sats_as_btc(5471), "0.00005471 BTC (5471 sats)");
        assert_eq!(
            format_sats_as_btc(2_100_000_000_000_000),
            "21000000.00000000 BTC (2100000000000000 sats)"
        );
    }
}
