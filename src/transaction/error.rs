//! Codec-specific error types

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Why a byte string is not a well-formed legacy transaction or script
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Truncated input reading {field} at byte {offset}")]
    Truncated { field: &'static str, offset: usize },

    #[error("{field} count {count} cannot fit in the remaining {remaining} bytes")]
    InconsistentCount {
        field: &'static str,
        count: u64,
        remaining: usize,
    },

    #[error("Non-canonical variable-length integer for {field} at byte {offset}")]
    NonCanonicalVarInt { field: &'static str, offset: usize },

    #[error("{0} trailing bytes after lock time")]
    TrailingBytes(usize),

    #[error("Segregated witness serialisation is not supported")]
    UnsupportedWitness,

    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Invalid txid: {0}")]
    InvalidTxid(String),

    #[error("Script push at byte {offset} runs past the end of the script")]
    TruncatedPush { offset: usize },
}

impl From<hex::FromHexError> for CodecError {
    fn from(err: hex::FromHexError) -> Self {
        CodecError::InvalidHex(err.to_string())
    }
}
