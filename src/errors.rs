use thiserror::Error;

/// Application-wide error type - single point of truth
#[derive(Error, Debug)]
pub enum AppError {
    /// Durable registry store
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Ledger node RPC operations
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    /// File I/O operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration issues
    #[error("Configuration error: {0}")]
    Config(String),

    /// Raw transaction bytes could not be parsed
    #[error("Malformed transaction: {0}")]
    MalformedTransaction(String),

    /// Coin selection ran out of unspent outputs
    #[error("Insufficient funds: required {required} sats, available {available} sats")]
    InsufficientFunds { required: u64, available: u64 },

    /// Deterministic key probe hit its round bound
    #[error("Exhausted {max_rounds} derivation rounds without a usable address")]
    ExhaustedRounds { max_rounds: u32 },

    /// Neither a local key nor a capable remote signer exists for the address
    #[error("No signer available for address {address}")]
    SigningUnavailable { address: String },

    /// A remote signer or cluster node call failed
    #[error("Transport failure talking to {node}: {message}")]
    TransportFailure { node: String, message: String },

    /// Address string or script could not be decoded
    #[error("Address decode error: {0}")]
    AddressDecode(String),

    /// Data validation/parsing
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Elliptic-curve signing failure
    #[error("Signing error: {0}")]
    Signing(String),
}

/// RPC error types
#[derive(Error, Debug)]
pub enum RpcError {
    /// Failed to establish connection to Bitcoin Core RPC server
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// TXID string format is invalid (not valid hex or wrong length)
    #[error("Invalid txid: {txid}")]
    InvalidTxid { txid: String },

    /// RPC method call failed (covers network errors, authentication, etc.)
    #[error("RPC call failed: {method} - {message}")]
    CallFailed { method: String, message: String },

    /// Failed to deserialise RPC response data
    #[error("Deserialisation failed: {0}")]
    DeserialisationFailed(String),

    /// Retry limit exceeded for RPC operation
    #[error("Max retries exceeded: {operation}")]
    MaxRetriesExceeded { operation: String },

    /// RPC request timed out
    #[error("Request timeout: {timeout_seconds}s for {operation}")]
    Timeout {
        timeout_seconds: u64,
        operation: String,
    },

    /// Transaction exists in valid format but not found in blockchain/mempool
    #[error("Transaction not found: {txid}")]
    TransactionNotFound { txid: String },
}

/// Application-wide result type - single point of truth
pub type AppResult<T> = Result<T, AppError>;

/// Result type for RPC operations
pub type RpcResult<T> = Result<T, RpcError>;

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidData(format!("JSON error: {}", err))
    }
}

impl From<hex::FromHexError> for AppError {
    fn from(err: hex::FromHexError) -> Self {
        AppError::InvalidData(format!("Hex error: {}", err))
    }
}

impl From<crate::transaction::CodecError> for AppError {
    fn from(err: crate::transaction::CodecError) -> Self {
        AppError::MalformedTransaction(err.to_string())
    }
}

impl From<crate::cluster::TransportError> for AppError {
    fn from(err: crate::cluster::TransportError) -> Self {
        AppError::TransportFailure {
            node: err.node().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<bitcoin::secp256k1::Error> for AppError {
    fn from(err: bitcoin::secp256k1::Error) -> Self {
        AppError::Signing(err.to_string())
    }
}
