//! Backoff, timeout and retry classification for ledger node calls

use crate::config::BitcoinRpcConfig;
use crate::errors::{RpcError, RpcResult};
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::error::Elapsed;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, warn};

/// Bitcoin Core replies that no amount of retrying will change
const PERMANENT_FAILURES: &[&str] = &[
    "Invalid address",
    "Invalid Bitcoin address",
    "Method not found",
    "TX decode failed",
    "Transaction already in block chain",
    "bad-txns",
    "mandatory-script-verify-flag",
    "Missing inputs",
    "missing-inputs",
    "Invalid parameter",
    "No addresses with label",
];

const NOT_FOUND: &[&str] = &[
    "No such mempool or blockchain transaction",
    "Invalid or non-wallet transaction id",
];

/// `min(current * multiplier, max)`
///
/// # Example
/// ```
/// use std::time::Duration;
/// use cosigner::rpc::calculate_next_backoff;
///
/// let next = calculate_next_backoff(Duration::from_millis(100), 2.0, 30);
/// assert_eq!(next, Duration::from_millis(200));
/// ```
pub fn calculate_next_backoff(
    current_backoff: Duration,
    multiplier: f64,
    max_backoff_seconds: u64,
) -> Duration {
    Duration::from_millis((current_backoff.as_millis() as f64 * multiplier) as u64)
        .min(Duration::from_secs(max_backoff_seconds))
}

/// Run a blocking call on the blocking pool, bounded by `timeout_seconds`
///
/// Outer error: timeout elapsed. Middle error: the blocking task panicked.
pub async fn execute_with_timeout<T, F>(
    timeout_seconds: u64,
    operation: F,
) -> Result<Result<RpcResult<T>, JoinError>, Elapsed>
where
    T: Send + 'static,
    F: FnOnce() -> RpcResult<T> + Send + 'static,
{
    timeout(
        Duration::from_secs(timeout_seconds),
        tokio::task::spawn_blocking(operation),
    )
    .await
}

/// Map a failed call to the error surfaced without retrying, if any
pub fn permanent_failure(operation: &str, err: &RpcError) -> Option<RpcError> {
    let message = err.to_string();

    if NOT_FOUND.iter().any(|needle| message.contains(needle)) {
        return Some(RpcError::TransactionNotFound {
            txid: operation.to_string(),
        });
    }
    if PERMANENT_FAILURES.iter().any(|needle| message.contains(needle)) {
        return Some(RpcError::CallFailed {
            method: operation.to_string(),
            message,
        });
    }
    None
}

/// Retry settings lifted out of the RPC config
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff_seconds: u64,
    pub timeout_seconds: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &BitcoinRpcConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            backoff_multiplier: config.backoff_multiplier,
            max_backoff_seconds: config.max_backoff_seconds,
            timeout_seconds: config.timeout_seconds,
        }
    }

    /// Call `make_call()` until it succeeds, fails permanently, or attempts run out
    ///
    /// `on_failure` is invoked once per failed attempt (error accounting).
    pub async fn run<T, M, F>(
        &self,
        operation: &str,
        mut make_call: M,
        mut on_failure: impl FnMut(),
    ) -> RpcResult<T>
    where
        T: Send + 'static,
        M: FnMut() -> F,
        F: FnOnce() -> RpcResult<T> + Send + 'static,
    {
        let mut attempts = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let outcome = execute_with_timeout(self.timeout_seconds, make_call()).await;
            attempts += 1;

            let failure = match outcome {
                Ok(Ok(Ok(value))) => {
                    if attempts > 1 {
                        debug!("{} succeeded after {} attempts", operation, attempts);
                    }
                    return Ok(value);
                }
                Ok(Ok(Err(e))) => {
                    on_failure();
                    if let Some(permanent) = permanent_failure(operation, &e) {
                        debug!("{} failed permanently: {}", operation, e);
                        return Err(permanent);
                    }
                    if attempts >= self.max_retries {
                        error!("{} failed after {} attempts: {}", operation, attempts, e);
                        return Err(RpcError::MaxRetriesExceeded {
                            operation: operation.to_string(),
                        });
                    }
                    e.to_string()
                }
                Ok(Err(join_error)) => {
                    on_failure();
                    error!("Blocking task for {} failed: {}", operation, join_error);
                    return Err(RpcError::CallFailed {
                        method: operation.to_string(),
                        message: format!("Task execution error: {}", join_error),
                    });
                }
                Err(_) => {
                    on_failure();
                    if attempts >= self.max_retries {
                        error!(
                            "{} timed out {} times ({}s timeout)",
                            operation, attempts, self.timeout_seconds
                        );
                        return Err(RpcError::Timeout {
                            timeout_seconds: self.timeout_seconds,
                            operation: operation.to_string(),
                        });
                    }
                    format!("timed out after {}s", self.timeout_seconds)
                }
            };

            warn!(
                "{} attempt {} failed, retrying in {:?}: {}",
                operation, attempts, backoff, failure
            );
            sleep(backoff).await;
            backoff = calculate_next_backoff(
                backoff,
                self.backoff_multiplier,
                self.max_backoff_seconds,
            );
        }
    }
}
