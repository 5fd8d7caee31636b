//! Ledger node integration
//!
//! - **ledger** - `LedgerNode` / `RemoteSigner` capability traits and their data types
//! - **client** - Bitcoin Core implementation: async worker over `corepc-client`
//! - **cache** - raw transaction cache for repeated parent lookups
//! - **retry** - exponential backoff, timeouts and failure classification

pub mod cache;
pub mod client;
pub mod ledger;
pub mod retry;

pub use cache::{CacheStats, TransactionCache};
pub use client::{BitcoinRpcClient, RpcRequest};
pub use ledger::{LedgerNode, Outpoint, OutpointDetails, Payment, PaymentCategory, RemoteSigner};
pub use retry::{calculate_next_backoff, execute_with_timeout, permanent_failure, RetryPolicy};
