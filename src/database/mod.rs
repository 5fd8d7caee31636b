//! Durable store for threshold-address redeem scripts and the derived-address index.
//!
//! ## Architecture
//!
//! The `Database` struct directly implements the operation traits:
//! - `RedeemScriptOperations` - write-through target of the registry
//! - `AddressIndexOperations` - reverse index of handed-out addresses

pub mod helpers;
mod derived_addresses;
mod redeem_scripts;
pub mod schema;
pub mod traits;

pub use helpers::*;
pub use schema::setup_schema;
pub use traits::*;

use crate::errors::AppResult;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Handle shared between the registry and the address index
pub type SharedDatabase = Arc<Mutex<Database>>;

pub struct Database {
    connection: Connection,
}

impl Database {
    /// Open (or create) the store and make sure the schema exists
    pub fn new(database_path: &str) -> AppResult<Self> {
        let connection = Connection::open(database_path)?;

        setup_schema(&connection)?;

        info!("Database initialised at: {}", database_path);
        Ok(Self { connection })
    }

    /// Convenience for callers that want the shared handle directly
    pub fn open_shared(database_path: &str) -> AppResult<SharedDatabase> {
        Ok(Arc::new(Mutex::new(Self::new(database_path)?)))
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Execute a function within a database transaction
    pub fn execute_transaction<F, R>(&mut self, f: F) -> AppResult<R>
    where
        F: FnOnce(&rusqlite::Transaction) -> AppResult<R>,
    {
        let tx = self.connection.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}
