use crate::errors::AppResult;
use rusqlite::Connection;
use tracing::debug;

/// Create the cosigner tables if they do not exist yet
pub fn setup_schema(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        PRAGMA user_version = 1;

        -- Redeem scripts of every threshold address this server built or rediscovered
        CREATE TABLE IF NOT EXISTS redeem_scripts (
            address TEXT PRIMARY KEY,
            redeem_script TEXT NOT NULL,
            public_keys TEXT NOT NULL,       -- JSON array of hex keys, script order
            threshold INTEGER NOT NULL CHECK (threshold >= 1),
            created_at TEXT NOT NULL
        );

        -- Reverse index: derived address -> (sha256(user id), round)
        CREATE TABLE IF NOT EXISTS derived_addresses (
            address TEXT PRIMARY KEY,
            user_tag TEXT NOT NULL,
            round INTEGER NOT NULL CHECK (round >= 1),
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_derived_addresses_user_tag
            ON derived_addresses(user_tag);
        "#,
    )?;

    debug!("Schema ready");
    Ok(())
}
