use crate::database::helpers::{public_keys_json, threshold_address_from_row};
use crate::database::traits::RedeemScriptOperations;
use crate::database::Database;
use crate::errors::AppResult;
use crate::multisig::ThresholdAddress;
use rusqlite::{params, OptionalExtension};
use tracing::debug;

impl RedeemScriptOperations for Database {
    fn insert_redeem_script(&mut self, entry: &ThresholdAddress) -> AppResult<()> {
        let inserted = self.connection().execute(
            r#"INSERT OR IGNORE INTO redeem_scripts
               (address, redeem_script, public_keys, threshold, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                entry.address,
                hex::encode(&entry.redeem_script),
                public_keys_json(&entry.ordered_public_keys),
                entry.threshold as i64,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;

        if inserted > 0 {
            debug!("Stored redeem script for {}", entry.address);
        }
        Ok(())
    }

    fn get_redeem_script(&self, address: &str) -> AppResult<Option<ThresholdAddress>> {
        let entry = self
            .connection()
            .query_row(
                r#"SELECT address, redeem_script, public_keys, threshold
                   FROM redeem_scripts WHERE address = ?1"#,
                params![address],
                threshold_address_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    fn load_redeem_scripts(&self) -> AppResult<Vec<ThresholdAddress>> {
        let mut stmt = self.connection().prepare(
            r#"SELECT address, redeem_script, public_keys, threshold
               FROM redeem_scripts ORDER BY created_at, rowid"#,
        )?;
        let rows = stmt.query_map([], threshold_address_from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}
