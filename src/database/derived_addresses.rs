use crate::database::traits::AddressIndexOperations;
use crate::database::Database;
use crate::errors::AppResult;
use rusqlite::{params, OptionalExtension};

impl AddressIndexOperations for Database {
    fn record_derived_address(
        &mut self,
        address: &str,
        user_tag: &str,
        round: u32,
    ) -> AppResult<()> {
        self.connection().execute(
            r#"INSERT INTO derived_addresses (address, user_tag, round, created_at)
               VALUES (?1, ?2, ?3, ?4)
               ON CONFLICT(address) DO UPDATE SET
                   user_tag = excluded.user_tag,
                   round = excluded.round"#,
            params![address, user_tag, round, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn lookup_derived_address(&self, address: &str) -> AppResult<Option<(String, u32)>> {
        let entry = self
            .connection()
            .query_row(
                "SELECT user_tag, round FROM derived_addresses WHERE address = ?1",
                params![address],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(entry)
    }

    fn load_derived_addresses(&self) -> AppResult<Vec<(String, String, u32)>> {
        let mut stmt = self
            .connection()
            .prepare("SELECT address, user_tag, round FROM derived_addresses")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}
