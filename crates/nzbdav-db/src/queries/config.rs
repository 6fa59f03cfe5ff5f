//! Persisted runtime configuration.

use nzbdav_common::Result;
use rusqlite::Connection;

use super::db_error;

/// Every stored `(name, value)` pair.
pub fn get_config_items(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn
        .prepare("SELECT config_name, config_value FROM config_items ORDER BY config_name")
        .map_err(db_error)?;
    let items = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(db_error)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(db_error)?;
    Ok(items)
}

/// Insert or replace the given values.
pub fn upsert_config_items(conn: &Connection, items: &[(String, String)]) -> Result<()> {
    let mut stmt = conn
        .prepare(
            "INSERT INTO config_items (config_name, config_value) VALUES (?, ?)
             ON CONFLICT(config_name) DO UPDATE SET config_value = excluded.config_value",
        )
        .map_err(db_error)?;
    for (name, value) in items {
        stmt.execute([name, value]).map_err(db_error)?;
    }
    Ok(())
}
