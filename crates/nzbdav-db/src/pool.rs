//! Database connection pool management.
//!
//! SQLite connections pooled with r2d2. Every connection has foreign keys
//! enabled; migrations run once when the pool is created.

use std::time::Duration;

use r2d2::Pool;
use nzbdav_common::{Error, Result};
use r2d2_sqlite::SqliteConnectionManager;

use crate::migrations;

pub type DbPool = Pool<SqliteConnectionManager>;

pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const FILE_POOL_SIZE: u32 = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (creating if needed) the database at `db_path` and migrate it.
///
/// ```no_run
/// use nzbdav_db::pool::init_pool;
///
/// let pool = init_pool("/var/lib/nzbdav/nzbdav.db").unwrap();
/// let conn = pool.get().unwrap();
/// ```
pub fn init_pool(db_path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(BUSY_TIMEOUT)
    });
    build(manager, FILE_POOL_SIZE)
}

/// In-memory database for tests.
///
/// Every connection to `:memory:` would be a separate database, so the pool
/// holds a single connection. Callers must not hold two at once.
///
/// ```
/// use nzbdav_db::pool::{get_conn, init_memory_pool};
///
/// let pool = init_memory_pool().unwrap();
/// let conn = get_conn(&pool).unwrap();
/// ```
pub fn init_memory_pool() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory()
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    build(manager, 1)
}

fn build(manager: SqliteConnectionManager, size: u32) -> Result<DbPool> {
    let pool = Pool::builder()
        .max_size(size)
        .build(manager)
        .map_err(|e| Error::database(format!("Failed to create connection pool: {}", e)))?;

    let conn = get_conn(&pool)?;
    migrations::run_migrations(&conn)
        .map_err(|e| Error::database(format!("Failed to run migrations: {}", e)))?;
    drop(conn);

    Ok(pool)
}

/// `pool.get()` with the error converted.
pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::database(format!("Failed to get connection from pool: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_pool_is_shared() {
        let pool = init_memory_pool().unwrap();
        assert_eq!(pool.max_size(), 1);
        {
            let conn = get_conn(&pool).unwrap();
            conn.execute(
                "INSERT INTO config_items (config_name, config_value) VALUES ('a', 'b')",
                [],
            )
            .unwrap();
        }
        let conn = get_conn(&pool).unwrap();
        let value: String = conn
            .query_row(
                "SELECT config_value FROM config_items WHERE config_name = 'a'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(value, "b");
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let enabled: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_file_pool_migrates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nzbdav.db");
        let pool = init_pool(path.to_str().unwrap()).unwrap();
        let conn = get_conn(&pool).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM dav_items", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 4);
    }
}
