//! nzbdav-db: database schema, migrations, and queries
//!
//! SQLite through rusqlite with r2d2 connection pooling.
//!
//! # Modules
//!
//! - `migrations` - embedded schema migrations
//! - `pool` - connection pool management
//! - `models` - Rust models matching the schema
//! - `queries` - query operations per table group
//!
//! # Example
//!
//! ```
//! use nzbdav_common::DavItemId;
//! use nzbdav_db::pool::{get_conn, init_memory_pool};
//! use nzbdav_db::queries::items;
//!
//! let pool = init_memory_pool().unwrap();
//! let conn = get_conn(&pool).unwrap();
//! let content = items::get_child(&conn, DavItemId::ROOT, "content").unwrap();
//! assert_eq!(content.unwrap().id, DavItemId::CONTENT);
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;

pub use pool::{get_conn, init_memory_pool, init_pool, DbPool, PooledConnection};
