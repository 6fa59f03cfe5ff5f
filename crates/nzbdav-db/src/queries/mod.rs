//! Database query modules.
//!
//! - items: the directory tree and the segment data behind its files
//! - queue: jobs waiting for ingestion
//! - history: finished jobs
//! - config: persisted runtime configuration

pub mod config;
pub mod history;
pub mod items;
pub mod queue;

use chrono::{DateTime, SecondsFormat, Utc};
use nzbdav_common::Error;
use rusqlite::types::Type;
use uuid::Uuid;

/// Timestamps are stored as fixed-width RFC 3339 text so that string order
/// matches time order.
pub(crate) fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_time(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_uuid(idx: usize, value: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    idx: usize,
    value: &str,
) -> rusqlite::Result<T> {
    serde_json::from_str(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Map an out-of-range enum discriminant to a conversion error.
pub(crate) fn bad_value(idx: usize, value: i64) -> rusqlite::Error {
    rusqlite::Error::IntegralValueOutOfRange(idx, value)
}

pub(crate) fn db_error(e: rusqlite::Error) -> Error {
    Error::database(e.to_string())
}

pub(crate) fn to_i64(value: u64) -> nzbdav_common::Result<i64> {
    i64::try_from(value).map_err(|_| Error::invalid_input(format!("{value} does not fit in i64")))
}
