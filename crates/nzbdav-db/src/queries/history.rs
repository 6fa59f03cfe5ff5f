//! History item queries.

use nzbdav_common::{DownloadStatus, QueueItemId, Result};
use rusqlite::{named_params, Connection, OptionalExtension, Row};

use super::{bad_value, db_error, format_time, parse_time, parse_uuid, to_i64};
use crate::models::HistoryItem;

const HISTORY_COLUMNS: &str = "id, created_at, file_name, job_name, category, download_status,
     total_segment_bytes, download_time_seconds, fail_message";

fn parse_history_row(row: &Row) -> rusqlite::Result<HistoryItem> {
    let status: i64 = row.get(5)?;
    Ok(HistoryItem {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?.into(),
        created_at: parse_time(1, &row.get::<_, String>(1)?)?,
        file_name: row.get(2)?,
        job_name: row.get(3)?,
        category: row.get(4)?,
        download_status: DownloadStatus::from_i64(status).ok_or_else(|| bad_value(5, status))?,
        total_segment_bytes: row.get::<_, i64>(6)?.max(0) as u64,
        download_time_seconds: row.get::<_, i64>(7)?.max(0) as u64,
        fail_message: row.get(8)?,
    })
}

pub fn insert_history_item(conn: &Connection, item: &HistoryItem) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO history_items ({HISTORY_COLUMNS}) VALUES (
                :id, :created_at, :file_name, :job_name, :category, :download_status,
                :total_segment_bytes, :download_time_seconds, :fail_message
            )"
        ),
        named_params! {
            ":id": item.id.to_string(),
            ":created_at": format_time(&item.created_at),
            ":file_name": item.file_name,
            ":job_name": item.job_name,
            ":category": item.category,
            ":download_status": item.download_status.as_i64(),
            ":total_segment_bytes": to_i64(item.total_segment_bytes)?,
            ":download_time_seconds": to_i64(item.download_time_seconds)?,
            ":fail_message": item.fail_message,
        },
    )
    .map_err(db_error)?;
    Ok(())
}

pub fn get_history_item(conn: &Connection, id: QueueItemId) -> Result<Option<HistoryItem>> {
    conn.query_row(
        &format!("SELECT {HISTORY_COLUMNS} FROM history_items WHERE id = ?"),
        [id.to_string()],
        parse_history_row,
    )
    .optional()
    .map_err(db_error)
}

/// Most recent first.
pub fn list_history_items(conn: &Connection, limit: u32) -> Result<Vec<HistoryItem>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {HISTORY_COLUMNS} FROM history_items
             ORDER BY created_at DESC, rowid DESC LIMIT ?"
        ))
        .map_err(db_error)?;
    let items = stmt
        .query_map([limit], parse_history_row)
        .map_err(db_error)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(db_error)?;
    Ok(items)
}

pub fn remove_history_item(conn: &Connection, id: QueueItemId) -> Result<bool> {
    let deleted = conn
        .execute("DELETE FROM history_items WHERE id = ?", [id.to_string()])
        .map_err(db_error)?;
    Ok(deleted > 0)
}
