//! Queue item queries.

use chrono::{DateTime, Utc};
use nzbdav_common::{PostProcessing, Priority, QueueItemId, Result};
use rusqlite::{named_params, Connection, OptionalExtension, Row};

use super::{bad_value, db_error, format_time, parse_time, parse_uuid, to_i64};
use crate::models::QueueItem;

const QUEUE_COLUMNS: &str = "id, created_at, file_name, job_name, nzb_contents, nzb_file_size,
     total_segment_bytes, category, priority, post_processing, pause_until";

fn parse_queue_row(row: &Row) -> rusqlite::Result<QueueItem> {
    let priority: i64 = row.get(8)?;
    let post_processing: i64 = row.get(9)?;
    let pause_until: Option<String> = row.get(10)?;
    Ok(QueueItem {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?.into(),
        created_at: parse_time(1, &row.get::<_, String>(1)?)?,
        file_name: row.get(2)?,
        job_name: row.get(3)?,
        nzb_contents: row.get(4)?,
        nzb_file_size: row.get::<_, i64>(5)?.max(0) as u64,
        total_segment_bytes: row.get::<_, i64>(6)?.max(0) as u64,
        category: row.get(7)?,
        priority: Priority::from_i64(priority).ok_or_else(|| bad_value(8, priority))?,
        post_processing: PostProcessing::from_i64(post_processing)
            .ok_or_else(|| bad_value(9, post_processing))?,
        pause_until: pause_until.map(|p| parse_time(10, &p)).transpose()?,
    })
}

pub fn insert_queue_item(conn: &Connection, item: &QueueItem) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO queue_items ({QUEUE_COLUMNS}) VALUES (
                :id, :created_at, :file_name, :job_name, :nzb_contents, :nzb_file_size,
                :total_segment_bytes, :category, :priority, :post_processing, :pause_until
            )"
        ),
        named_params! {
            ":id": item.id.to_string(),
            ":created_at": format_time(&item.created_at),
            ":file_name": item.file_name,
            ":job_name": item.job_name,
            ":nzb_contents": item.nzb_contents,
            ":nzb_file_size": to_i64(item.nzb_file_size)?,
            ":total_segment_bytes": to_i64(item.total_segment_bytes)?,
            ":category": item.category,
            ":priority": item.priority.as_i64(),
            ":post_processing": item.post_processing.as_i64(),
            ":pause_until": item.pause_until.as_ref().map(format_time),
        },
    )
    .map_err(db_error)?;
    Ok(())
}

pub fn get_queue_item(conn: &Connection, id: QueueItemId) -> Result<Option<QueueItem>> {
    conn.query_row(
        &format!("SELECT {QUEUE_COLUMNS} FROM queue_items WHERE id = ?"),
        [id.to_string()],
        parse_queue_row,
    )
    .optional()
    .map_err(db_error)
}

/// The job to run next: highest priority, then oldest, skipping jobs
/// paused past `now`.
pub fn next_queue_item(conn: &Connection, now: DateTime<Utc>) -> Result<Option<QueueItem>> {
    conn.query_row(
        &format!(
            "SELECT {QUEUE_COLUMNS} FROM queue_items
             WHERE pause_until IS NULL OR pause_until <= :now
             ORDER BY priority DESC, created_at ASC, rowid ASC
             LIMIT 1"
        ),
        named_params! { ":now": format_time(&now) },
        parse_queue_row,
    )
    .optional()
    .map_err(db_error)
}

/// All queued jobs in scheduling order, paused ones included.
pub fn list_queue_items(conn: &Connection) -> Result<Vec<QueueItem>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {QUEUE_COLUMNS} FROM queue_items
             ORDER BY priority DESC, created_at ASC, rowid ASC"
        ))
        .map_err(db_error)?;
    let items = stmt
        .query_map([], parse_queue_row)
        .map_err(db_error)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(db_error)?;
    Ok(items)
}

pub fn set_pause_until(
    conn: &Connection,
    id: QueueItemId,
    pause_until: Option<DateTime<Utc>>,
) -> Result<bool> {
    let updated = conn
        .execute(
            "UPDATE queue_items SET pause_until = ? WHERE id = ?",
            rusqlite::params![pause_until.as_ref().map(format_time), id.to_string()],
        )
        .map_err(db_error)?;
    Ok(updated > 0)
}

/// Delete a job. Returns whether it existed.
pub fn remove_queue_item(conn: &Connection, id: QueueItemId) -> Result<bool> {
    let deleted = conn
        .execute("DELETE FROM queue_items WHERE id = ?", [id.to_string()])
        .map_err(db_error)?;
    Ok(deleted > 0)
}

pub fn count_queue_items(conn: &Connection) -> Result<u64> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM queue_items", [], |row| row.get(0))
        .map_err(db_error)?;
    Ok(count.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{get_conn, init_memory_pool};
    use chrono::Duration;

    fn item(name: &str, priority: Priority, created_at: DateTime<Utc>) -> QueueItem {
        QueueItem {
            id: QueueItemId::new(),
            created_at,
            file_name: format!("{name}.nzb"),
            job_name: name.to_string(),
            nzb_contents: "<nzb/>".into(),
            nzb_file_size: 6,
            total_segment_bytes: 1000,
            category: "movies".into(),
            priority,
            post_processing: PostProcessing::Default,
            pause_until: None,
        }
    }

    #[test]
    fn test_round_trip() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let mut queued = item("a", Priority::Normal, Utc::now());
        queued.pause_until = Some(Utc::now() + Duration::minutes(1));
        insert_queue_item(&conn, &queued).unwrap();

        let loaded = get_queue_item(&conn, queued.id).unwrap().unwrap();
        assert_eq!(loaded.job_name, "a");
        assert_eq!(loaded.priority, Priority::Normal);
        assert_eq!(loaded.total_segment_bytes, 1000);
        assert!(loaded.pause_until.is_some());
        assert_eq!(count_queue_items(&conn).unwrap(), 1);
    }

    #[test]
    fn test_next_by_priority_then_age() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let now = Utc::now();

        let old_low = item("old-low", Priority::Low, now - Duration::hours(2));
        let old_normal = item("old-normal", Priority::Normal, now - Duration::hours(1));
        let new_normal = item("new-normal", Priority::Normal, now);
        let forced = item("forced", Priority::Force, now);
        for i in [&new_normal, &old_low, &forced, &old_normal] {
            insert_queue_item(&conn, i).unwrap();
        }

        let order: Vec<_> = list_queue_items(&conn)
            .unwrap()
            .into_iter()
            .map(|i| i.job_name)
            .collect();
        assert_eq!(order, vec!["forced", "old-normal", "new-normal", "old-low"]);
        assert_eq!(next_queue_item(&conn, now).unwrap().unwrap().id, forced.id);
    }

    #[test]
    fn test_paused_items_are_skipped_until_due() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let now = Utc::now();

        let paused = item("paused", Priority::High, now - Duration::hours(1));
        let waiting = item("waiting", Priority::Normal, now);
        insert_queue_item(&conn, &paused).unwrap();
        insert_queue_item(&conn, &waiting).unwrap();
        set_pause_until(&conn, paused.id, Some(now + Duration::minutes(1))).unwrap();

        assert_eq!(next_queue_item(&conn, now).unwrap().unwrap().id, waiting.id);
        let later = now + Duration::minutes(2);
        assert_eq!(next_queue_item(&conn, later).unwrap().unwrap().id, paused.id);
    }

    #[test]
    fn test_remove() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let queued = item("a", Priority::Normal, Utc::now());
        insert_queue_item(&conn, &queued).unwrap();

        assert!(remove_queue_item(&conn, queued.id).unwrap());
        assert!(!remove_queue_item(&conn, queued.id).unwrap());
        assert!(next_queue_item(&conn, Utc::now()).unwrap().is_none());
    }
}
