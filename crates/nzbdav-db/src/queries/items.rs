//! Directory tree queries.
//!
//! Names are unique among siblings; inserting a duplicate fails with
//! `InvalidInput`. Deleting a directory cascades to everything below it.

use nzbdav_common::{DavItemId, Error, ItemType, Result};
use rusqlite::{named_params, Connection, ErrorCode, OptionalExtension, Row};

use super::{bad_value, db_error, format_time, parse_json, parse_time, parse_uuid, to_i64};
use crate::models::{DavItem, DavNzbFile, DavRarFile, NewEntry};

const ITEM_COLUMNS: &str = "id, created_at, parent_id, name, file_size, item_type";

fn parse_item_row(row: &Row) -> rusqlite::Result<DavItem> {
    let parent_id: Option<String> = row.get(2)?;
    let file_size: Option<i64> = row.get(4)?;
    let item_type: i64 = row.get(5)?;
    Ok(DavItem {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?.into(),
        created_at: parse_time(1, &row.get::<_, String>(1)?)?,
        parent_id: parent_id
            .map(|p| parse_uuid(2, &p).map(DavItemId::from))
            .transpose()?,
        name: row.get(3)?,
        file_size: file_size.map(|s| s.max(0) as u64),
        item_type: ItemType::from_i64(item_type).ok_or_else(|| bad_value(5, item_type))?,
    })
}

/// Insert a single tree node.
pub fn insert_item(conn: &Connection, item: &DavItem) -> Result<()> {
    let file_size = item.file_size.map(to_i64).transpose()?;
    conn.execute(
        "INSERT INTO dav_items (id, created_at, parent_id, name, file_size, item_type)
         VALUES (:id, :created_at, :parent_id, :name, :file_size, :item_type)",
        named_params! {
            ":id": item.id.to_string(),
            ":created_at": format_time(&item.created_at),
            ":parent_id": item.parent_id.map(|p| p.to_string()),
            ":name": item.name,
            ":file_size": file_size,
            ":item_type": item.item_type.as_i64(),
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == ErrorCode::ConstraintViolation
                && f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            Error::invalid_input(format!("an item named `{}` already exists here", item.name))
        }
        other => db_error(other),
    })?;
    Ok(())
}

/// Insert a batch of entries in order.
///
/// Parents must precede their children. Run inside a transaction to make
/// the batch atomic.
pub fn insert_entries(conn: &Connection, entries: &[NewEntry]) -> Result<()> {
    for entry in entries {
        insert_item(conn, entry.item())?;
        match entry {
            NewEntry::Directory(_) => {}
            NewEntry::NzbFile(item, segment_ids) => {
                let json =
                    serde_json::to_string(segment_ids).map_err(|e| Error::internal(e.to_string()))?;
                conn.execute(
                    "INSERT INTO dav_nzb_files (id, segment_ids) VALUES (?, ?)",
                    rusqlite::params![item.id.to_string(), json],
                )
                .map_err(db_error)?;
            }
            NewEntry::RarFile(item, parts) => {
                let json =
                    serde_json::to_string(parts).map_err(|e| Error::internal(e.to_string()))?;
                conn.execute(
                    "INSERT INTO dav_rar_files (id, rar_parts) VALUES (?, ?)",
                    rusqlite::params![item.id.to_string(), json],
                )
                .map_err(db_error)?;
            }
        }
    }
    Ok(())
}

pub fn get_item(conn: &Connection, id: DavItemId) -> Result<Option<DavItem>> {
    conn.query_row(
        &format!("SELECT {ITEM_COLUMNS} FROM dav_items WHERE id = ?"),
        [id.to_string()],
        parse_item_row,
    )
    .optional()
    .map_err(db_error)
}

/// Child of `parent_id` with the given name.
pub fn get_child(conn: &Connection, parent_id: DavItemId, name: &str) -> Result<Option<DavItem>> {
    conn.query_row(
        &format!("SELECT {ITEM_COLUMNS} FROM dav_items WHERE parent_id = ? AND name = ?"),
        rusqlite::params![parent_id.to_string(), name],
        parse_item_row,
    )
    .optional()
    .map_err(db_error)
}

/// Children of `parent_id`, sorted by name.
pub fn get_children(conn: &Connection, parent_id: DavItemId) -> Result<Vec<DavItem>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM dav_items WHERE parent_id = ? ORDER BY name"
        ))
        .map_err(db_error)?;
    let items = stmt
        .query_map([parent_id.to_string()], parse_item_row)
        .map_err(db_error)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(db_error)?;
    Ok(items)
}

pub fn get_nzb_file(conn: &Connection, id: DavItemId) -> Result<Option<DavNzbFile>> {
    conn.query_row(
        "SELECT segment_ids FROM dav_nzb_files WHERE id = ?",
        [id.to_string()],
        |row| {
            Ok(DavNzbFile {
                id,
                segment_ids: parse_json(0, &row.get::<_, String>(0)?)?,
            })
        },
    )
    .optional()
    .map_err(db_error)
}

pub fn get_rar_file(conn: &Connection, id: DavItemId) -> Result<Option<DavRarFile>> {
    conn.query_row(
        "SELECT rar_parts FROM dav_rar_files WHERE id = ?",
        [id.to_string()],
        |row| {
            Ok(DavRarFile {
                id,
                rar_parts: parse_json(0, &row.get::<_, String>(0)?)?,
            })
        },
    )
    .optional()
    .map_err(db_error)
}

/// Delete an item and everything below it. Returns whether it existed.
pub fn delete_item(conn: &Connection, id: DavItemId) -> Result<bool> {
    let deleted = conn
        .execute("DELETE FROM dav_items WHERE id = ?", [id.to_string()])
        .map_err(db_error)?;
    Ok(deleted > 0)
}

/// Total file size below a directory.
pub fn recursive_size(conn: &Connection, id: DavItemId) -> Result<u64> {
    let size: rusqlite::Result<i64> = if id == DavItemId::ROOT {
        conn.query_row(
            "SELECT COALESCE(SUM(file_size), 0) FROM dav_items",
            [],
            |row| row.get(0),
        )
    } else {
        conn.query_row(
            "WITH RECURSIVE tree(id, file_size) AS (
                 SELECT id, file_size FROM dav_items WHERE parent_id = :id
                 UNION ALL
                 SELECT d.id, d.file_size FROM dav_items d JOIN tree t ON d.parent_id = t.id
             )
             SELECT COALESCE(SUM(file_size), 0) FROM tree",
            named_params! { ":id": id.to_string() },
            |row| row.get(0),
        )
    };
    Ok(size.map_err(db_error)?.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{get_conn, init_memory_pool};
    use nzbdav_common::RarPart;

    #[test]
    fn test_seeded_roots() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let root = get_item(&conn, DavItemId::ROOT).unwrap().unwrap();
        assert_eq!(root.name, "/");
        assert_eq!(root.parent_id, None);

        let children = get_children(&conn, DavItemId::ROOT).unwrap();
        let names: Vec<_> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["completed-symlinks", "content", "nzbs"]);

        let content = get_child(&conn, DavItemId::ROOT, "content").unwrap().unwrap();
        assert_eq!(content.id, DavItemId::CONTENT);
        let symlinks = get_item(&conn, DavItemId::SYMLINKS).unwrap().unwrap();
        assert_eq!(symlinks.item_type, ItemType::SymlinkRoot);
    }

    #[test]
    fn test_sibling_names_unique() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        insert_item(&conn, &DavItem::directory(DavItemId::CONTENT, "tv")).unwrap();
        let err = insert_item(&conn, &DavItem::directory(DavItemId::CONTENT, "tv")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        // Same name under a different parent is fine.
        insert_item(&conn, &DavItem::directory(DavItemId::NZBS, "tv")).unwrap();
    }

    #[test]
    fn test_insert_entries_and_lookups() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let folder = DavItem::directory(DavItemId::CONTENT, "job");
        let plain = DavItem::nzb_file(folder.id, "a.mkv", 2500);
        let member = DavItem::rar_file(folder.id, "b.mkv", 300);
        let parts = vec![
            RarPart {
                segment_ids: vec!["v1@x".into()],
                part_size: 250,
                offset: 50,
                byte_count: 200,
            },
            RarPart {
                segment_ids: vec!["v2@x".into()],
                part_size: 150,
                offset: 50,
                byte_count: 100,
            },
        ];
        insert_entries(
            &conn,
            &[
                NewEntry::Directory(folder.clone()),
                NewEntry::NzbFile(plain.clone(), vec!["s1@x".into(), "s2@x".into()]),
                NewEntry::RarFile(member.clone(), parts.clone()),
            ],
        )
        .unwrap();

        let nzb = get_nzb_file(&conn, plain.id).unwrap().unwrap();
        assert_eq!(nzb.segment_ids, vec!["s1@x", "s2@x"]);
        let rar = get_rar_file(&conn, member.id).unwrap().unwrap();
        assert_eq!(rar.rar_parts, parts);
        assert!(get_nzb_file(&conn, member.id).unwrap().is_none());

        let loaded = get_item(&conn, plain.id).unwrap().unwrap();
        assert_eq!(loaded.file_size, Some(2500));
        assert_eq!(loaded.item_type, ItemType::NzbFile);
        assert_eq!(loaded.parent_id, Some(folder.id));
    }

    #[test]
    fn test_recursive_size_and_cascade() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let category = DavItem::directory(DavItemId::CONTENT, "movies");
        let job = DavItem::directory(category.id, "job");
        let sub = DavItem::directory(job.id, "extras");
        insert_entries(
            &conn,
            &[
                NewEntry::Directory(category.clone()),
                NewEntry::Directory(job.clone()),
                NewEntry::Directory(sub.clone()),
                NewEntry::NzbFile(DavItem::nzb_file(job.id, "a.mkv", 1000), vec!["a@x".into()]),
                NewEntry::NzbFile(DavItem::nzb_file(sub.id, "b.mkv", 24), vec!["b@x".into()]),
            ],
        )
        .unwrap();

        assert_eq!(recursive_size(&conn, category.id).unwrap(), 1024);
        assert_eq!(recursive_size(&conn, sub.id).unwrap(), 24);
        assert_eq!(recursive_size(&conn, DavItemId::ROOT).unwrap(), 1024);

        assert!(delete_item(&conn, job.id).unwrap());
        assert!(get_children(&conn, category.id).unwrap().is_empty());
        assert!(get_item(&conn, sub.id).unwrap().is_none());
        assert!(!delete_item(&conn, job.id).unwrap());
    }
}
