//! Integration tests for serving tree entries over HTTP.

mod common;

use common::{data, TestHarness};
use nzbdav_common::{DavItemId, RarPart};
use nzbdav_db::models::{DavItem, NewEntry};
use nzbdav_db::queries::items;
use nzbdav_nntp::mock::MemoryClient;
use nzbdav_parser::rar::fixtures::Rar4Builder;

fn insert(h: &TestHarness, entry: NewEntry) -> DavItemId {
    let id = entry.item().id;
    let conn = h.conn();
    items::insert_entries(&conn, &[entry]).unwrap();
    id
}

#[tokio::test]
async fn range_request_fetches_only_covering_segments() {
    let bytes = data(2500);
    let mut provider = MemoryClient::new();
    let ids = provider.add_file("movie.mkv", &bytes, 1000);
    let h = TestHarness::new(provider);
    let id = insert(
        &h,
        NewEntry::NzbFile(DavItem::nzb_file(DavItemId::CONTENT, "movie.mkv", 2500), ids.clone()),
    );

    let (status, headers, body) = h
        .get(&format!("/items/{id}"), Some("bytes=1500-2200"))
        .await;

    assert_eq!(status, 206);
    assert_eq!(headers["content-range"], "bytes 1500-2200/2500");
    assert_eq!(headers["content-type"], "video/x-matroska");
    assert_eq!(body.len(), 701);
    assert_eq!(body, bytes[1500..=2200]);

    let fetched = h.provider.fetched_ids();
    assert!(!fetched.contains(&ids[0]), "first segment fetched: {fetched:?}");
    assert!(fetched.contains(&ids[1]));
    assert!(fetched.contains(&ids[2]));
}

#[tokio::test]
async fn full_request_returns_whole_file() {
    let bytes = data(4321);
    let mut provider = MemoryClient::new();
    let ids = provider.add_file("clip.mp4", &bytes, 1000);
    let h = TestHarness::new(provider);
    let id = insert(
        &h,
        NewEntry::NzbFile(DavItem::nzb_file(DavItemId::CONTENT, "clip.mp4", 4321), ids),
    );

    let (status, headers, body) = h.get(&format!("/items/{id}"), None).await;
    assert_eq!(status, 200);
    assert_eq!(headers["accept-ranges"], "bytes");
    assert_eq!(headers["content-length"], "4321");
    assert_eq!(body, bytes);
}

#[tokio::test]
async fn unsatisfiable_range_returns_whole_file() {
    let bytes = data(300);
    let mut provider = MemoryClient::new();
    let ids = provider.add_file("a.mkv", &bytes, 100);
    let h = TestHarness::new(provider);
    let id = insert(
        &h,
        NewEntry::NzbFile(DavItem::nzb_file(DavItemId::CONTENT, "a.mkv", 300), ids),
    );

    let (status, _, body) = h.get(&format!("/items/{id}"), Some("bytes=900-")).await;
    assert_eq!(status, 200);
    assert_eq!(body.len(), 300);
}

#[tokio::test]
async fn rar_member_served_across_volumes() {
    // One member split over three stored volumes.
    let member = data(9000);
    let chunks = [&member[..3500], &member[3500..7000], &member[7000..]];
    let mut provider = MemoryClient::new();
    let mut parts = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let volume = Rar4Builder::new().file("movie.mkv", chunk).finish();
        let data_start = volume
            .windows(chunk.len())
            .position(|w| w == *chunk)
            .unwrap() as u64;
        let ids = provider.add_file(&format!("movie.part{}.rar", i + 1), &volume, 1024);
        parts.push(RarPart {
            segment_ids: ids,
            part_size: volume.len() as u64,
            offset: data_start,
            byte_count: chunk.len() as u64,
        });
    }
    let h = TestHarness::new(provider);
    let id = insert(
        &h,
        NewEntry::RarFile(DavItem::rar_file(DavItemId::CONTENT, "movie.mkv", 9000), parts),
    );

    let (status, _, body) = h.get(&format!("/items/{id}"), None).await;
    assert_eq!(status, 200);
    assert_eq!(body, member);

    let (status, _, body) = h
        .get(&format!("/items/{id}"), Some("bytes=3400-7100"))
        .await;
    assert_eq!(status, 206);
    assert_eq!(body, member[3400..=7100]);
}

#[tokio::test]
async fn directories_and_unknown_items_are_rejected() {
    let h = TestHarness::new(MemoryClient::new());

    let (status, _, _) = h.get(&format!("/items/{}", DavItemId::CONTENT), None).await;
    assert_eq!(status, 400);

    let (status, _, _) = h.get(&format!("/items/{}", DavItemId::new()), None).await;
    assert_eq!(status, 404);

    let (status, _, _) = h.get("/items/not-a-uuid", None).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn item_health_reports_missing_segments() {
    let mut provider = MemoryClient::new();
    let mut ids = provider.add_file("show.mkv", &data(3000), 1000);
    let healthy_ids = ids.clone();
    ids.push("gone@memory".to_string());
    let h = TestHarness::new(provider);

    let healthy = insert(
        &h,
        NewEntry::NzbFile(DavItem::nzb_file(DavItemId::CONTENT, "show.mkv", 3000), healthy_ids),
    );
    let broken = insert(
        &h,
        NewEntry::NzbFile(DavItem::nzb_file(DavItemId::CONTENT, "broken.mkv", 4000), ids),
    );

    let (status, _, body) = h.get(&format!("/api/items/{healthy}/health"), None).await;
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["healthy"], true);

    let (status, _, body) = h.get(&format!("/api/items/{broken}/health"), None).await;
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["healthy"], false);
}
