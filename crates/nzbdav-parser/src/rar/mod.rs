//! Stored-entry indexing for RAR volumes.
//!
//! Only the layout of stored (uncompressed) members is extracted: for each
//! file in a volume, where its bytes start and how many of them the volume
//! holds. Member data is skipped by seeking, so only header bytes are read.
//!
//! Both RAR4 and RAR5 volumes are understood. Compressed members fail with
//! [`Error::UnsupportedCompression`]; encrypted headers or members fail with
//! [`Error::PasswordProtected`].

pub mod naming;
mod rar4;
mod rar5;
mod reader;

#[cfg(any(test, feature = "testing"))]
pub mod fixtures;

use nzbdav_common::{Error, Result};
use nzbdav_stream::SeekableStream;

pub use naming::{archive_name, is_rar_file, part_number, volume_order};

const RAR4_SIGNATURE: &[u8] = b"Rar!\x1a\x07\x00";
const RAR5_SIGNATURE: &[u8] = b"Rar!\x1a\x07\x01\x00";

/// Name RAR uses for its quick-open service record.
const QUICK_OPEN_NAME: &str = "QO";

/// One stored member's data inside a single volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// Member path within the archive, `/` separated.
    pub path: String,
    /// Offset of the member's first data byte within the volume.
    pub data_start: u64,
    /// Number of the member's bytes held by this volume.
    pub byte_count: u64,
}

/// Parse the headers of one RAR volume.
///
/// Directories and quick-open records are skipped. Parsing stops at the end
/// header, or as soon as too few bytes remain for another file header.
pub async fn read_stored_entries<S>(stream: &mut S) -> Result<Vec<StoredEntry>>
where
    S: SeekableStream + ?Sized,
{
    stream.seek(0)?;
    let mut signature = [0u8; 7];
    read_header_bytes(stream, &mut signature).await?;
    if signature == RAR4_SIGNATURE {
        return rar4::read_entries(stream).await;
    }
    if signature[..] == RAR5_SIGNATURE[..7] {
        let mut last = [0u8; 1];
        read_header_bytes(stream, &mut last).await?;
        if last[0] == RAR5_SIGNATURE[7] {
            return rar5::read_entries(stream).await;
        }
    }
    Err(Error::invalid_archive("missing RAR signature"))
}

/// Fill `buf` from the stream, treating a short read as a truncated header.
async fn read_header_bytes<S>(stream: &mut S, buf: &mut [u8]) -> Result<()>
where
    S: SeekableStream + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(Error::invalid_archive(format!(
                "archive ended inside a header at byte {}",
                stream.position()
            )));
        }
        filled += n;
    }
    Ok(())
}

/// Seek to `position`, failing if the volume is shorter than that.
fn seek_within<S>(stream: &mut S, position: u64) -> Result<()>
where
    S: SeekableStream + ?Sized,
{
    if position > stream.len() {
        return Err(Error::invalid_archive(format!(
            "header points to byte {position} past the end of a {} byte volume",
            stream.len()
        )));
    }
    stream.seek(position)?;
    Ok(())
}

/// Offset just past `size` bytes starting at `start`.
fn offset_after(start: u64, size: u64) -> Result<u64> {
    start.checked_add(size).ok_or_else(|| {
        Error::invalid_archive(format!(
            "header at byte {start} declares an impossible size of {size} bytes"
        ))
    })
}

/// Normalize a stored member name, or `None` if it should not be indexed.
fn member_path(raw: &[u8]) -> Option<String> {
    let name = String::from_utf8_lossy(raw).replace('\\', "/");
    if name.is_empty() || name == QUICK_OPEN_NAME {
        return None;
    }
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::fixtures::{Rar4Builder, Rar5Builder};
    use super::*;
    use assert_matches::assert_matches;
    use nzbdav_stream::MemoryStream;

    async fn entries(bytes: Vec<u8>) -> Result<Vec<StoredEntry>> {
        let mut stream = MemoryStream::new(bytes);
        read_stored_entries(&mut stream).await
    }

    #[tokio::test]
    async fn test_rar4_stored_members() {
        let archive = Rar4Builder::new()
            .file("movie.mkv", &[1u8; 500])
            .file("sub\\movie.srt", &[2u8; 40])
            .finish();
        let found = entries(archive.clone()).await.unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].path, "movie.mkv");
        assert_eq!(found[0].byte_count, 500);
        assert_eq!(found[1].path, "sub/movie.srt");
        assert_eq!(found[1].byte_count, 40);
        for entry in &found {
            let start = entry.data_start as usize;
            let fill = if entry.path.ends_with("mkv") { 1 } else { 2 };
            assert!(archive[start..start + entry.byte_count as usize]
                .iter()
                .all(|b| *b == fill));
        }
    }

    #[tokio::test]
    async fn test_rar4_skips_directories_and_quick_open() {
        let archive = Rar4Builder::new()
            .directory("Season 1")
            .file("QO", &[0u8; 10])
            .file("Season 1\\e01.mkv", &[3u8; 100])
            .finish();
        let found = entries(archive).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "Season 1/e01.mkv");
    }

    #[tokio::test]
    async fn test_rar4_compressed_member_is_rejected() {
        let archive = Rar4Builder::new()
            .file_with_method("movie.mkv", &[0u8; 64], 0x33)
            .finish();
        assert_matches!(entries(archive).await, Err(Error::UnsupportedCompression(_)));
    }

    #[tokio::test]
    async fn test_rar4_encryption_is_detected() {
        let archive = Rar4Builder::new().encrypted_member("a.mkv", &[0u8; 64]).finish();
        assert_matches!(entries(archive).await, Err(Error::PasswordProtected(_)));

        let archive = Rar4Builder::with_encrypted_headers().finish();
        assert_matches!(entries(archive).await, Err(Error::PasswordProtected(_)));
    }

    #[tokio::test]
    async fn test_rar4_large_sizes() {
        let archive = Rar4Builder::new().file_with_high_size("big.mkv", &[9u8; 32]).finish();
        let found = entries(archive).await.unwrap();
        assert_eq!(found[0].byte_count, 32);
    }

    #[tokio::test]
    async fn test_rar5_stored_members() {
        let archive = Rar5Builder::new()
            .file("movie.mkv", &[5u8; 700])
            .service("QO", &[0u8; 20])
            .directory("extras")
            .file("extras\\sample.mkv", &[6u8; 70])
            .finish();
        let found = entries(archive.clone()).await.unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].path, "movie.mkv");
        assert_eq!(found[0].byte_count, 700);
        assert_eq!(found[1].path, "extras/sample.mkv");
        let start = found[1].data_start as usize;
        assert!(archive[start..start + 70].iter().all(|b| *b == 6));
    }

    #[tokio::test]
    async fn test_rar5_compressed_member_is_rejected() {
        let archive = Rar5Builder::new()
            .file_with_method("movie.mkv", &[0u8; 64], 3)
            .finish();
        assert_matches!(entries(archive).await, Err(Error::UnsupportedCompression(_)));
    }

    #[tokio::test]
    async fn test_rar5_encryption_is_detected() {
        let archive = Rar5Builder::new().encrypted_member("a.mkv", &[0u8; 64]).finish();
        assert_matches!(entries(archive).await, Err(Error::PasswordProtected(_)));

        let archive = Rar5Builder::with_encrypted_headers().finish();
        assert_matches!(entries(archive).await, Err(Error::PasswordProtected(_)));
    }

    #[tokio::test]
    async fn test_bad_signature() {
        assert_matches!(
            entries(b"PK\x03\x04 not a rar".to_vec()).await,
            Err(Error::InvalidArchive(_))
        );
        assert_matches!(entries(b"Rar".to_vec()).await, Err(Error::InvalidArchive(_)));
    }

    #[tokio::test]
    async fn test_truncated_member_data() {
        let mut archive = Rar4Builder::new().file("movie.mkv", &[1u8; 500]).finish();
        archive.truncate(200);
        assert_matches!(entries(archive).await, Err(Error::InvalidArchive(_)));
    }

    #[tokio::test]
    async fn test_rar4_overflowing_packed_size() {
        let archive = Rar4Builder::new()
            .file_with_declared_size("movie.mkv", &[1u8; 64], u64::MAX)
            .finish();
        assert_matches!(entries(archive).await, Err(Error::InvalidArchive(_)));
    }

    #[tokio::test]
    async fn test_rar5_overflowing_data_size() {
        let archive = Rar5Builder::new()
            .file_with_declared_size("movie.mkv", &[1u8; 64], u64::MAX - 3)
            .finish();
        assert_matches!(entries(archive).await, Err(Error::InvalidArchive(_)));
    }

    #[test]
    fn test_offset_after_overflow() {
        assert_eq!(offset_after(10, 20).unwrap(), 30);
        assert_matches!(offset_after(u64::MAX - 1, 2), Err(Error::InvalidArchive(_)));
    }

    #[tokio::test]
    async fn test_stops_without_end_header() {
        // Trailing bytes too short to hold another file header are ignored.
        let mut archive = Rar5Builder::new().file("a.mkv", &[1u8; 50]).unfinished();
        archive.extend_from_slice(&[0u8; 6]);
        let found = entries(archive).await.unwrap();
        assert_eq!(found.len(), 1);
    }
}
