use nzbdav_common::{paths, Error, Result};
use nzbdav_db::models::NewEntry;

/// Fail unless at least one new file entry is an importable video.
pub fn ensure_importable_video(entries: &[NewEntry]) -> Result<()> {
    let has_video = entries
        .iter()
        .map(NewEntry::item)
        .any(|item| !item.item_type.is_directory() && paths::is_video_file(&item.name));
    if has_video {
        Ok(())
    } else {
        Err(Error::NoVideoFiles("No importable videos found.".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nzbdav_common::DavItemId;
    use nzbdav_db::models::DavItem;

    #[test]
    fn test_video_file_passes() {
        let mount = DavItemId::new();
        let entries = vec![
            NewEntry::NzbFile(DavItem::nzb_file(mount, "readme.nfo", 1), vec![]),
            NewEntry::RarFile(DavItem::rar_file(mount, "Movie.MKV", 1), vec![]),
        ];
        assert!(ensure_importable_video(&entries).is_ok());
    }

    #[test]
    fn test_directory_named_like_video_fails() {
        let mount = DavItemId::new();
        let entries = vec![
            NewEntry::Directory(DavItem::directory(mount, "clip.mkv")),
            NewEntry::NzbFile(DavItem::nzb_file(mount, "sample.srt", 1), vec![]),
        ];
        let err = ensure_importable_video(&entries).unwrap_err();
        assert!(matches!(err, Error::NoVideoFiles(_)));
        assert!(err.is_non_retryable());
    }
}
