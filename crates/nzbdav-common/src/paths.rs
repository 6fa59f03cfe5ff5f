//! File name classification by extension.

use std::path::Path;

/// Extensions treated as importable video, lowercase and without the dot.
const VIDEO_EXTENSIONS: &[&str] = &[
    "webm", "m4v", "3gp", "nsv", "ty", "strm", "rm", "rmvb", "m3u", "ifo", "mov", "qt", "divx",
    "xvid", "bivx", "nrg", "pva", "wmv", "asf", "asx", "ogm", "ogv", "m2v", "avi", "bin", "dat",
    "dvr-ms", "mpg", "mpeg", "mp4", "avc", "vp3", "svq3", "nuv", "viv", "dv", "fli", "flv", "wpl",
    "img", "iso", "vob", "mkv", "mk3d", "ts", "wtv", "m2ts",
];

/// Lowercased extension of a file name, if it has one.
///
/// ```
/// use nzbdav_common::paths::extension;
///
/// assert_eq!(extension("Movie.MKV").as_deref(), Some("mkv"));
/// assert_eq!(extension("README"), None);
/// ```
pub fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Check if a file name has a video extension.
///
/// ```
/// use nzbdav_common::paths::is_video_file;
///
/// assert!(is_video_file("show.s01e01.mkv"));
/// assert!(is_video_file("recording.dvr-ms"));
/// assert!(!is_video_file("show.nfo"));
/// ```
pub fn is_video_file(name: &str) -> bool {
    extension(name)
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Check if a file name is a par2 recovery file.
pub fn is_par2_file(name: &str) -> bool {
    extension(name).as_deref() == Some("par2")
}

/// Final component of a `/` or `\` separated path.
pub fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_extensions_case_insensitive() {
        assert!(is_video_file("a.MP4"));
        assert!(is_video_file("a.m2ts"));
        assert!(is_video_file("disc.iso"));
        assert!(!is_video_file("a.srt"));
        assert!(!is_video_file("mkv"));
    }

    #[test]
    fn test_par2() {
        assert!(is_par2_file("release.vol00+01.PAR2"));
        assert!(!is_par2_file("release.rar"));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("a/b/c.mkv"), "c.mkv");
        assert_eq!(file_name("a\\b.mkv"), "b.mkv");
        assert_eq!(file_name("c.mkv"), "c.mkv");
    }
}
