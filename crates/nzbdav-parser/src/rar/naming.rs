//! Volume naming conventions.
//!
//! Recognized forms, case-insensitively: `name.rar`, `name.r00`,
//! `name.r01`, ... and `name.part01.rar`, `name.part02.rar`, ...

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

static OLD_STYLE_VOLUME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.r(\d+)$").expect("valid volume regex"));
static PART_VOLUME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.part(\d+)\.rar$").expect("valid part regex"));
static PART_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.part\d+$").expect("valid part suffix regex"));

/// Whether a file name looks like a RAR volume.
///
/// ```
/// use nzbdav_parser::rar::is_rar_file;
///
/// assert!(is_rar_file("Movie.part01.rar"));
/// assert!(is_rar_file("movie.R07"));
/// assert!(!is_rar_file("movie.mkv"));
/// ```
pub fn is_rar_file(name: &str) -> bool {
    name.to_lowercase().ends_with(".rar") || OLD_STYLE_VOLUME.is_match(name)
}

/// The archive a volume belongs to: the name without its extension and
/// without a `.partNN` suffix.
pub fn archive_name(name: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(name);
    PART_SUFFIX.replace(stem, "").into_owned()
}

/// Volume number. A bare `.rar` is volume 0.
pub fn part_number(name: &str) -> u32 {
    PART_VOLUME
        .captures(name)
        .or_else(|| OLD_STYLE_VOLUME.captures(name))
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse().ok())
        .unwrap_or(0)
}

/// Sort key placing volumes in reading order.
///
/// A bare `.rar` and `.r00` share part number 0; the bare `.rar` comes first
/// since old-style sets start with it.
pub fn volume_order(name: &str) -> (u32, bool) {
    let numbered = PART_VOLUME.is_match(name) || OLD_STYLE_VOLUME.is_match(name);
    (part_number(name), numbered)
}
