//! File name heuristics for NZB subjects.
//!
//! Posters put the file name in the subject line in many different ways.
//! The subject is tried first; the yEnc header name of the first segment
//! is the fallback, which costs a segment fetch.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

/// `[1/8] - "file.mkv" yEnc 12345 (1/54321)`
static QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#""(.*)""#).expect("valid quoted regex"));

/// sabnzbd's subject file name pattern.
static SABNZBD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b([\w\-+()' .,]+(?:\[[\w\-/+()' .,]*\][\w\-+()' .,]*)*\.[A-Za-z0-9]{2,4})\b",
    )
    .expect("valid sabnzbd regex")
});

/// Best file name found in a subject, or an empty string.
///
/// ```
/// use nzbdav_parser::filename::subject_file_name;
///
/// assert_eq!(subject_file_name(r#"[1/8] - "show.mkv" yEnc (1/50)"#), "show.mkv");
/// assert_eq!(subject_file_name("show.s01e01.mkv (1/50)"), "show.s01e01.mkv");
/// ```
pub fn subject_file_name(subject: &str) -> String {
    let candidates = [capture(&QUOTED, subject), capture(&SABNZBD, subject)];
    candidates
        .into_iter()
        .find(|name| !name.is_empty() && is_bare_file_name(name))
        .unwrap_or_default()
}

/// Whether `name` has an extension of 2 to 4 characters.
pub fn has_plausible_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| (2..=4).contains(&ext.chars().count()))
        .unwrap_or(false)
}

/// Pick between the subject name and the segment header name.
///
/// Only call this when the subject name alone is not convincing, i.e. when
/// [`has_plausible_extension`] is false for it.
pub fn choose_file_name(subject_name: String, header_name: String) -> String {
    if subject_name.is_empty() || has_plausible_extension(&header_name) {
        return header_name;
    }
    subject_name
}

fn capture(pattern: &Regex, subject: &str) -> String {
    pattern
        .captures(subject)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

fn is_bare_file_name(name: &str) -> bool {
    !name.contains(['/', '\\'])
}
