//! Turning processed files into directory tree entries.

use std::collections::{HashMap, HashSet};

use nzbdav_common::{DavItemId, Error, RarPart, Result};
use nzbdav_db::models::{DavItem, NewEntry};

use super::file_processors::{ProcessedFile, RarVolume};

/// Entries for every stored archive member, with the directories leading
/// to them.
///
/// Volumes are read in set order and each member's windows are collected
/// in that order, so a member split over several volumes gets its parts
/// front to back.
pub fn rar_entries(mount: DavItemId, files: &[ProcessedFile]) -> Vec<NewEntry> {
    let mut volumes: Vec<&RarVolume> = files
        .iter()
        .filter_map(|file| match file {
            ProcessedFile::RarVolume(volume) => Some(volume),
            ProcessedFile::Plain(_) => None,
        })
        .collect();
    volumes.sort_by_key(|volume| volume.sort_key());

    let mut members: Vec<(&str, Vec<RarPart>)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for volume in volumes {
        for entry in &volume.entries {
            let slot = *index.entry(entry.path.as_str()).or_insert_with(|| {
                members.push((entry.path.as_str(), Vec::new()));
                members.len() - 1
            });
            members[slot].1.push(RarPart {
                segment_ids: volume.segment_ids.clone(),
                part_size: volume.part_size,
                offset: entry.data_start,
                byte_count: entry.byte_count,
            });
        }
    }

    let mut out = Vec::new();
    let mut directories = DirectoryCache::new(mount);
    for (path, parts) in members {
        let Some((parent, name)) = directories.ensure_parent(path, &mut out) else {
            tracing::warn!(path, "archive member has an empty name, skipping");
            continue;
        };
        let size = parts.iter().map(|p| p.byte_count).sum();
        out.push(NewEntry::RarFile(DavItem::rar_file(parent, name, size), parts));
    }
    out
}

/// Entries for plain files. Files whose name could not be determined are
/// left out.
pub fn plain_entries(mount: DavItemId, files: &[ProcessedFile]) -> Vec<NewEntry> {
    files
        .iter()
        .filter_map(|file| match file {
            ProcessedFile::Plain(plain) if !plain.name.is_empty() => Some(NewEntry::NzbFile(
                DavItem::nzb_file(mount, plain.name.clone(), plain.file_size),
                plain.segment_ids.clone(),
            )),
            _ => None,
        })
        .collect()
}

/// Fail if two entries would share a name in the same folder, e.g. an
/// archive member and a plain file posted alongside it.
pub fn ensure_unique_names(entries: &[NewEntry]) -> Result<()> {
    let mut seen = HashSet::new();
    for entry in entries {
        let item = entry.item();
        if !seen.insert((item.parent_id, item.name.as_str())) {
            return Err(Error::InvalidNzb(format!(
                "the job contains more than one item named `{}` in the same folder",
                item.name
            )));
        }
    }
    Ok(())
}

/// Directories created during one aggregation, keyed by their path below
/// the mount folder.
struct DirectoryCache {
    mount: DavItemId,
    created: HashMap<String, DavItemId>,
}

impl DirectoryCache {
    fn new(mount: DavItemId) -> Self {
        Self {
            mount,
            created: HashMap::new(),
        }
    }

    /// Create any missing directories above `path` and return the parent id
    /// together with the final path component.
    fn ensure_parent<'a>(
        &mut self,
        path: &'a str,
        out: &mut Vec<NewEntry>,
    ) -> Option<(DavItemId, &'a str)> {
        let mut components: Vec<&str> = path.split(['/', '\\']).filter(|c| !c.is_empty()).collect();
        let name = components.pop()?;

        let mut parent = self.mount;
        let mut key = String::new();
        for component in components {
            if !key.is_empty() {
                key.push('/');
            }
            key.push_str(component);
            parent = match self.created.get(&key) {
                Some(id) => *id,
                None => {
                    let dir = DavItem::directory(parent, component);
                    let id = dir.id;
                    out.push(NewEntry::Directory(dir));
                    self.created.insert(key.clone(), id);
                    id
                }
            };
        }
        Some((parent, name))
    }
}
