//! Backup snapshots
//!
//! A snapshot is one JSON object keyed by collection name, each value an array
//! of that collection's items, written to `<root>/backup-<timestamp>.json`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};

use super::collection::{Item, QUARANTINE_PREFIX};
use super::error::{Result, StoreError};
use super::paths::{is_safe_component, Layout, PathResolver, BACKUP_PREFIX};

/// Collection name to its items, ordered for stable output
pub type Snapshot = BTreeMap<String, Vec<Item>>;

/// Formats `now` as an ISO-8601 timestamp usable in a file name,
/// e.g. `2026-10-18T09-30-05-123Z`
pub fn file_stamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

/// Finds collections present on disk under the resolver's root.
///
/// Single-array collections are `*.json` files in the root, excluding hidden
/// files, backups and quarantined files. Item-per-file collections are their
/// directories.
pub fn discover_collections(resolver: &PathResolver) -> Result<BTreeSet<String>> {
    let root = resolver.root();
    let mut found = BTreeSet::new();

    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(found),
        Err(e) => return Err(StoreError::io(root, e)),
    };

    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(root, e))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if path.is_dir() {
            if resolver.layout(name) == Layout::ItemPerFile {
                found.insert(name.to_string());
            }
            continue;
        }

        let Some(stem) = name.strip_suffix(".json") else {
            continue;
        };
        if stem.starts_with(BACKUP_PREFIX)
            || stem.starts_with(QUARANTINE_PREFIX)
            || !is_safe_component(stem)
        {
            continue;
        }
        if resolver.layout(stem) == Layout::SingleArrayFile {
            found.insert(stem.to_string());
        }
    }

    Ok(found)
}

/// Reads a snapshot written by [`crate::storage::Store::backup`]
pub fn read_backup(path: &Path) -> Result<Snapshot> {
    let content = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn stamp_replaces_colons_and_dots() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 5).unwrap()
            + chrono::Duration::milliseconds(123);

        assert_eq!(file_stamp(now), "2026-10-18T09-30-05-123Z");
    }

    #[test]
    fn discovers_both_layouts() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("tasks")).unwrap();
        fs::create_dir_all(root.join("unrelated-dir")).unwrap();
        fs::write(root.join("templates.json"), "[]").unwrap();
        fs::write(root.join("analytics.json"), "[]").unwrap();
        fs::write(root.join("backup-2026-01-01T00-00-00-000Z.json"), "{}").unwrap();
        fs::write(root.join("corrupted-templates.json"), "[]").unwrap();
        fs::write(root.join(".templates.lock"), "1").unwrap();
        fs::write(root.join("templates.json.tmp"), "[]").unwrap();
        fs::write(root.join("notes.txt"), "").unwrap();

        let found = discover_collections(&PathResolver::new(root)).unwrap();
        let found: Vec<_> = found.iter().map(String::as_str).collect();
        assert_eq!(found, vec!["analytics", "tasks", "templates"]);
    }

    #[test]
    fn missing_root_discovers_nothing() {
        let dir = TempDir::new().unwrap();
        let resolver = PathResolver::new(dir.path().join("absent"));

        assert!(discover_collections(&resolver).unwrap().is_empty());
    }
}
