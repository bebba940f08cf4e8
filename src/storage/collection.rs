//! On-disk collection formats
//!
//! Translates between the in-memory item map of a collection and its files:
//!
//! - item-per-file: `<root>/<collection>/<id>.json`, one pretty-printed item
//!   per file. The directory listing is the collection.
//! - single-array-file: `<root>/<collection>.json`, a JSON array of items.
//!
//! Loading is forgiving. A corrupt item file is skipped with a warning, and a
//! missing or corrupt array file reads as an empty collection.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde_json::Value;

use super::atomic::atomic_write_json;
use super::error::{Result, StoreError};
use super::paths::{Layout, Location, PathResolver};

/// An opaque JSON record carrying a string `id` field
pub type Item = Value;

/// Items of one collection keyed by id
pub type ItemMap = HashMap<String, Item>;

/// Prefix of item files quarantined by hand; never loaded
pub const QUARANTINE_PREFIX: &str = "corrupted-";

/// Returns the `id` field of an item, if it is a string
pub fn item_id(item: &Item) -> Option<&str> {
    item.get("id").and_then(Value::as_str)
}

/// The part of the collection that changed, so item-per-file collections can
/// avoid rewriting every file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change<'a> {
    Upserted(&'a str),
    Removed(&'a str),
    /// The whole collection was replaced (`save_all`, `clear`)
    Replaced,
}

/// Reads and writes collections under one storage root
#[derive(Debug, Clone)]
pub struct CollectionFiles {
    resolver: PathResolver,
    max_item_bytes: u64,
}

impl CollectionFiles {
    pub fn new(resolver: PathResolver, max_item_bytes: u64) -> Self {
        Self {
            resolver,
            max_item_bytes,
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Reads a collection from disk. Never fails on bad content, only on I/O.
    pub fn load(&self, collection: &str) -> Result<ItemMap> {
        match self.resolver.location(collection) {
            Location::Directory(dir) => self.load_dir(&dir),
            Location::File(path) => load_array_file(&path),
        }
    }

    /// Reads an item-per-file directory without creating it
    pub fn load_dir(&self, dir: &Path) -> Result<ItemMap> {
        let mut items = ItemMap::new();

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(items),
            Err(e) => return Err(StoreError::io(dir, e)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(dir, e))?;
            let path = entry.path();

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !is_item_file_name(name) {
                continue;
            }

            // The file name is where the item is written and removed, so it
            // must agree with the id inside
            let stem = name.strip_suffix(".json").unwrap_or(name);

            match self.read_item_file(&path) {
                Ok(item) => {
                    match item_id(&item) {
                        Some(id) if id == stem => {
                            items.insert(id.to_string(), item);
                        }
                        Some(id) => {
                            tracing::warn!(path = %path.display(), id, "skipping item whose id does not match its file name");
                        }
                        None => {
                            tracing::warn!(path = %path.display(), "skipping item without a string id");
                        }
                    }
                }
                Err(reason) => {
                    tracing::warn!(path = %path.display(), reason = %reason, "skipping unreadable item file");
                }
            }
        }

        tracing::debug!(dir = %dir.display(), count = items.len(), "loaded item directory");
        Ok(items)
    }

    fn read_item_file(&self, path: &Path) -> std::result::Result<Item, String> {
        let meta = fs::metadata(path).map_err(|e| e.to_string())?;
        if !meta.is_file() {
            return Err("not a regular file".to_string());
        }
        if meta.len() > self.max_item_bytes {
            return Err(format!(
                "file is {} bytes, limit is {}",
                meta.len(),
                self.max_item_bytes
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
        serde_json::from_str(&content).map_err(|e| e.to_string())
    }

    /// Writes the changed part of a collection to disk
    pub fn persist(&self, collection: &str, items: &ItemMap, change: Change<'_>) -> Result<()> {
        match self.resolver.layout(collection) {
            Layout::SingleArrayFile => {
                let root = self.resolver.root();
                fs::create_dir_all(root).map_err(|e| StoreError::io(root, e))?;
                atomic_write_json(&self.resolver.collection_file(collection), &sorted_items(items))
            }
            Layout::ItemPerFile => {
                let dir = self.resolver.collection_dir(collection);
                fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

                match change {
                    Change::Upserted(id) => self.write_item(collection, id, items),
                    Change::Removed(id) => self.remove_item(collection, id),
                    Change::Replaced => {
                        for id in items.keys() {
                            self.write_item(collection, id, items)?;
                        }
                        self.prune_dir(&dir, items)
                    }
                }
            }
        }
    }

    fn write_item(&self, collection: &str, id: &str, items: &ItemMap) -> Result<()> {
        match items.get(id) {
            Some(item) => atomic_write_json(&self.resolver.item_path(collection, id), item),
            None => self.remove_item(collection, id),
        }
    }

    fn remove_item(&self, collection: &str, id: &str) -> Result<()> {
        let path = self.resolver.item_path(collection, id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    /// Removes item files whose id is no longer in `items`
    fn prune_dir(&self, dir: &Path, items: &ItemMap) -> Result<()> {
        for entry in fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))? {
            let path = entry.map_err(|e| StoreError::io(dir, e))?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !is_item_file_name(name) {
                continue;
            }

            let stem = name.strip_suffix(".json").unwrap_or(name);
            if !items.contains_key(stem) {
                fs::remove_file(&path).map_err(|e| StoreError::io(&path, e))?;
            }
        }
        Ok(())
    }
}

/// True for `*.json` names that are neither hidden nor quarantined
fn is_item_file_name(name: &str) -> bool {
    name.ends_with(".json") && !name.starts_with('.') && !name.starts_with(QUARANTINE_PREFIX)
}

/// Reads a single-array collection file
pub fn load_array_file(path: &Path) -> Result<ItemMap> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ItemMap::new()),
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            tracing::warn!(path = %path.display(), "collection file is not UTF-8, starting empty");
            return Ok(ItemMap::new());
        }
        Err(e) => return Err(StoreError::io(path, e)),
    };

    match serde_json::from_str::<Value>(&content) {
        Ok(value) => Ok(index_items(value, path)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "collection file is corrupt, starting empty");
            Ok(ItemMap::new())
        }
    }
}

/// Indexes either an array of items or an object keyed by id
fn index_items(value: Value, path: &Path) -> ItemMap {
    let mut items = ItemMap::new();

    match value {
        Value::Array(list) => {
            for item in list {
                match item_id(&item) {
                    Some(id) => {
                        items.insert(id.to_string(), item);
                    }
                    None => {
                        tracing::warn!(path = %path.display(), "skipping array entry without a string id");
                    }
                }
            }
        }
        Value::Object(map) => {
            items.extend(map);
        }
        _ => {
            tracing::warn!(path = %path.display(), "collection file is neither an array nor an object, starting empty");
        }
    }

    items
}

/// Items ordered by id, for stable file contents
pub fn sorted_items(items: &ItemMap) -> Vec<&Item> {
    let mut sorted: Vec<_> = items.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    sorted.into_iter().map(|(_, item)| item).collect()
}
