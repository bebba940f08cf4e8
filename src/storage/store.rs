//! The collection store
//!
//! [`Store`] is the CRUD surface over a storage root. Each collection is
//! loaded from disk the first time it is touched and then served from memory
//! for the life of the `Store`. Mutations take the collection's lock before
//! loading, then update the cache and persist before returning.
//!
//! The cache is never refreshed from disk on its own. A long-lived `Store`
//! does not see writes made by other processes to a collection it has already
//! loaded, so the store is not linearizable across processes. Call
//! [`Store::invalidate`] to force a reload.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::atomic::atomic_write_json;
use super::backup::{self, Snapshot};
use super::collection::{item_id, sorted_items, Change, CollectionFiles, Item, ItemMap};
use super::config::StoreConfig;
use super::error::{Result, StoreError};
use super::lock::{CollectionLock, LockManager};
use super::paths::{is_safe_component, Layout, PathResolver};

#[derive(Debug, Default)]
struct CacheEntry {
    items: ItemMap,
    loaded: bool,
}

type SharedEntry = Arc<Mutex<CacheEntry>>;

/// A collection-oriented JSON store rooted at one directory
#[derive(Debug)]
pub struct Store {
    files: CollectionFiles,
    config: StoreConfig,
    locks: LockManager,
    cache: Mutex<HashMap<String, SharedEntry>>,
}

impl Store {
    /// Opens the store at `root`, reading `store.toml` there if present
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let config = StoreConfig::load(&root)?;
        Ok(Self::with_config(root, config))
    }

    pub fn with_config(root: impl Into<PathBuf>, config: StoreConfig) -> Self {
        let resolver = config.resolver(root);
        Self {
            files: CollectionFiles::new(resolver, config.max_item_bytes),
            locks: LockManager::new(config.lock),
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        self.resolver().root()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn resolver(&self) -> &PathResolver {
        self.files.resolver()
    }

    /// Inserts or replaces the item stored under `id`.
    ///
    /// Object items without an `id` field get one; items whose `id` differs
    /// from `id` are rejected.
    pub fn save(&self, collection: &str, id: &str, item: Item) -> Result<()> {
        self.check_id(collection, id)?;
        let item = stamp_id(id, item)?;

        let _lock = self.lock(collection)?;
        let entry = self.ensure_loaded(collection)?;
        let mut entry = lock_entry(&entry);

        let previous = entry.items.insert(id.to_string(), item);
        if let Err(e) = self.persist(collection, &entry.items, Change::Upserted(id)) {
            match previous {
                Some(previous) => entry.items.insert(id.to_string(), previous),
                None => entry.items.remove(id),
            };
            return Err(e);
        }

        tracing::debug!(collection, id, "saved item");
        Ok(())
    }

    /// Serializes `value` and saves it under `id`
    pub fn save_as<T: Serialize>(&self, collection: &str, id: &str, value: &T) -> Result<()> {
        self.save(collection, id, serde_json::to_value(value)?)
    }

    pub fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Item>> {
        let entry = self.ensure_loaded(collection)?;
        let entry = lock_entry(&entry);
        Ok(entry.items.get(id).cloned())
    }

    /// Looks up an item and deserializes it into `T`
    pub fn find_by_id_as<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>> {
        self.find_by_id(collection, id)?
            .map(serde_json::from_value)
            .transpose()
            .map_err(StoreError::from)
    }

    /// Every item in the collection, in no particular order
    pub fn find_all(&self, collection: &str) -> Result<Vec<Item>> {
        let entry = self.ensure_loaded(collection)?;
        let entry = lock_entry(&entry);
        Ok(entry.items.values().cloned().collect())
    }

    pub fn find<P>(&self, collection: &str, predicate: P) -> Result<Vec<Item>>
    where
        P: Fn(&Item) -> bool,
    {
        let entry = self.ensure_loaded(collection)?;
        let entry = lock_entry(&entry);
        Ok(entry
            .items
            .values()
            .filter(|item| predicate(item))
            .cloned()
            .collect())
    }

    /// Removes an item. Returns false if there was nothing to remove.
    pub fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        if let Some(entry) = self.loaded_entry(collection) {
            if !lock_entry(&entry).items.contains_key(id) {
                return Ok(false);
            }
        }

        let _lock = self.lock(collection)?;
        let entry = self.ensure_loaded(collection)?;
        let mut entry = lock_entry(&entry);

        // Another caller may have removed it while we waited for the lock
        let Some(previous) = entry.items.remove(id) else {
            return Ok(false);
        };

        if let Err(e) = self.persist(collection, &entry.items, Change::Removed(id)) {
            entry.items.insert(id.to_string(), previous);
            return Err(e);
        }

        tracing::debug!(collection, id, "deleted item");
        Ok(true)
    }

    pub fn count(&self, collection: &str) -> Result<usize> {
        let entry = self.ensure_loaded(collection)?;
        let entry = lock_entry(&entry);
        Ok(entry.items.len())
    }

    pub fn exists(&self, collection: &str, id: &str) -> Result<bool> {
        let entry = self.ensure_loaded(collection)?;
        let entry = lock_entry(&entry);
        Ok(entry.items.contains_key(id))
    }

    /// Removes every item and persists the empty collection
    pub fn clear(&self, collection: &str) -> Result<()> {
        self.replace(collection, ItemMap::new())
    }

    /// Replaces the whole collection with `items` (not a merge)
    pub fn save_all(&self, collection: &str, items: Vec<Item>) -> Result<()> {
        let mut replacement = ItemMap::with_capacity(items.len());
        for item in items {
            let id = item_id(&item)
                .ok_or_else(|| StoreError::InvalidItem(item.to_string()))?
                .to_string();
            self.check_id(collection, &id)?;
            replacement.insert(id, item);
        }

        self.replace(collection, replacement)
    }

    fn replace(&self, collection: &str, replacement: ItemMap) -> Result<()> {
        let _lock = self.lock(collection)?;
        let entry = self.ensure_loaded(collection)?;
        let mut entry = lock_entry(&entry);

        let previous = std::mem::replace(&mut entry.items, replacement);
        if let Err(e) = self.persist(collection, &entry.items, Change::Replaced) {
            entry.items = previous;
            return Err(e);
        }

        tracing::debug!(collection, count = entry.items.len(), "replaced collection");
        Ok(())
    }

    /// Drops a collection from the cache so the next access reads it from disk
    pub fn invalidate(&self, collection: &str) {
        self.cache().remove(collection);
    }

    /// Names of every collection loaded here or present on disk
    pub fn collections(&self) -> Result<Vec<String>> {
        let mut names: BTreeSet<String> = self.loaded_collections().into_iter().collect();
        names.extend(backup::discover_collections(self.resolver())?);
        Ok(names.into_iter().collect())
    }

    /// Writes a snapshot of every collection to `<root>/backup-<timestamp>.json`.
    ///
    /// Loaded collections are taken from the cache; collections found on disk
    /// but not loaded are read without being added to the cache.
    pub fn backup(&self) -> Result<PathBuf> {
        let mut snapshot = Snapshot::new();

        for name in self.loaded_collections() {
            let entry = self.cache().get(&name).cloned();
            if let Some(entry) = entry {
                let entry = lock_entry(&entry);
                if entry.loaded {
                    let items = sorted_items(&entry.items).into_iter().cloned().collect();
                    snapshot.insert(name, items);
                }
            }
        }

        for name in backup::discover_collections(self.resolver())? {
            if snapshot.contains_key(&name) {
                continue;
            }
            let items = self.files.load(&name)?;
            snapshot.insert(name, sorted_items(&items).into_iter().cloned().collect());
        }

        let path = self
            .resolver()
            .backup_path(&backup::file_stamp(Utc::now()));
        self.config.retry.run("write backup", || {
            let root = self.root();
            fs::create_dir_all(root).map_err(|e| StoreError::io(root, e))?;
            atomic_write_json(&path, &snapshot)
        })?;

        tracing::debug!(path = %path.display(), collections = snapshot.len(), "wrote backup");
        Ok(path)
    }

    /// Replaces every collection named in a backup with its snapshot contents.
    ///
    /// Collections not in the backup are left alone. Returns the number of
    /// collections restored.
    pub fn restore(&self, backup_path: &Path) -> Result<usize> {
        let snapshot = backup::read_backup(backup_path)?;
        for name in snapshot.keys() {
            check_collection(name)?;
        }

        let count = snapshot.len();
        for (name, items) in snapshot {
            self.save_all(&name, items)?;
        }
        Ok(count)
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, SharedEntry>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn loaded_collections(&self) -> Vec<String> {
        self.cache().keys().cloned().collect()
    }

    /// Returns the cache entry only if the collection is already loaded
    fn loaded_entry(&self, collection: &str) -> Option<SharedEntry> {
        let shared = self.cache().get(collection).cloned()?;
        let loaded = lock_entry(&shared).loaded;
        loaded.then_some(shared)
    }

    /// Returns the collection's cache entry, reading it from disk on first use
    fn ensure_loaded(&self, collection: &str) -> Result<SharedEntry> {
        check_collection(collection)?;

        let shared = Arc::clone(self.cache().entry(collection.to_string()).or_default());
        let mut entry = lock_entry(&shared);
        if entry.loaded {
            return Ok(Arc::clone(&shared));
        }

        if self.resolver().layout(collection) == Layout::ItemPerFile {
            let dir = self.resolver().collection_dir(collection);
            self.config
                .retry
                .run(&format!("create {}", dir.display()), || {
                    fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))
                })?;
        }

        entry.items = self.files.load(collection)?;
        entry.loaded = true;
        tracing::debug!(collection, count = entry.items.len(), "loaded collection");

        drop(entry);
        Ok(shared)
    }

    fn lock(&self, collection: &str) -> Result<CollectionLock<'_>> {
        check_collection(collection)?;
        self.locks
            .acquire(collection, &self.resolver().lock_path(collection))
    }

    fn persist(&self, collection: &str, items: &ItemMap, change: Change<'_>) -> Result<()> {
        self.config
            .retry
            .run(&format!("persist {}", collection), || {
                self.files.persist(collection, items, change)
            })
    }

    /// Item ids become file names in item-per-file collections
    fn check_id(&self, collection: &str, id: &str) -> Result<()> {
        let valid = match self.resolver().layout(collection) {
            Layout::ItemPerFile => is_safe_component(id),
            Layout::SingleArrayFile => !id.is_empty(),
        };
        if valid {
            Ok(())
        } else {
            Err(StoreError::InvalidId(id.to_string()))
        }
    }
}

fn check_collection(collection: &str) -> Result<()> {
    if is_safe_component(collection) {
        Ok(())
    } else {
        Err(StoreError::InvalidCollection(collection.to_string()))
    }
}

fn lock_entry(entry: &Mutex<CacheEntry>) -> MutexGuard<'_, CacheEntry> {
    entry.lock().unwrap_or_else(|e| e.into_inner())
}

/// Ensures an item carries `id` in its `id` field
fn stamp_id(id: &str, mut item: Item) -> Result<Item> {
    let Some(object) = item.as_object_mut() else {
        return Err(StoreError::InvalidItem(id.to_string()));
    };

    match object.get("id") {
        None => {
            object.insert("id".to_string(), Value::String(id.to_string()));
        }
        Some(Value::String(found)) if found == id => {}
        Some(found) => {
            return Err(StoreError::IdMismatch {
                expected: id.to_string(),
                found: match found {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
            });
        }
    }

    Ok(item)
}
