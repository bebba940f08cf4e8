//! Mapping from collection names to on-disk locations
//!
//! Each collection has a fixed physical [`Layout`]. The mapping is pure: no
//! function here touches the filesystem.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Name of the collection stored one file per item unless configured otherwise
pub const TASKS_COLLECTION: &str = "tasks";

/// Prefix of backup snapshot files in the storage root
pub const BACKUP_PREFIX: &str = "backup-";

/// Physical format of a collection on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `<root>/<collection>/<id>.json`, one pretty-printed file per item
    ItemPerFile,
    /// `<root>/<collection>.json`, a JSON array of every item
    SingleArrayFile,
}

/// Where a collection's items live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Directory(PathBuf),
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    item_per_file: BTreeSet<String>,
}

impl PathResolver {
    /// Creates a resolver with the default layout assignment (`tasks` only)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_item_per_file(root, [TASKS_COLLECTION.to_string()])
    }

    pub fn with_item_per_file(
        root: impl Into<PathBuf>,
        collections: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            root: root.into(),
            item_per_file: collections.into_iter().collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self, collection: &str) -> Layout {
        if self.item_per_file.contains(collection) {
            Layout::ItemPerFile
        } else {
            Layout::SingleArrayFile
        }
    }

    /// Collections assigned the item-per-file layout
    pub fn item_per_file_collections(&self) -> impl Iterator<Item = &str> {
        self.item_per_file.iter().map(String::as_str)
    }

    pub fn location(&self, collection: &str) -> Location {
        match self.layout(collection) {
            Layout::ItemPerFile => Location::Directory(self.collection_dir(collection)),
            Layout::SingleArrayFile => Location::File(self.collection_file(collection)),
        }
    }

    /// `<root>/<collection>.json`
    pub fn collection_file(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{}.json", collection))
    }

    /// `<root>/<collection>/`
    pub fn collection_dir(&self, collection: &str) -> PathBuf {
        self.root.join(collection)
    }

    /// Path of a single item file inside an item-per-file collection
    pub fn item_path(&self, collection: &str, id: &str) -> PathBuf {
        self.collection_dir(collection).join(format!("{}.json", id))
    }

    /// Lock file path, `.<collection>.lock` in the root regardless of layout
    pub fn lock_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!(".{}.lock", collection))
    }

    /// Backup file path for an already formatted timestamp
    pub fn backup_path(&self, stamp: &str) -> PathBuf {
        self.root.join(format!("{}{}.json", BACKUP_PREFIX, stamp))
    }
}

/// Checks that a name can be used as a single path component.
///
/// Used for both collection names and item ids before they reach the resolver.
pub fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
}
