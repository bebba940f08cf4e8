//! Store configuration
//!
//! Configuration is read from `store.toml` in the storage root. Every key is
//! optional; a missing file means defaults.

use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use super::error::{Result, StoreError};
use super::lock::LockPolicy;
use super::paths::{PathResolver, TASKS_COLLECTION};
use super::retry::RetryPolicy;

/// File name of the configuration inside the storage root
pub const CONFIG_FILE: &str = "store.toml";

/// Directory under the home directory used when no root is given
pub const DEFAULT_ROOT_DIR: &str = ".critical-claude";

/// Largest item file loaded from an item-per-file collection (1MB)
pub const DEFAULT_MAX_ITEM_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Collections stored as one file per item
    pub item_per_file: Vec<String>,

    /// Item files above this size are skipped on load
    pub max_item_bytes: u64,

    /// Lock acquisition budget
    pub lock: LockPolicy,

    /// Retry budget for writes
    pub retry: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            item_per_file: vec![TASKS_COLLECTION.to_string()],
            max_item_bytes: DEFAULT_MAX_ITEM_BYTES,
            lock: LockPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Loads `store.toml` from `root`, falling back to defaults if absent
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Builds the path resolver for a root using this layout assignment
    pub fn resolver(&self, root: impl Into<PathBuf>) -> PathResolver {
        PathResolver::with_item_per_file(root, self.item_per_file.iter().cloned())
    }

    /// Returns `~/.critical-claude`, if a home directory can be determined
    pub fn default_root() -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| dirs.home_dir().join(DEFAULT_ROOT_DIR))
    }
}
