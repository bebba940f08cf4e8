//! # Storage Engine
//!
//! An embedded document store that keeps named collections of JSON items
//! under one root directory, caches them in memory, and coordinates writers
//! in different processes through lock files.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | `tasks` | One pretty-printed JSON file per item | `<root>/tasks/{id}.json` |
//! | Other collections | JSON array of items | `<root>/{collection}.json` |
//! | Locks | Holder pid as text | `<root>/.{collection}.lock` |
//! | Backups | JSON object of collection arrays | `<root>/backup-{timestamp}.json` |
//! | Config | TOML | `<root>/store.toml` |
//!
//! ## Concurrency Safety
//!
//! - Every mutation holds the collection's lock file ([`LockManager`]) while
//!   it writes; callers in the same process queue in arrival order
//! - All writes are atomic (temp file + rename)
//! - Writes are retried with exponential backoff ([`RetryPolicy`])
//! - There is no atomicity across collections
//!
//! ## Key Types
//!
//! - [`Store`] - CRUD entry point for a storage root
//! - [`PathResolver`] - Collection name to file layout
//! - [`StoreConfig`] - Settings read from `store.toml`

mod atomic;
mod backup;
mod collection;
mod config;
mod error;
mod lock;
mod paths;
mod retry;
mod store;

pub use atomic::{atomic_write, atomic_write_json};
pub use backup::{discover_collections, read_backup, Snapshot};
pub use collection::{item_id, Item, ItemMap};
pub use config::{StoreConfig, CONFIG_FILE, DEFAULT_ROOT_DIR};
pub use error::{Result, StoreError};
pub use lock::{is_process_running, CollectionLock, FileLock, LockManager, LockPolicy};
pub use paths::{Layout, Location, PathResolver, TASKS_COLLECTION};
pub use retry::RetryPolicy;
pub use store::Store;
