//! # Command-Line Interface
//!
//! `cstore` reads and edits a storage root through [`crate::storage::Store`],
//! the same way the services built on the store do.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Items | Read and write single items | `get`, `put`, `delete`, `exists` |
//! | Collections | Whole-collection operations | `list`, `count`, `clear`, `import`, `collections` |
//! | Backup | Snapshots of every collection | `backup`, `restore` |
//!
//! ## Storage Root
//!
//! `--root <dir>`, else `$CRITICAL_STORE_ROOT`, else `~/.critical-claude`.
//!
//! ## Output Formats
//!
//! All commands support `--format`:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Logging
//!
//! Logs go to stderr. `RUST_LOG` sets the filter (default `warn`);
//! `--verbose` turns on debug logs for the store.

mod app;
mod backup_cmd;
mod item;
mod output;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};
