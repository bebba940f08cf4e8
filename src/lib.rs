//! critical-store - A collection-oriented JSON file store
//!
//! Collections of JSON items live under one storage root, either as one file
//! per item or as a single array file. Writes are atomic and serialized across
//! processes with per-collection lock files. The `cstore` binary exposes the
//! store on the command line.

pub mod storage;
pub mod cli;

pub use storage::{Item, Store, StoreConfig, StoreError};
