//! Backup, restore and collection listing commands

use std::path::Path;

use anyhow::{Context, Result};

use super::output::Output;
use crate::storage::Store;

pub fn collections(store: &Store, output: &Output) -> Result<()> {
    let names = store.collections()?;

    if output.is_json() {
        output.data(&names);
    } else if names.is_empty() {
        println!("No collections in {}", store.root().display());
    } else {
        for name in &names {
            let layout = format!("{:?}", store.resolver().layout(name));
            output.row(&[name.as_str(), layout.as_str()]);
        }
    }
    Ok(())
}

pub fn backup(store: &Store, output: &Output) -> Result<()> {
    let path = store.backup()?;

    if output.is_json() {
        output.data(&serde_json::json!({ "backup": path.display().to_string() }));
    } else {
        output.success(&format!("Backup written to {}", path.display()));
    }
    Ok(())
}

pub fn restore(store: &Store, output: &Output, file: &Path) -> Result<()> {
    let count = store
        .restore(file)
        .with_context(|| format!("Failed to restore from {}", file.display()))?;

    output.success(&format!("Restored {} collections from {}", count, file.display()));
    Ok(())
}
