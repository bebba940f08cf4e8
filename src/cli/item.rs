//! Item and collection commands

use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;

use super::output::Output;
use crate::storage::{item_id, Item, Store};

pub fn get(store: &Store, output: &Output, collection: &str, id: &str) -> Result<()> {
    match store.find_by_id(collection, id)? {
        Some(item) => output.data(&item),
        None => bail!("Item '{}' not found in '{}'", id, collection),
    }
    Ok(())
}

pub fn list(store: &Store, output: &Output, collection: &str, filter: Option<&str>) -> Result<()> {
    let mut items = match filter {
        Some(filter) => {
            let (key, value) = parse_filter(filter)?;
            store.find(collection, |item| field_matches(item, key, value))?
        }
        None => store.find_all(collection)?,
    };
    items.sort_by(|a, b| item_id(a).cmp(&item_id(b)));

    if output.is_json() {
        output.data(&items);
    } else if items.is_empty() {
        println!("No items in '{}'", collection);
    } else {
        for item in &items {
            let line = serde_json::to_string(item)?;
            output.row(&[item_id(item).unwrap_or(""), line.as_str()]);
        }
    }

    Ok(())
}

pub fn put(
    store: &Store,
    output: &Output,
    collection: &str,
    id: &str,
    json: Option<&str>,
) -> Result<()> {
    let raw = match json {
        Some(json) if json != "-" => json.to_string(),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read item from stdin")?;
            buf
        }
    };

    let item: Item = serde_json::from_str(&raw).context("Item is not valid JSON")?;
    store.save(collection, id, item)?;

    output.success(&format!("Saved '{}' in '{}'", id, collection));
    Ok(())
}

pub fn delete(store: &Store, output: &Output, collection: &str, id: &str) -> Result<()> {
    if store.delete(collection, id)? {
        output.success(&format!("Deleted '{}' from '{}'", id, collection));
        Ok(())
    } else {
        bail!("Item '{}' not found in '{}'", id, collection)
    }
}

pub fn count(store: &Store, output: &Output, collection: &str) -> Result<()> {
    let count = store.count(collection)?;

    if output.is_json() {
        output.data(&serde_json::json!({ "collection": collection, "count": count }));
    } else {
        println!("{}", count);
    }
    Ok(())
}

pub fn exists(store: &Store, output: &Output, collection: &str, id: &str) -> Result<()> {
    let exists = store.exists(collection, id)?;

    if output.is_json() {
        output.data(&serde_json::json!({ "collection": collection, "id": id, "exists": exists }));
    } else {
        println!("{}", exists);
    }
    Ok(())
}

pub fn clear(store: &Store, output: &Output, collection: &str) -> Result<()> {
    let removed = store.count(collection)?;
    store.clear(collection)?;

    output.success(&format!("Cleared '{}' ({} items removed)", collection, removed));
    Ok(())
}

pub fn import(store: &Store, output: &Output, collection: &str, file: &Path) -> Result<()> {
    let content = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let items: Vec<Item> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of items", file.display()))?;

    let count = items.len();
    store.save_all(collection, items)?;

    output.success(&format!("Imported {} items into '{}'", count, collection));
    Ok(())
}

fn parse_filter(filter: &str) -> Result<(&str, &str)> {
    match filter.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => bail!("Invalid filter '{}', expected KEY=VALUE", filter),
    }
}

/// Strings compare as-is; other values compare by their JSON text
fn field_matches(item: &Item, key: &str, expected: &str) -> bool {
    match item.get(key) {
        Some(Value::String(s)) => s == expected,
        Some(other) => other.to_string() == expected,
        None => false,
    }
}
