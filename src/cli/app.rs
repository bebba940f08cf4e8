//! Main CLI application structure

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use super::output::{Output, OutputFormat};
use super::{backup_cmd, item};
use crate::storage::{Store, StoreConfig};

#[derive(Parser)]
#[command(name = "cstore")]
#[command(author, version, about = "Inspect and edit a collection store")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Storage root directory
    #[arg(long, global = true, env = "CRITICAL_STORE_ROOT")]
    pub root: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print one item
    Get { collection: String, id: String },

    /// Print every item in a collection
    List {
        collection: String,

        /// Only items whose field equals a value (key=value)
        #[arg(long = "where", value_name = "KEY=VALUE")]
        filter: Option<String>,
    },

    /// Insert or replace an item
    Put {
        collection: String,
        id: String,

        /// Item as JSON (read from stdin if omitted or "-")
        json: Option<String>,
    },

    /// Remove an item
    Delete { collection: String, id: String },

    /// Count the items in a collection
    Count { collection: String },

    /// Check whether an item exists
    Exists { collection: String, id: String },

    /// Remove every item from a collection
    Clear { collection: String },

    /// Replace a collection with the items in a JSON array file
    Import { collection: String, file: PathBuf },

    /// List collections that are present on disk
    Collections,

    /// Write a snapshot of every collection
    Backup,

    /// Replace collections with the contents of a backup snapshot
    Restore { file: PathBuf },
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output = Output::new(cli.format);
    let store = open_store(cli.root)?;
    tracing::debug!(root = %store.root().display(), "opened store");

    match cli.command {
        Commands::Get { collection, id } => item::get(&store, &output, &collection, &id)?,
        Commands::List { collection, filter } => {
            item::list(&store, &output, &collection, filter.as_deref())?
        }
        Commands::Put { collection, id, json } => {
            item::put(&store, &output, &collection, &id, json.as_deref())?
        }
        Commands::Delete { collection, id } => item::delete(&store, &output, &collection, &id)?,
        Commands::Count { collection } => item::count(&store, &output, &collection)?,
        Commands::Exists { collection, id } => item::exists(&store, &output, &collection, &id)?,
        Commands::Clear { collection } => item::clear(&store, &output, &collection)?,
        Commands::Import { collection, file } => {
            item::import(&store, &output, &collection, &file)?
        }
        Commands::Collections => backup_cmd::collections(&store, &output)?,
        Commands::Backup => backup_cmd::backup(&store, &output)?,
        Commands::Restore { file } => backup_cmd::restore(&store, &output, &file)?,
    }

    Ok(())
}

fn open_store(root: Option<PathBuf>) -> Result<Store> {
    let root = match root {
        Some(root) => root,
        None => StoreConfig::default_root().context("Could not determine home directory")?,
    };

    Store::open(&root).with_context(|| format!("Failed to open store at {}", root.display()))
}

/// Logs go to stderr so they never mix with command output
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("critical_store=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
