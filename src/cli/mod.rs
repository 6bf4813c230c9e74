//! Command-line interface definitions.
//!
//! The binary parses [`Cli`] and dispatches each [`Commands`] variant to a
//! handler. Parsing of input files and rendering of results live here so
//! they can be tested without a terminal.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `status` | Connection, engine and embedding status |
//! | `collections` | List collection names |
//! | `view` | Show every record of a collection |
//! | `search` | Similarity search by text |
//! | `store` | Store records from a JSON or JSON Lines file |
//! | `update` | Replace a record with an edited copy |
//! | `delete` | Delete by identifier or thread timestamp |
//!
//! # Example Usage
//!
//! ```bash
//! threadstore store threads.jsonl --embed-field head
//! threadstore search "how do I rotate the api key" --limit 5
//! threadstore update 3f1c... --field responses --value "Use the vault CLI."
//! threadstore delete --thread-ts 1718000000.000100
//! ```

use crate::models::{
    DeletionStatus, HEAD_FIELD, Hits, Properties, Record, StoreStatus, UUID_FIELD, UpdateStatus,
};
use crate::{Error, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Write as _;
use std::path::PathBuf;

/// threadstore - vector store for chat thread records.
#[derive(Debug, Parser)]
#[command(name = "threadstore")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "THREADSTORE_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Command to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format of command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// JSON.
    Json,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show connection and configuration status.
    Status,

    /// List collection names.
    Collections,

    /// Show every record of a collection.
    View {
        /// Collection (default: configured collection).
        collection: Option<String>,
    },

    /// Search records similar to a text.
    Search {
        /// The search text.
        query: String,

        /// Collection (default: configured collection).
        #[arg(short, long)]
        collection: Option<String>,

        /// Maximum number of results (default: configured `k_retrievals`).
        #[arg(short, long)]
        limit: Option<usize>,

        /// Minimum certainty, 0.0 to 1.0 (default: configured threshold).
        #[arg(long)]
        certainty: Option<f32>,
    },

    /// Store records from a JSON array or JSON Lines file.
    Store {
        /// Input file.
        file: PathBuf,

        /// Collection (default: configured collection).
        #[arg(short, long)]
        collection: Option<String>,

        /// Field whose text is embedded.
        #[arg(long, default_value = HEAD_FIELD)]
        embed_field: String,
    },

    /// Replace a record with a copy whose field holds a new value.
    Update {
        /// Identifier of the record to replace.
        uuid: String,

        /// Field to set.
        #[arg(long)]
        field: String,

        /// New value.
        #[arg(long)]
        value: String,

        /// Collection (default: configured collection).
        #[arg(short, long)]
        collection: Option<String>,
    },

    /// Delete records by identifier or thread timestamp.
    Delete {
        /// Identifier of the record to delete (wins over --thread-ts).
        #[arg(long)]
        uuid: Option<String>,

        /// Delete every record whose thread timestamp contains this value.
        #[arg(long)]
        thread_ts: Option<String>,

        /// Collection (default: configured collection).
        #[arg(short, long)]
        collection: Option<String>,
    },
}

/// Parses records from a JSON array or JSON Lines text.
///
/// A `uuid` key, as written by `view --format json`, is dropped: the engine
/// assigns re-imported records new identifiers.
///
/// # Errors
///
/// Returns an error if the text is neither, or an entry is not an object.
pub fn parse_records(input: &str) -> Result<Vec<Properties>> {
    let trimmed = input.trim_start();
    let mut records = if trimmed.starts_with('[') {
        serde_json::from_str::<Vec<Properties>>(trimmed)
            .map_err(|e| Error::InvalidInput(format!("invalid JSON array of records: {e}")))?
    } else {
        trimmed
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str::<Properties>(line).map_err(|e| {
                    Error::InvalidInput(format!("line {}: not a JSON object: {e}", index + 1))
                })
            })
            .collect::<Result<Vec<_>>>()?
    };

    for record in &mut records {
        record.remove(UUID_FIELD);
    }
    Ok(records)
}

/// Renders records, one per line in text mode.
#[must_use]
pub fn render_records(records: &[Record], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(records),
        OutputFormat::Text => {
            let mut out = String::new();
            for record in records {
                let _ = writeln!(out, "{}", record_line(record));
            }
            out
        },
    }
}

/// Renders retrieval hits, best first.
#[must_use]
pub fn render_hits(hits: &Hits, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(hits),
        OutputFormat::Text => {
            let mut out = String::new();
            for (rank, hit) in hits.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "{}. [{:.3}] {}",
                    rank + 1,
                    hit.certainty,
                    record_line(&hit.record)
                );
            }
            out
        },
    }
}

/// Renders a store status.
#[must_use]
pub fn render_store_status(status: &StoreStatus, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(status),
        OutputFormat::Text => status.message(),
    }
}

/// Renders an update status.
#[must_use]
pub fn render_update_status(status: &UpdateStatus, format: OutputFormat) -> String {
    match (format, status) {
        (OutputFormat::Json, _) => to_json(status),
        (OutputFormat::Text, UpdateStatus::Updated(record)) => {
            format!("Updated: {}", record_line(record))
        },
        (OutputFormat::Text, UpdateStatus::Failed { cause }) => {
            format!("Update failed, original kept: {cause}")
        },
        (OutputFormat::Text, UpdateStatus::RetireFailed { replacement, cause }) => format!(
            "Replacement {} stored but original not deleted: {cause}",
            replacement.uuid
        ),
    }
}

/// Renders a deletion status.
#[must_use]
pub fn render_deletion_status(status: &DeletionStatus, format: OutputFormat) -> String {
    match (format, status) {
        (OutputFormat::Json, _) => to_json(status),
        (OutputFormat::Text, DeletionStatus::Deleted { count }) => {
            format!("Deleted {count} record(s)")
        },
        (OutputFormat::Text, DeletionStatus::NoSelector) => {
            "Nothing deleted: give --uuid or --thread-ts".to_string()
        },
        (OutputFormat::Text, DeletionStatus::Failed { cause }) => {
            format!("Delete failed: {cause}")
        },
    }
}

fn record_line(record: &Record) -> String {
    let head = record.head().unwrap_or_default();
    let thread = record.thread_ts().unwrap_or("-");
    let channel = record.channel_id().unwrap_or("-");
    format!("{} {channel}/{thread} {}", record.uuid, truncate(head, 80))
}

fn truncate(text: &str, max_chars: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let mut cut: String = single_line.chars().take(max_chars.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}
