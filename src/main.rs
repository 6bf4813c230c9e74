//! Binary entry point for threadstore.
//!
//! This binary provides the CLI interface over the thread record store.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

mod commands;

use anyhow::Context;
use clap::Parser;
use commands::{cmd_collections, cmd_delete, cmd_search, cmd_status, cmd_store, cmd_update, cmd_view};
use std::path::Path;
use std::process::ExitCode;
use threadstore::ThreadStore;
use threadstore::cli::{Cli, Commands};
use threadstore::config::ThreadStoreConfig;
use threadstore::observability::{self, LoggingConfig, MetricsConfig, MetricsHandle};

/// Main entry point.
fn main() -> ExitCode {
    // A missing .env file is not an error.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    let logging = LoggingConfig::from_settings(Some(&config.logging), cli.verbose);
    if let Err(e) = observability::init(&logging) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let metrics_config = MetricsConfig::from_settings(Some(&config.metrics));
    let metrics = match observability::install_prometheus(&metrics_config) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize metrics: {e}");
            return ExitCode::FAILURE;
        },
    };

    let result = run_command(cli, &config);
    if let Some(handle) = &metrics {
        flush_metrics(handle);
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Writes the metrics exposition to the configured file, or stderr.
fn flush_metrics(handle: &MetricsHandle) {
    match handle.file() {
        Some(path) => {
            if let Err(e) = handle.write_to(path) {
                tracing::warn!(error = %e, "Failed to write metrics");
            }
        },
        None => eprint!("{}", handle.render()),
    }
}

/// Runs the selected command.
fn run_command(cli: Cli, config: &ThreadStoreConfig) -> anyhow::Result<()> {
    let store = ThreadStore::from_config(config).context("failed to open the vector engine")?;
    let format = cli.format;
    let default_collection = config.collection_name.as_str();

    let result = match cli.command {
        Commands::Status => cmd_status(&store, config, format),

        Commands::Collections => cmd_collections(&store, format),

        Commands::View { collection } => {
            cmd_view(&store, collection.as_deref().unwrap_or(default_collection), format)
        },

        Commands::Search {
            query,
            collection,
            limit,
            certainty,
        } => cmd_search(
            &store,
            config,
            &query,
            collection.as_deref().unwrap_or(default_collection),
            limit,
            certainty,
            format,
        ),

        Commands::Store {
            file,
            collection,
            embed_field,
        } => cmd_store(
            &store,
            &file,
            collection.as_deref().unwrap_or(default_collection),
            &embed_field,
            format,
        ),

        Commands::Update {
            uuid,
            field,
            value,
            collection,
        } => cmd_update(
            &store,
            collection.as_deref().unwrap_or(default_collection),
            &uuid,
            &field,
            &value,
            format,
        ),

        Commands::Delete {
            uuid,
            thread_ts,
            collection,
        } => cmd_delete(
            &store,
            collection.as_deref().unwrap_or(default_collection),
            uuid.as_deref(),
            thread_ts.as_deref(),
            format,
        ),
    };

    // Flushes the embedded engine's snapshot.
    store.close();
    result
}

/// Loads configuration from `--config` / `THREADSTORE_CONFIG_PATH` or the
/// default location, then applies `THREADSTORE_*` environment overrides.
fn load_config(path: Option<&Path>) -> anyhow::Result<ThreadStoreConfig> {
    let config = match path {
        Some(path) => ThreadStoreConfig::load_from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ThreadStoreConfig::load_default(),
    };
    Ok(config.with_env_overrides()?)
}
