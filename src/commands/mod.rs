//! Command handlers.
//!
//! Each handler drives one [`ThreadStore`] operation and prints its result
//! with the renderers from [`threadstore::cli`].

use anyhow::{Context, bail};
use std::path::Path;
use threadstore::cli::{self, OutputFormat};
use threadstore::config::ThreadStoreConfig;
use threadstore::{ConnectionState, EmbeddingSource, Query, RecordId, ThreadStore};

/// Status command.
pub fn cmd_status(
    store: &ThreadStore,
    config: &ThreadStoreConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let connected = store.check_connection();
    let collections = if connected {
        store.list_collection_names()?
    } else {
        Vec::new()
    };

    match format {
        OutputFormat::Json => {
            let status = serde_json::json!({
                "engine": config.engine.as_str(),
                "connected": connected,
                "collection": config.collection_name,
                "embedding_model": config.embedding_model,
                "generate_embeddings": config.generate_embeddings,
                "k_retrievals": config.k_retrievals,
                "certainty_threshold": config.certainty_threshold,
                "collections": collections,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        },
        OutputFormat::Text => {
            let state = match store.state() {
                ConnectionState::Connected if connected => "connected",
                _ => "disconnected",
            };
            println!("threadstore status");
            println!("------------------");
            println!("Engine:      {} ({state})", config.engine.as_str());
            if let Some(dir) = &config.data_dir {
                println!("Data dir:    {}", dir.display());
            }
            println!("Collection:  {}", config.collection_name);
            if config.generate_embeddings {
                println!("Embeddings:  {}", config.embedding_model);
            } else {
                println!("Embeddings:  disabled");
            }
            println!(
                "Retrieval:   k={} certainty>={}",
                config.k_retrievals, config.certainty_threshold
            );
            println!("Collections: {}", collections.len());
            for name in &collections {
                println!("  - {name}");
            }
        },
    }
    Ok(())
}

/// Collections command.
pub fn cmd_collections(store: &ThreadStore, format: OutputFormat) -> anyhow::Result<()> {
    let names = store.list_collection_names()?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&names)?),
        OutputFormat::Text if names.is_empty() => println!("No collections."),
        OutputFormat::Text => {
            for name in names {
                println!("{name}");
            }
        },
    }
    Ok(())
}

/// View command.
pub fn cmd_view(store: &ThreadStore, collection: &str, format: OutputFormat) -> anyhow::Result<()> {
    match store.view_contents(collection)? {
        Some(records) => print!("{}", cli::render_records(&records, format)),
        None if format == OutputFormat::Json => println!("[]"),
        None => println!("Collection '{collection}' is empty."),
    }
    Ok(())
}

/// Search command.
pub fn cmd_search(
    store: &ThreadStore,
    config: &ThreadStoreConfig,
    query: &str,
    collection: &str,
    limit: Option<usize>,
    certainty: Option<f32>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut options = config.retrieval_options();
    if let Some(limit) = limit {
        options = options.with_limit(limit);
    }
    if let Some(certainty) = certainty {
        options = options.with_certainty_floor(certainty);
    }

    match store.retrieve(Query::Text(query), collection, options)? {
        Some(hits) => print!("{}", cli::render_hits(&hits, format)),
        None if format == OutputFormat::Json => println!("[]"),
        None => println!("No matching records."),
    }
    Ok(())
}

/// Store command.
pub fn cmd_store(
    store: &ThreadStore,
    file: &Path,
    collection: &str,
    embed_field: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let records = cli::parse_records(&contents)?;
    if records.is_empty() {
        bail!("{} contains no records", file.display());
    }

    let status = store.store(&records, collection, EmbeddingSource::TextField(embed_field))?;
    println!("{}", cli::render_store_status(&status, format));
    if !status.is_stored() {
        bail!("store failed");
    }
    Ok(())
}

/// Update command.
pub fn cmd_update(
    store: &ThreadStore,
    collection: &str,
    uuid: &str,
    field: &str,
    value: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let id = RecordId::new(uuid);
    let Some(record) = store.find_record(collection, &id)? else {
        bail!("no record {uuid} in collection '{collection}'");
    };

    let status = store.update(collection, &record, value, field)?;
    println!("{}", cli::render_update_status(&status, format));
    if !matches!(status, threadstore::UpdateStatus::Updated(_)) {
        bail!("update incomplete");
    }
    Ok(())
}

/// Delete command.
pub fn cmd_delete(
    store: &ThreadStore,
    collection: &str,
    uuid: Option<&str>,
    thread_ts: Option<&str>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let id = uuid.map(RecordId::new);
    let status = store.delete(collection, id.as_ref(), thread_ts)?;
    println!("{}", cli::render_deletion_status(&status, format));
    if matches!(status, threadstore::DeletionStatus::Failed { .. }) {
        bail!("delete failed");
    }
    Ok(())
}
