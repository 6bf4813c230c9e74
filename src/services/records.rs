//! Record store.
//!
//! Validates a batch, resolves one vector per record, ensures the target
//! collection and inserts the batch in a single engine call.

use super::catalog::validate_name;
use super::{CollectionCatalog, ConnectionManager};
use crate::embedding::Embedder;
use crate::engine::DataObject;
use crate::models::{EmbeddingSource, Properties, StoreStatus, UUID_FIELD, Vector};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Inserts batches of records.
#[derive(Clone)]
pub struct RecordStore {
    connection: Arc<ConnectionManager>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl RecordStore {
    /// Creates a record store. Without an embedder only
    /// [`EmbeddingSource::External`] is accepted.
    #[must_use]
    pub fn new(connection: Arc<ConnectionManager>, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            connection,
            embedder,
        }
    }

    /// Stores a batch of records.
    ///
    /// Preconditions are checked before any engine call. An engine failure
    /// closes the connection and is reported as [`StoreStatus::Failed`];
    /// nothing is retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if:
    /// - the batch is empty or a record carries a `uuid` property
    /// - a text source is used without an embedder
    /// - a record's text field is missing, not a string, or blank
    /// - the number of external vectors differs from the number of records
    ///
    /// Returns [`Error::NotConnected`] when disconnected, and embedding
    /// model failures as they occur, including an embedder that returns a
    /// different number of vectors than records. None of these touch the
    /// engine.
    #[instrument(skip(self, records, source), fields(count = records.len()))]
    pub fn store(
        &self,
        records: &[Properties],
        collection: &str,
        source: EmbeddingSource<'_>,
    ) -> Result<StoreStatus> {
        let start = Instant::now();
        validate_name(collection)?;
        Self::validate_records(records)?;
        self.validate_source(records, source)?;

        let engine = self.connection.live_handle()?;
        let vectors = self.resolve_vectors(records, source)?;

        let objects: Vec<DataObject> = records
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(properties, vector)| DataObject::new(properties, vector))
            .collect();

        let inserted = CollectionCatalog::ensure_on(engine.as_ref(), collection)
            .and_then(|_| engine.insert_many(collection, objects));

        match self.connection.observe("store", inserted) {
            Ok(ids) => {
                tracing::info!(
                    collection,
                    count = ids.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Stored records"
                );
                metrics::counter!("threadstore_store_total", "status" => "success").increment(1);
                Ok(StoreStatus::Stored {
                    count: ids.len(),
                    ids,
                })
            },
            Err(e) if e.is_precondition() => Err(e),
            Err(e) => {
                metrics::counter!("threadstore_store_total", "status" => "error").increment(1);
                Ok(StoreStatus::Failed {
                    cause: e.to_string(),
                })
            },
        }
    }

    fn validate_records(records: &[Properties]) -> Result<()> {
        if records.is_empty() {
            return Err(Error::InvalidInput("no records to store".to_string()));
        }
        if let Some(index) = records.iter().position(|r| r.contains_key(UUID_FIELD)) {
            return Err(Error::InvalidInput(format!(
                "record {index} carries a '{UUID_FIELD}' property; identifiers are assigned by the engine"
            )));
        }
        Ok(())
    }

    fn validate_source(&self, records: &[Properties], source: EmbeddingSource<'_>) -> Result<()> {
        if source.needs_embedder() && self.embedder.is_none() {
            return Err(Error::InvalidInput(
                "text embedding requested but no embedding model is loaded".to_string(),
            ));
        }

        match source {
            EmbeddingSource::TextField(field) => {
                for (index, record) in records.iter().enumerate() {
                    let text = record.get(field).and_then(|v| v.as_str());
                    if text.is_none_or(|t| t.trim().is_empty()) {
                        return Err(Error::InvalidInput(format!(
                            "record {index} has no text in field '{field}'"
                        )));
                    }
                }
            },
            EmbeddingSource::SharedText(text) => {
                if text.trim().is_empty() {
                    return Err(Error::InvalidInput(
                        "text to embed cannot be empty".to_string(),
                    ));
                }
            },
            EmbeddingSource::External(vectors) => {
                if vectors.len() != records.len() {
                    return Err(Error::InvalidInput(format!(
                        "got {} vectors for {} records",
                        vectors.len(),
                        records.len()
                    )));
                }
                if let Some(index) = vectors.iter().position(Vec::is_empty) {
                    return Err(Error::InvalidInput(format!("vector {index} is empty")));
                }
            },
        }
        Ok(())
    }

    fn resolve_vectors(
        &self,
        records: &[Properties],
        source: EmbeddingSource<'_>,
    ) -> Result<Vec<Vector>> {
        let embedder = || {
            self.embedder.as_ref().ok_or_else(|| {
                Error::InvalidInput("no embedding model is loaded".to_string())
            })
        };

        let vectors = match source {
            EmbeddingSource::TextField(field) => {
                let texts: Vec<&str> = records
                    .iter()
                    .filter_map(|r| r.get(field).and_then(|v| v.as_str()))
                    .collect();
                embedder()?.embed_batch(&texts)?
            },
            EmbeddingSource::SharedText(text) => {
                let vector = embedder()?.embed(text)?;
                vec![vector; records.len()]
            },
            EmbeddingSource::External(vectors) => vectors.to_vec(),
        };

        // Every record is inserted with exactly one vector.
        if vectors.len() != records.len() {
            return Err(Error::OperationFailed {
                operation: "embed".to_string(),
                cause: format!(
                    "embedder returned {} vectors for {} records",
                    vectors.len(),
                    records.len()
                ),
            });
        }
        Ok(vectors)
    }
}
