//! Similarity retriever.

use super::ConnectionManager;
use super::catalog::validate_name;
use crate::embedding::Embedder;
use crate::models::{Hits, Query, RetrievalOptions, Vector};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Nearest-neighbor retrieval under a certainty floor.
#[derive(Clone)]
pub struct SimilarityRetriever {
    connection: Arc<ConnectionManager>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl SimilarityRetriever {
    /// Creates a retriever. Without an embedder only [`Query::Vector`] is
    /// accepted.
    #[must_use]
    pub fn new(connection: Arc<ConnectionManager>, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            connection,
            embedder,
        }
    }

    /// Retrieves the records nearest to the query.
    ///
    /// Hits keep the engine's order (descending certainty), number at most
    /// `options.limit`, and all reach `options.certainty_floor`. Returns
    /// `Ok(None)` when nothing clears the floor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a zero limit, a floor outside
    /// `[0, 1]`, an empty query, or a text query without an embedder;
    /// [`Error::NotConnected`] when disconnected; and the engine failure
    /// (after closing the connection).
    #[instrument(
        skip(self, query),
        fields(limit = options.limit, certainty_floor = options.certainty_floor)
    )]
    pub fn retrieve(
        &self,
        query: Query<'_>,
        collection: &str,
        options: RetrievalOptions,
    ) -> Result<Option<Hits>> {
        let start = Instant::now();
        validate_name(collection)?;
        Self::validate_options(options)?;
        self.validate_query(query)?;

        let engine = self.connection.live_handle()?;
        let vector = self.query_vector(query)?;

        let found = self.connection.observe(
            "retrieve",
            engine.near_vector(collection, &vector, options.limit, options.certainty_floor),
        );

        let hits = match found {
            Ok(hits) => hits,
            Err(e) => {
                metrics::counter!("threadstore_retrieve_total", "status" => "error").increment(1);
                return Err(e);
            },
        };

        // Order comes from the engine; the bounds are re-applied here.
        let hits: Vec<_> = hits
            .into_iter()
            .filter(|h| h.certainty >= options.certainty_floor)
            .take(options.limit)
            .collect();

        metrics::histogram!("threadstore_retrieve_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);

        let Some(hits) = Hits::from_vec(hits) else {
            tracing::info!(collection, "No records cleared the certainty floor");
            metrics::counter!("threadstore_retrieve_total", "status" => "empty").increment(1);
            return Ok(None);
        };

        tracing::debug!(
            collection,
            count = hits.len(),
            best = hits.best().certainty,
            "Retrieved records"
        );
        metrics::counter!("threadstore_retrieve_total", "status" => "success").increment(1);
        Ok(Some(hits))
    }

    fn validate_options(options: RetrievalOptions) -> Result<()> {
        if options.limit == 0 {
            return Err(Error::InvalidInput("limit must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&options.certainty_floor) {
            return Err(Error::InvalidInput(format!(
                "certainty floor must be within [0, 1], got {}",
                options.certainty_floor
            )));
        }
        Ok(())
    }

    fn validate_query(&self, query: Query<'_>) -> Result<()> {
        match query {
            Query::Text(text) => {
                if self.embedder.is_none() {
                    return Err(Error::InvalidInput(
                        "text query requires an embedding model".to_string(),
                    ));
                }
                if text.trim().is_empty() {
                    return Err(Error::InvalidInput("query text cannot be empty".to_string()));
                }
            },
            Query::Vector(vector) => {
                if vector.is_empty() {
                    return Err(Error::InvalidInput("query vector cannot be empty".to_string()));
                }
            },
        }
        Ok(())
    }

    fn query_vector(&self, query: Query<'_>) -> Result<Vector> {
        match query {
            Query::Text(text) => self
                .embedder
                .as_ref()
                .ok_or_else(|| Error::InvalidInput("no embedding model is loaded".to_string()))?
                .embed(text),
            Query::Vector(vector) => Ok(vector.to_vec()),
        }
    }
}
