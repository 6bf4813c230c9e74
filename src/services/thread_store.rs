//! `ThreadStore` facade.
//!
//! Bundles the components over one shared connection and optional
//! embedder. This is the surface the display layer drives.

use super::{
    CollectionCatalog, ConnectionManager, ConnectionState, Mutator, RecordStore,
    SimilarityRetriever,
};
use crate::config::{EngineKind, ThreadStoreConfig};
use crate::embedding::{Embedder, EmbeddingModelId, FastEmbedEmbedder};
use crate::engine::{Connector, InMemoryServer, RedisConnector};
use crate::models::{
    CollectionHandle, DeletionStatus, EmbeddingSource, Hits, Properties, Query, Record, RecordId,
    RetrievalOptions, StoreStatus, UpdateStatus,
};
use crate::Result;
use std::sync::Arc;

/// Vector-store access layer for thread records.
pub struct ThreadStore {
    connection: Arc<ConnectionManager>,
    catalog: CollectionCatalog,
    records: RecordStore,
    retriever: SimilarityRetriever,
    mutator: Mutator,
}

impl ThreadStore {
    /// Connects through `connector` and asserts the engine is live.
    ///
    /// Without an embedder, only external vectors and vector queries are
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotConnected`] if the engine cannot be reached.
    pub fn connect(
        connector: impl Connector + 'static,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Result<Self> {
        let connection = Arc::new(ConnectionManager::connect(connector)?);
        Ok(Self::with_connection(connection, embedder))
    }

    /// Builds the components over an existing connection manager.
    #[must_use]
    pub fn with_connection(
        connection: Arc<ConnectionManager>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Self {
        let records = RecordStore::new(Arc::clone(&connection), embedder.clone());
        Self {
            catalog: CollectionCatalog::new(Arc::clone(&connection)),
            retriever: SimilarityRetriever::new(Arc::clone(&connection), embedder),
            mutator: Mutator::new(Arc::clone(&connection), records.clone()),
            records,
            connection,
        }
    }

    /// Builds the engine connector and embedder from configuration, then
    /// connects.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] naming the model when
    /// embeddings are enabled and `embedding_model` is not a supported
    /// model. Also returns an error if the snapshot cannot be loaded, the
    /// engine needs a disabled feature, or the engine cannot be reached.
    pub fn from_config(config: &ThreadStoreConfig) -> Result<Self> {
        let embedder = if config.generate_embeddings {
            let model = config.embedding_model.parse::<EmbeddingModelId>()?;
            let embedder = match config.model_cache_dir() {
                Some(dir) => FastEmbedEmbedder::new(model).with_cache_dir(dir),
                None => FastEmbedEmbedder::new(model),
            };
            Some(Arc::new(embedder) as Arc<dyn Embedder>)
        } else {
            None
        };

        match config.engine {
            EngineKind::Memory => {
                let server = match config.snapshot_path() {
                    Some(path) => InMemoryServer::open(path)?,
                    None => InMemoryServer::new(),
                };
                Self::connect(server.connector(), embedder)
            },
            EngineKind::Redis => {
                if !cfg!(feature = "redis") {
                    return Err(crate::Error::FeatureNotEnabled("redis".to_string()));
                }
                Self::connect(RedisConnector::new(&config.redis_url), embedder)
            },
        }
    }

    /// Returns the shared connection manager.
    #[must_use]
    pub const fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Returns the connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Liveness probe.
    #[must_use]
    pub fn check_connection(&self) -> bool {
        self.connection.check_connection()
    }

    /// Replaces the connection. Returns `false` on failure.
    pub fn reconnect(&self) -> bool {
        self.connection.reconnect()
    }

    /// Closes the connection. Returns `false` if already closed.
    pub fn close(&self) -> bool {
        self.connection.close()
    }

    /// See [`CollectionCatalog::list_collection_names`].
    ///
    /// # Errors
    ///
    /// Returns an error when disconnected or on engine failure.
    pub fn list_collection_names(&self) -> Result<Vec<String>> {
        self.catalog.list_collection_names()
    }

    /// See [`CollectionCatalog::ensure_collection`].
    ///
    /// # Errors
    ///
    /// Returns an error when disconnected or on engine failure.
    pub fn ensure_collection(&self, name: &str) -> Result<CollectionHandle> {
        self.catalog.ensure_collection(name)
    }

    /// See [`CollectionCatalog::view_contents`].
    ///
    /// # Errors
    ///
    /// Returns an error when disconnected or on engine failure.
    pub fn view_contents(&self, name: &str) -> Result<Option<Vec<Record>>> {
        self.catalog.view_contents(name)
    }

    /// See [`RecordStore::store`].
    ///
    /// # Errors
    ///
    /// Returns precondition errors; engine failures are a status.
    pub fn store(
        &self,
        records: &[Properties],
        collection: &str,
        source: EmbeddingSource<'_>,
    ) -> Result<StoreStatus> {
        self.records.store(records, collection, source)
    }

    /// See [`SimilarityRetriever::retrieve`].
    ///
    /// # Errors
    ///
    /// Returns precondition errors and engine failures.
    pub fn retrieve(
        &self,
        query: Query<'_>,
        collection: &str,
        options: RetrievalOptions,
    ) -> Result<Option<Hits>> {
        self.retriever.retrieve(query, collection, options)
    }

    /// See [`Mutator::update`].
    ///
    /// # Errors
    ///
    /// Returns precondition errors; engine failures are a status.
    pub fn update(
        &self,
        collection: &str,
        record: &Record,
        new_value: &str,
        field: &str,
    ) -> Result<UpdateStatus> {
        self.mutator.update(collection, record, new_value, field)
    }

    /// See [`Mutator::delete`].
    ///
    /// # Errors
    ///
    /// Returns precondition errors; engine failures are a status.
    pub fn delete(
        &self,
        collection: &str,
        uuid: Option<&RecordId>,
        thread_ts: Option<&str>,
    ) -> Result<DeletionStatus> {
        self.mutator.delete(collection, uuid, thread_ts)
    }

    /// Looks a record up by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error when disconnected or on engine failure.
    pub fn find_record(&self, collection: &str, uuid: &RecordId) -> Result<Option<Record>> {
        Ok(self
            .view_contents(collection)?
            .and_then(|records| records.into_iter().find(|r| &r.uuid == uuid)))
    }

    /// Returns the mutator, for the two-step update API.
    #[must_use]
    pub const fn mutator(&self) -> &Mutator {
        &self.mutator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use tempfile::TempDir;

    #[test]
    fn test_from_config_without_embeddings() {
        let config = ThreadStoreConfig::default().with_generate_embeddings(false);
        let store = ThreadStore::from_config(&config).expect("from_config failed");
        assert!(store.check_connection());

        let mut record = Properties::new();
        record.insert("head".to_string(), serde_json::json!("hello"));
        let result = store.store(&[record], "slack_threads", EmbeddingSource::TextField("head"));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_from_config_persists_between_instances() {
        let dir = TempDir::new().expect("tempdir failed");
        let config = ThreadStoreConfig::default().with_data_dir(dir.path());

        {
            let store = ThreadStore::from_config(&config).expect("from_config failed");
            let mut record = Properties::new();
            record.insert("head".to_string(), serde_json::json!("persist me"));
            let status = store
                .store(&[record], "slack_threads", EmbeddingSource::TextField("head"))
                .expect("store failed");
            assert!(status.is_stored());
            assert!(store.close());
        }

        let store = ThreadStore::from_config(&config).expect("from_config failed");
        let records = store
            .view_contents("slack_threads")
            .expect("view failed")
            .expect("records present");
        assert_eq!(records[0].head(), Some("persist me"));

        let found = store
            .find_record("slack_threads", &records[0].uuid)
            .expect("lookup failed");
        assert_eq!(found.as_ref(), Some(&records[0]));
    }

    #[test]
    fn test_from_config_rejects_unknown_model() {
        let config = ThreadStoreConfig {
            embedding_model: "multi-qa-distilbert-cos-v1".to_string(),
            generate_embeddings: true,
            ..ThreadStoreConfig::default()
        };
        let Err(Error::InvalidInput(message)) = ThreadStore::from_config(&config) else {
            panic!("unknown embedding model was accepted");
        };
        assert!(message.contains("multi-qa-distilbert-cos-v1"));
    }

    #[test]
    fn test_unknown_model_ignored_without_embeddings() {
        let config = ThreadStoreConfig {
            embedding_model: "multi-qa-distilbert-cos-v1".to_string(),
            ..ThreadStoreConfig::default().with_generate_embeddings(false)
        };
        assert!(ThreadStore::from_config(&config).is_ok());
    }

    #[cfg(not(feature = "redis"))]
    #[test]
    fn test_redis_engine_requires_feature() {
        let config = ThreadStoreConfig {
            engine: EngineKind::Redis,
            ..ThreadStoreConfig::default()
        };
        assert!(matches!(
            ThreadStore::from_config(&config),
            Err(Error::FeatureNotEnabled(_))
        ));
    }
}
