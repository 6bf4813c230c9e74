//! Collection catalog.

use super::ConnectionManager;
use crate::engine::VectorEngine;
use crate::models::{CollectionHandle, Record};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::instrument;

/// Lists, creates and reads collections.
#[derive(Clone)]
pub struct CollectionCatalog {
    connection: Arc<ConnectionManager>,
}

impl CollectionCatalog {
    /// Creates a catalog over the shared connection.
    #[must_use]
    pub const fn new(connection: Arc<ConnectionManager>) -> Self {
        Self { connection }
    }

    /// Lists every collection name. Empty when there are none.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] when disconnected, or the engine
    /// failure (after closing the connection).
    #[instrument(skip(self))]
    pub fn list_collection_names(&self) -> Result<Vec<String>> {
        let engine = self.connection.live_handle()?;
        let names = self
            .connection
            .observe("list_collections", engine.list_collections())?;
        tracing::debug!(count = names.len(), "Listed collections");
        Ok(names)
    }

    /// Fetches the collection, creating it without a vectorizer if absent.
    ///
    /// Two callers racing on the same absent name may both attempt the
    /// create; engines treat the second create as a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty name,
    /// [`Error::NotConnected`] when disconnected, or the engine failure
    /// (after closing the connection).
    #[instrument(skip(self))]
    pub fn ensure_collection(&self, name: &str) -> Result<CollectionHandle> {
        validate_name(name)?;
        let engine = self.connection.live_handle()?;
        self.connection
            .observe("ensure_collection", Self::ensure_on(engine.as_ref(), name))
    }

    pub(crate) fn ensure_on(engine: &dyn VectorEngine, name: &str) -> Result<CollectionHandle> {
        if engine.has_collection(name)? {
            return Ok(CollectionHandle {
                name: name.to_string(),
                created: false,
            });
        }

        engine.create_collection(name)?;
        tracing::info!(collection = name, "Created collection");
        metrics::counter!("threadstore_collection_created_total").increment(1);
        Ok(CollectionHandle {
            name: name.to_string(),
            created: true,
        })
    }

    /// Returns every record of the collection in engine iteration order.
    ///
    /// `None` when the collection is empty or does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] when disconnected, or the engine
    /// failure (after closing the connection).
    #[instrument(skip(self))]
    pub fn view_contents(&self, name: &str) -> Result<Option<Vec<Record>>> {
        validate_name(name)?;
        let engine = self.connection.live_handle()?;

        let records = self.connection.observe("view_contents", {
            match engine.has_collection(name) {
                Ok(true) => engine.iterate(name),
                Ok(false) => Ok(Vec::new()),
                Err(e) => Err(e),
            }
        })?;

        if records.is_empty() {
            tracing::info!(collection = name, "Collection is empty");
            return Ok(None);
        }
        Ok(Some(records))
    }
}

pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput(
            "collection name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DataObject, InMemoryServer};
    use crate::models::Properties;

    fn catalog() -> (InMemoryServer, CollectionCatalog) {
        let server = InMemoryServer::new();
        let connection =
            Arc::new(ConnectionManager::connect(server.connector()).expect("connect failed"));
        (server, CollectionCatalog::new(connection))
    }

    #[test]
    fn test_list_empty() {
        let (_server, catalog) = catalog();
        assert!(catalog.list_collection_names().expect("list failed").is_empty());
    }

    #[test]
    fn test_ensure_collection_is_idempotent() {
        let (_server, catalog) = catalog();
        let first = catalog.ensure_collection("slack_threads").expect("ensure failed");
        assert!(first.created);
        let second = catalog.ensure_collection("slack_threads").expect("ensure failed");
        assert!(!second.created);

        assert_eq!(
            catalog.list_collection_names().expect("list failed"),
            vec!["slack_threads".to_string()]
        );
    }

    #[test]
    fn test_view_contents_empty_and_missing() {
        let (_server, catalog) = catalog();
        assert!(catalog.view_contents("missing").expect("view failed").is_none());

        catalog.ensure_collection("slack_threads").expect("ensure failed");
        assert!(catalog.view_contents("slack_threads").expect("view failed").is_none());
    }

    #[test]
    fn test_view_contents_returns_records() {
        let (server, catalog) = catalog();
        catalog.ensure_collection("slack_threads").expect("ensure failed");

        let engine = server.connector();
        let engine = crate::engine::Connector::connect(&engine).expect("connect failed");
        engine
            .insert_many(
                "slack_threads",
                vec![DataObject::new(Properties::new(), vec![1.0, 0.0])],
            )
            .expect("insert failed");

        let records = catalog
            .view_contents("slack_threads")
            .expect("view failed")
            .expect("records present");
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_engine_failure_closes_connection() {
        let (server, catalog) = catalog();
        server.set_available(false);

        assert!(catalog.list_collection_names().is_err());
        assert!(matches!(
            catalog.list_collection_names(),
            Err(Error::NotConnected)
        ));
    }

    #[test]
    fn test_empty_name_rejected() {
        let (_server, catalog) = catalog();
        assert!(matches!(
            catalog.ensure_collection("  "),
            Err(Error::InvalidInput(_))
        ));
    }
}
