//! # threadstore
//!
//! Vector-store access layer for chat thread records.
//!
//! threadstore turns thread records into embedded vectors, persists them into
//! named collections of a vector engine, retrieves them by similarity under a
//! certainty floor, and edits or deletes them on top of an engine that only
//! offers insert and delete primitives.
//!
//! ## Layout
//!
//! - [`embedding`]: text to vector ([`Embedder`])
//! - [`engine`]: the vector engine boundary ([`VectorEngine`]) with an
//!   embedded in-memory engine and an optional Redis Stack engine
//! - [`services`]: connection manager, collection catalog, record store,
//!   similarity retriever and mutator, bundled by [`ThreadStore`]
//! - [`config`] and [`observability`]: configuration and logging
//!
//! ## Example
//!
//! ```rust,ignore
//! use threadstore::{EmbeddingSource, Query, RetrievalOptions, ThreadStore, ThreadStoreConfig};
//!
//! let store = ThreadStore::from_config(&ThreadStoreConfig::default())?;
//! store.store(&records, "slack_threads", EmbeddingSource::TextField("head"))?;
//!
//! if let Some(hits) = store.retrieve(
//!     Query::Text("how do I rotate the api key?"),
//!     "slack_threads",
//!     RetrievalOptions::default(),
//! )? {
//!     for hit in &hits {
//!         println!("{:.2} {}", hit.certainty, hit.record.uuid);
//!     }
//! }
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod cli;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod models;
pub mod observability;
pub mod services;

pub use config::ThreadStoreConfig;
pub use embedding::Embedder;
pub use engine::{Connector, VectorEngine};
pub use models::{
    DeletionStatus, EmbeddingSource, Hits, Properties, Query, Record, RecordId, RetrievalHit,
    RetrievalOptions, StoreStatus, UpdateStatus, Vector,
};
pub use services::{
    CollectionCatalog, ConnectionManager, ConnectionState, Mutator, RecordStore,
    SimilarityRetriever, ThreadStore,
};

/// Error type for threadstore operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Precondition violations: missing embedder, empty text, vector/record count mismatch |
/// | `NotConnected` | An operation is attempted without a live engine connection |
/// | `OperationFailed` | The engine, the embedding model, or the filesystem failed mid-operation |
/// | `FeatureNotEnabled` | Using an engine or model that requires a compile-time feature |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - Text embedding is requested but no embedder is loaded
    /// - The field to embed is missing or empty on a record
    /// - The number of external vectors differs from the number of records
    /// - A vector's dimensionality does not match its collection
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No live connection to the vector engine.
    ///
    /// Signals a sequencing error: the caller must `reconnect()` after a
    /// failure closed the shared handle.
    #[error("not connected to the vector engine")]
    NotConnected,

    /// An operation failed.
    ///
    /// Raised when:
    /// - The engine is unreachable or rejects a command
    /// - The embedding model fails to load or to encode
    /// - Snapshot or configuration files cannot be read or written
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Feature not enabled (requires feature flag).
    #[error("feature not enabled: {0} (compile with --features {0})")]
    FeatureNotEnabled(String),
}

impl Error {
    /// Returns true when the error came from a precondition check rather
    /// than from the engine.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::NotConnected)
    }
}

/// Result type alias for threadstore operations.
pub type Result<T> = std::result::Result<T, Error>;
