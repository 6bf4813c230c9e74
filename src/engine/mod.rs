//! Vector engine boundary.
//!
//! Services talk to the storage engine only through [`VectorEngine`], and
//! obtain engine handles only through a [`Connector`].
//!
//! # Available Implementations
//!
//! | Engine | Use Case | Configuration |
//! |--------|----------|---------------|
//! | [`InMemoryServer`] | Embedded brute-force cosine search, optional JSON snapshot | Default, no external deps |
//! | `RedisEngine` | Redis Stack vector search (HNSW, COSINE) | Requires the `redis` feature |
//!
//! # Certainty
//!
//! Engines report similarity as certainty in `[0, 1]`:
//! `certainty = (1 + cos(a, b)) / 2`.
//!
//! # Implementor Notes
//!
//! - Methods take `&self` so handles can be shared as `Arc<dyn VectorEngine>`
//! - A closed handle fails every data operation with `OperationFailed`
//! - Insertion order is the iteration order

mod filter;
mod memory;
mod redis;

pub use filter::{CompiledFilter, PropertyFilter};
pub use memory::{InMemoryConnector, InMemoryServer};
pub use redis::RedisConnector;
#[cfg(feature = "redis")]
pub use redis::RedisEngine;

use crate::Result;
use crate::models::{Properties, Record, RecordId, RetrievalHit, Vector};
use std::sync::Arc;

/// A record to insert, paired with its vector.
#[derive(Debug, Clone, PartialEq)]
pub struct DataObject {
    /// Record properties.
    pub properties: Properties,
    /// The record's embedding.
    pub vector: Vector,
}

impl DataObject {
    /// Creates a data object.
    #[must_use]
    pub const fn new(properties: Properties, vector: Vector) -> Self {
        Self { properties, vector }
    }
}

/// Converts cosine similarity (`[-1, 1]`) to certainty (`[0, 1]`).
#[must_use]
pub fn certainty_from_cosine(cosine: f32) -> f32 {
    f32::midpoint(cosine, 1.0).clamp(0.0, 1.0)
}

/// A live handle to a vector engine.
pub trait VectorEngine: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &'static str;

    /// Returns true if the handle is open and the engine answers.
    fn is_live(&self) -> bool;

    /// Lists every collection name.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be queried.
    fn list_collections(&self) -> Result<Vec<String>>;

    /// Returns true if the collection exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be queried.
    fn has_collection(&self, name: &str) -> Result<bool>;

    /// Creates a collection without a server-side vectorizer.
    ///
    /// Creating an existing collection is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the request.
    fn create_collection(&self, name: &str) -> Result<()>;

    /// Inserts a batch, assigning a fresh identifier to every object.
    ///
    /// The batch is all-or-nothing. The first vector stored in a
    /// collection fixes its dimensionality.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection is missing, a vector has the
    /// wrong dimensionality, or the engine fails.
    fn insert_many(&self, collection: &str, objects: Vec<DataObject>) -> Result<Vec<RecordId>>;

    /// Finds the nearest records to `vector`.
    ///
    /// Returns at most `limit` hits with certainty at or above
    /// `certainty_floor`, ordered by descending certainty.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection is missing or the engine fails.
    fn near_vector(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        certainty_floor: f32,
    ) -> Result<Vec<RetrievalHit>>;

    /// Deletes one record. Returns true if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    fn delete_by_id(&self, collection: &str, id: &RecordId) -> Result<bool>;

    /// Deletes every record matching the filter. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    fn delete_many(&self, collection: &str, filter: &PropertyFilter) -> Result<usize>;

    /// Returns every record of the collection in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection is missing or the engine fails.
    fn iterate(&self, collection: &str) -> Result<Vec<Record>>;

    /// Releases the handle. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if resources could not be flushed.
    fn close(&self) -> Result<()>;
}

/// Opens engine handles.
pub trait Connector: Send + Sync {
    /// Describes the target for logs (URL or path).
    fn target(&self) -> String;

    /// Establishes a new handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is unreachable.
    fn connect(&self) -> Result<Arc<dyn VectorEngine>>;
}
