//! Business logic services.
//!
//! | Service | Concern |
//! |---------|---------|
//! | [`ConnectionManager`] | The single shared engine handle |
//! | [`CollectionCatalog`] | List, ensure and read collections |
//! | [`RecordStore`] | Validate, embed and insert batches |
//! | [`SimilarityRetriever`] | Nearest-neighbor retrieval under a certainty floor |
//! | [`Mutator`] | Create-then-retire update, delete |
//! | [`ThreadStore`] | Facade over all of the above |
//!
//! # Failure policy
//!
//! Precondition violations are returned as errors before any engine call.
//! An engine failure closes the shared connection; mutating operations
//! report it as a status value, reads return it as an error.

mod catalog;
mod connection;
mod mutation;
mod records;
mod retrieval;
mod thread_store;

pub use catalog::CollectionCatalog;
pub use connection::{ConnectionManager, ConnectionState};
pub use mutation::{Mutator, StagedReplacement};
pub use records::RecordStore;
pub use retrieval::SimilarityRetriever;
pub use thread_store::ThreadStore;
