//! Data models for threadstore.
//!
//! Records, identifiers, retrieval results and the status values returned by
//! mutating operations.

mod record;
mod retrieval;
mod status;

pub use record::{
    CHANNEL_ID_FIELD, HEAD_FIELD, Properties, RESPONSES_FIELD, Record, RecordId, THREAD_TS_FIELD,
    UUID_FIELD, Vector,
};
pub use retrieval::{Hits, Query, RetrievalHit, RetrievalOptions};
pub use status::{CollectionHandle, DeletionStatus, EmbeddingSource, StoreStatus, UpdateStatus};
