//! Inputs and status results of mutating operations.

use super::{Record, RecordId, Vector};
use serde::Serialize;

/// Where the vectors of a store batch come from.
///
/// Exactly one source per batch: a record is never inserted with both a
/// supplied vector and a derived one.
#[derive(Debug, Clone, Copy)]
pub enum EmbeddingSource<'a> {
    /// Embed the named text field of every record.
    TextField(&'a str),
    /// Embed one text once and share the vector across the batch.
    SharedText(&'a str),
    /// Caller-supplied vectors, one per record, in order.
    External(&'a [Vector]),
}

impl EmbeddingSource<'_> {
    /// Returns true when the source needs an embedder.
    #[must_use]
    pub const fn needs_embedder(&self) -> bool {
        matches!(self, Self::TextField(_) | Self::SharedText(_))
    }
}

/// A collection fetched or created by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHandle {
    /// Collection name.
    pub name: String,
    /// Whether this call created it.
    pub created: bool,
}

/// Outcome of a store batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StoreStatus {
    /// All records were inserted.
    Stored {
        /// Number of inserted records.
        count: usize,
        /// Assigned identifiers, in input order.
        ids: Vec<RecordId>,
    },
    /// Nothing was inserted; the connection was closed.
    Failed {
        /// What went wrong.
        cause: String,
    },
}

impl StoreStatus {
    /// Returns true on success.
    #[must_use]
    pub const fn is_stored(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }

    /// Human-readable status line.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Stored { count, .. } => format!("Stored {count} items successfully!"),
            Self::Failed { cause } => format!("an error occurred {cause}"),
        }
    }
}

/// Outcome of a create-then-retire update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateStatus {
    /// Replacement created and original retired.
    Updated(Record),
    /// The replacement could not be created; the original is untouched.
    Failed {
        /// What went wrong.
        cause: String,
    },
    /// The replacement exists but the original could not be retired, so
    /// both are present.
    RetireFailed {
        /// The new record.
        replacement: Record,
        /// What went wrong.
        cause: String,
    },
}

impl UpdateStatus {
    /// Returns the new record if one was created.
    #[must_use]
    pub const fn replacement(&self) -> Option<&Record> {
        match self {
            Self::Updated(record) | Self::RetireFailed { replacement: record, .. } => Some(record),
            Self::Failed { .. } => None,
        }
    }
}

/// Outcome of a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeletionStatus {
    /// Records were removed (possibly zero for a pattern delete).
    Deleted {
        /// Number of removed records.
        count: usize,
    },
    /// Neither an identifier nor a thread key was given.
    NoSelector,
    /// The engine failed; the connection was closed.
    Failed {
        /// What went wrong.
        cause: String,
    },
}

impl DeletionStatus {
    /// Number of removed records, zero unless `Deleted`.
    #[must_use]
    pub const fn deleted(&self) -> usize {
        match self {
            Self::Deleted { count } => *count,
            Self::NoSelector | Self::Failed { .. } => 0,
        }
    }
}
