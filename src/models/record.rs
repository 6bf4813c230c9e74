//! Record types and identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier field. Assigned by the engine, never part of [`Properties`].
pub const UUID_FIELD: &str = "uuid";
/// Thread grouping key (Slack thread timestamp).
pub const THREAD_TS_FIELD: &str = "thread_ts";
/// Channel reference.
pub const CHANNEL_ID_FIELD: &str = "channel_id";
/// Opening message of a thread; the default text to embed.
pub const HEAD_FIELD: &str = "head";
/// Replies to the thread.
pub const RESPONSES_FIELD: &str = "responses";

/// Schema-flexible property map of a record.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Embedding vector.
pub type Vector = Vec<f32>;

/// Engine-assigned identifier of a persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Creates a record ID from an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A persisted thread record.
///
/// Serializes flat: the identifier appears as a `uuid` key next to the
/// properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Engine-assigned identifier.
    pub uuid: RecordId,
    /// Record properties.
    #[serde(flatten)]
    pub properties: Properties,
}

impl Record {
    /// Creates a record.
    #[must_use]
    pub const fn new(uuid: RecordId, properties: Properties) -> Self {
        Self { uuid, properties }
    }

    /// Returns a string property, if present and a string.
    #[must_use]
    pub fn text(&self, field: &str) -> Option<&str> {
        self.properties.get(field).and_then(|v| v.as_str())
    }

    /// Returns the thread grouping key.
    #[must_use]
    pub fn thread_ts(&self) -> Option<&str> {
        self.text(THREAD_TS_FIELD)
    }

    /// Returns the channel reference.
    #[must_use]
    pub fn channel_id(&self) -> Option<&str> {
        self.text(CHANNEL_ID_FIELD)
    }

    /// Returns the thread head.
    #[must_use]
    pub fn head(&self) -> Option<&str> {
        self.text(HEAD_FIELD)
    }
}
