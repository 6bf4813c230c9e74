//! Mutator: update and delete on an insert/delete-only engine.
//!
//! An update never edits in place. It inserts a mutated copy as a new
//! record and only then deletes the original, so a failure can leave both
//! records present but never neither. The replacement gets a new
//! identifier.

use super::{ConnectionManager, RecordStore};
use super::catalog::validate_name;
use crate::engine::PropertyFilter;
use crate::models::{
    DeletionStatus, EmbeddingSource, HEAD_FIELD, RESPONSES_FIELD, Record, RecordId, StoreStatus,
    THREAD_TS_FIELD, UpdateStatus,
};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::instrument;

/// A replacement that has been inserted but whose original is not yet
/// retired.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedReplacement {
    /// Collection holding both records.
    pub collection: String,
    /// The record being replaced.
    pub original: RecordId,
    /// The newly inserted record.
    pub replacement: Record,
}

/// Updates and deletes records.
#[derive(Clone)]
pub struct Mutator {
    connection: Arc<ConnectionManager>,
    records: RecordStore,
}

impl Mutator {
    /// Creates a mutator inserting replacements through `records`.
    #[must_use]
    pub const fn new(connection: Arc<ConnectionManager>, records: RecordStore) -> Self {
        Self {
            connection,
            records,
        }
    }

    /// Replaces `record` with a copy whose `field` is set to `new_value`.
    ///
    /// Returns [`UpdateStatus::Failed`] if the replacement could not be
    /// inserted (the original is untouched) and
    /// [`UpdateStatus::RetireFailed`] if it was inserted but the original
    /// could not be deleted.
    ///
    /// # Errors
    ///
    /// Returns precondition errors from [`Mutator::stage_replacement`].
    #[instrument(skip(self, record, new_value), fields(uuid = %record.uuid))]
    pub fn update(
        &self,
        collection: &str,
        record: &Record,
        new_value: &str,
        field: &str,
    ) -> Result<UpdateStatus> {
        let staged = match self.stage_replacement(collection, record, new_value, field) {
            Ok(staged) => staged,
            Err(e) if e.is_precondition() => return Err(e),
            Err(e) => {
                metrics::counter!("threadstore_update_total", "status" => "error").increment(1);
                return Ok(UpdateStatus::Failed {
                    cause: e.to_string(),
                });
            },
        };

        let outcome = match self.retire(&staged) {
            Ok(DeletionStatus::Deleted { .. }) => Ok(()),
            Ok(DeletionStatus::Failed { cause }) => Err(cause),
            Ok(DeletionStatus::NoSelector) => Err("original has no identifier".to_string()),
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(()) => {
                tracing::info!(
                    collection,
                    original = %staged.original,
                    replacement = %staged.replacement.uuid,
                    "Updated record"
                );
                metrics::counter!("threadstore_update_total", "status" => "success").increment(1);
                Ok(UpdateStatus::Updated(staged.replacement))
            },
            Err(cause) => {
                tracing::warn!(
                    collection,
                    original = %staged.original,
                    replacement = %staged.replacement.uuid,
                    cause = %cause,
                    "Replacement stored but original not retired"
                );
                metrics::counter!("threadstore_update_total", "status" => "retire_failed")
                    .increment(1);
                Ok(UpdateStatus::RetireFailed {
                    replacement: staged.replacement,
                    cause,
                })
            },
        }
    }

    /// Inserts the mutated copy of `record` as a new record.
    ///
    /// The copy is embedded from its `head`; when `field` is `responses`
    /// the new value is appended to the head, separated by a newline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty record identifier or
    /// field name, or a record without a head; [`Error::NotConnected`] when
    /// disconnected; and [`Error::OperationFailed`] if the insert failed.
    pub fn stage_replacement(
        &self,
        collection: &str,
        record: &Record,
        new_value: &str,
        field: &str,
    ) -> Result<StagedReplacement> {
        if record.uuid.is_empty() {
            return Err(Error::InvalidInput(
                "record to update has no identifier".to_string(),
            ));
        }
        if field.trim().is_empty() {
            return Err(Error::InvalidInput("field name cannot be empty".to_string()));
        }

        let mut properties = record.properties.clone();
        properties.insert(
            field.to_string(),
            serde_json::Value::String(new_value.to_string()),
        );

        let head = properties
            .get(HEAD_FIELD)
            .and_then(|v| v.as_str())
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| {
                Error::InvalidInput(format!("record {} has no '{HEAD_FIELD}' text", record.uuid))
            })?;
        let text = if field == RESPONSES_FIELD {
            format!("{head}\n{new_value}")
        } else {
            head.to_string()
        };

        let status = self.records.store(
            std::slice::from_ref(&properties),
            collection,
            EmbeddingSource::SharedText(&text),
        )?;

        match status {
            StoreStatus::Stored { mut ids, .. } => {
                let uuid = ids.pop().ok_or_else(|| Error::OperationFailed {
                    operation: "stage_replacement".to_string(),
                    cause: "engine returned no identifier".to_string(),
                })?;
                Ok(StagedReplacement {
                    collection: collection.to_string(),
                    original: record.uuid.clone(),
                    replacement: Record::new(uuid, properties),
                })
            },
            StoreStatus::Failed { cause } => Err(Error::OperationFailed {
                operation: "stage_replacement".to_string(),
                cause,
            }),
        }
    }

    /// Deletes the original of a staged replacement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] when disconnected.
    pub fn retire(&self, staged: &StagedReplacement) -> Result<DeletionStatus> {
        self.delete(&staged.collection, Some(&staged.original), None)
    }

    /// Deletes by identifier, or else by thread key.
    ///
    /// The identifier wins when both are given. A thread key deletes every
    /// record whose `thread_ts` contains it (`*` and `?` in the key act as
    /// wildcards). With neither, nothing is deleted and
    /// [`DeletionStatus::NoSelector`] is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty collection name and
    /// [`Error::NotConnected`] when disconnected.
    #[instrument(skip(self))]
    pub fn delete(
        &self,
        collection: &str,
        uuid: Option<&RecordId>,
        thread_ts: Option<&str>,
    ) -> Result<DeletionStatus> {
        validate_name(collection)?;
        let uuid = uuid.filter(|id| !id.is_empty());
        let thread_ts = thread_ts.filter(|t| !t.is_empty());
        if uuid.is_none() && thread_ts.is_none() {
            tracing::info!(collection, "Delete called without a selector");
            return Ok(DeletionStatus::NoSelector);
        }

        let engine = self.connection.live_handle()?;
        let removed = if let Some(id) = uuid {
            engine
                .delete_by_id(collection, id)
                .map(usize::from)
        } else {
            let pattern = format!("*{}*", thread_ts.unwrap_or_default());
            engine.delete_many(collection, &PropertyFilter::like(THREAD_TS_FIELD, pattern))
        };

        match self.connection.observe("delete", removed) {
            Ok(count) => {
                tracing::info!(collection, count, "Deleted records");
                metrics::counter!("threadstore_delete_total", "status" => "success").increment(1);
                Ok(DeletionStatus::Deleted { count })
            },
            Err(e) if e.is_precondition() => Err(e),
            Err(e) => {
                metrics::counter!("threadstore_delete_total", "status" => "error").increment(1);
                Ok(DeletionStatus::Failed {
                    cause: e.to_string(),
                })
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{Embedder, FastEmbedEmbedder};
    use crate::engine::InMemoryServer;
    use crate::models::Properties;
    use crate::services::{CollectionCatalog, ConnectionState};
    use serde_json::json;

    struct Fixture {
        connection: Arc<ConnectionManager>,
        catalog: CollectionCatalog,
        records: RecordStore,
        mutator: Mutator,
    }

    fn fixture() -> Fixture {
        let server = InMemoryServer::new();
        let connection =
            Arc::new(ConnectionManager::connect(server.connector()).expect("connect failed"));
        let embedder: Arc<dyn Embedder> = Arc::new(FastEmbedEmbedder::default());
        let records = RecordStore::new(Arc::clone(&connection), Some(embedder));
        Fixture {
            catalog: CollectionCatalog::new(Arc::clone(&connection)),
            mutator: Mutator::new(Arc::clone(&connection), records.clone()),
            records,
            connection,
        }
    }

    fn thread(thread_ts: &str, head: &str) -> Properties {
        let mut map = Properties::new();
        map.insert("thread_ts".to_string(), json!(thread_ts));
        map.insert("channel_id".to_string(), json!("C024BE91L"));
        map.insert("head".to_string(), json!(head));
        map.insert("responses".to_string(), json!(""));
        map
    }

    fn seed(f: &Fixture, batch: &[Properties]) -> Vec<Record> {
        f.records
            .store(batch, "threads", EmbeddingSource::TextField("head"))
            .expect("store failed");
        f.catalog
            .view_contents("threads")
            .expect("view failed")
            .expect("records present")
    }

    #[test]
    fn test_update_replaces_record() {
        let f = fixture();
        let original = seed(&f, &[thread("1718000000.000100", "deploy failed on staging")])
            .remove(0);

        let status = f
            .mutator
            .update("threads", &original, "retry with --force", "responses")
            .expect("update failed");
        let UpdateStatus::Updated(replacement) = status else {
            panic!("expected Updated, got {status:?}");
        };

        assert_ne!(replacement.uuid, original.uuid);
        assert_eq!(replacement.text("responses"), Some("retry with --force"));
        assert_eq!(replacement.head(), original.head());

        let contents = f
            .catalog
            .view_contents("threads")
            .expect("view failed")
            .expect("records present");
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0], replacement);
    }

    #[test]
    fn test_update_without_head_is_rejected() {
        let f = fixture();
        let record = Record::new(RecordId::new("r1"), Properties::new());
        let result = f.mutator.update("threads", &record, "x", "responses");
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_update_when_disconnected() {
        let f = fixture();
        let original = seed(&f, &[thread("1", "head")]).remove(0);
        f.connection.close();
        let result = f.mutator.update("threads", &original, "x", "responses");
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[test]
    fn test_delete_prefers_uuid() {
        let f = fixture();
        let records = seed(
            &f,
            &[thread("1718000000.000100", "a"), thread("1718000000.000100", "b")],
        );

        let status = f
            .mutator
            .delete("threads", Some(&records[0].uuid), Some("1718000000.000100"))
            .expect("delete failed");
        assert_eq!(status, DeletionStatus::Deleted { count: 1 });

        let left = f
            .catalog
            .view_contents("threads")
            .expect("view failed")
            .expect("records present");
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].uuid, records[1].uuid);
    }

    #[test]
    fn test_delete_by_thread_ts_substring() {
        let f = fixture();
        seed(
            &f,
            &[
                thread("1718000000.000100", "a"),
                thread("1718000000.000100", "b"),
                thread("1718999999.000900", "c"),
            ],
        );

        let status = f
            .mutator
            .delete("threads", None, Some("1718000000.000100"))
            .expect("delete failed");
        assert_eq!(status.deleted(), 2);
    }

    #[test]
    fn test_delete_without_selector() {
        let f = fixture();
        seed(&f, &[thread("1", "a")]);
        let status = f.mutator.delete("threads", None, None).expect("delete failed");
        assert_eq!(status, DeletionStatus::NoSelector);
        let status = f
            .mutator
            .delete("threads", Some(&RecordId::new("")), Some(""))
            .expect("delete failed");
        assert_eq!(status, DeletionStatus::NoSelector);
        assert_eq!(f.connection.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_two_step_update() {
        let f = fixture();
        let original = seed(&f, &[thread("1", "old head")]).remove(0);

        let staged = f
            .mutator
            .stage_replacement("threads", &original, "new head", "head")
            .expect("stage failed");
        assert_eq!(
            f.catalog
                .view_contents("threads")
                .expect("view failed")
                .map(|r| r.len()),
            Some(2)
        );

        let status = f.mutator.retire(&staged).expect("retire failed");
        assert_eq!(status.deleted(), 1);
        assert_eq!(staged.replacement.head(), Some("new head"));
    }
}
