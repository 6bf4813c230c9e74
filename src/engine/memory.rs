//! Embedded in-memory vector engine.
//!
//! A brute-force O(n) cosine engine. The server state outlives individual
//! connections, so closing a handle and reconnecting sees the same data.
//! With a snapshot path, state is loaded when the server opens and written
//! back on every handle close and when the last server reference drops.

use super::{Connector, DataObject, PropertyFilter, VectorEngine, certainty_from_cosine};
use crate::embedding::cosine_similarity;
use crate::models::{Properties, Record, RecordId, RetrievalHit, Vector};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Snapshot format version.
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredObject {
    id: RecordId,
    properties: Properties,
    vector: Vector,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CollectionData {
    /// Fixed by the first inserted vector.
    dimensions: Option<usize>,
    objects: Vec<StoredObject>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ServerState {
    #[serde(default)]
    version: u32,
    collections: BTreeMap<String, CollectionData>,
    #[serde(skip)]
    dirty: bool,
}

struct Shared {
    state: Mutex<ServerState>,
    snapshot: Option<PathBuf>,
    available: AtomicBool,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, ServerState>> {
        self.state.lock().map_err(|e| Error::OperationFailed {
            operation: "lock_memory_engine".to_string(),
            cause: e.to_string(),
        })
    }

    fn save(&self) -> Result<()> {
        let mut state = self.lock()?;
        write_snapshot(self.snapshot.as_deref(), &mut state)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Attempt to save on drop, ignore errors
        if let Ok(state) = self.state.get_mut() {
            let _ = write_snapshot(self.snapshot.as_deref(), state);
        }
    }
}

fn write_snapshot(path: Option<&Path>, state: &mut ServerState) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    if !state.dirty {
        return Ok(());
    }

    state.version = SNAPSHOT_VERSION;
    let content = serde_json::to_string(&*state).map_err(|e| Error::OperationFailed {
        operation: "serialize_snapshot".to_string(),
        cause: e.to_string(),
    })?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
            operation: "create_snapshot_dir".to_string(),
            cause: e.to_string(),
        })?;
    }

    fs::write(path, content).map_err(|e| Error::OperationFailed {
        operation: "write_snapshot".to_string(),
        cause: e.to_string(),
    })?;

    state.dirty = false;
    tracing::debug!(path = %path.display(), "Wrote memory engine snapshot");
    Ok(())
}

fn read_snapshot(path: &Path) -> Result<ServerState> {
    if !path.exists() {
        return Ok(ServerState::default());
    }

    let content = fs::read_to_string(path).map_err(|e| Error::OperationFailed {
        operation: "load_snapshot".to_string(),
        cause: e.to_string(),
    })?;

    let state: ServerState = serde_json::from_str(&content).map_err(|e| Error::OperationFailed {
        operation: "parse_snapshot".to_string(),
        cause: e.to_string(),
    })?;

    if state.version > SNAPSHOT_VERSION {
        return Err(Error::OperationFailed {
            operation: "load_snapshot".to_string(),
            cause: format!(
                "snapshot version {} is newer than supported version {SNAPSHOT_VERSION}",
                state.version
            ),
        });
    }

    Ok(state)
}

/// The embedded engine's server side.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct InMemoryServer {
    shared: Arc<Shared>,
}

impl InMemoryServer {
    /// Creates a server without persistence.
    #[must_use]
    pub fn new() -> Self {
        Self::from_state(ServerState::default(), None)
    }

    /// Opens a server backed by a JSON snapshot, loading it if present.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing snapshot cannot be read or parsed.
    pub fn open(snapshot: impl Into<PathBuf>) -> Result<Self> {
        let path = snapshot.into();
        let state = read_snapshot(&path)?;
        tracing::debug!(
            path = %path.display(),
            collections = state.collections.len(),
            "Opened memory engine"
        );
        Ok(Self::from_state(state, Some(path)))
    }

    fn from_state(state: ServerState, snapshot: Option<PathBuf>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                snapshot,
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Returns the snapshot path, if persistent.
    #[must_use]
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.shared.snapshot.as_deref()
    }

    /// Marks the server reachable or unreachable.
    ///
    /// While unreachable, connects fail and open handles report failures.
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    /// Writes the snapshot if there are unsaved changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub fn save(&self) -> Result<()> {
        self.shared.save()
    }

    /// Returns a connector for this server.
    #[must_use]
    pub fn connector(&self) -> InMemoryConnector {
        InMemoryConnector {
            server: self.clone(),
        }
    }

    fn is_available(&self) -> bool {
        self.shared.available.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Connects to an [`InMemoryServer`].
#[derive(Clone)]
pub struct InMemoryConnector {
    server: InMemoryServer,
}

impl InMemoryConnector {
    /// Returns the server this connector targets.
    #[must_use]
    pub const fn server(&self) -> &InMemoryServer {
        &self.server
    }
}

impl Connector for InMemoryConnector {
    fn target(&self) -> String {
        self.server
            .snapshot_path()
            .map_or_else(|| "memory://".to_string(), |p| format!("memory://{}", p.display()))
    }

    fn connect(&self) -> Result<Arc<dyn VectorEngine>> {
        if !self.server.is_available() {
            return Err(Error::OperationFailed {
                operation: "connect".to_string(),
                cause: "memory engine unavailable".to_string(),
            });
        }
        Ok(Arc::new(InMemoryEngine {
            server: self.server.clone(),
            open: AtomicBool::new(true),
        }))
    }
}

/// A connection to an [`InMemoryServer`].
struct InMemoryEngine {
    server: InMemoryServer,
    open: AtomicBool,
}

impl InMemoryEngine {
    fn state(&self, operation: &str) -> Result<MutexGuard<'_, ServerState>> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(Error::OperationFailed {
                operation: operation.to_string(),
                cause: "connection closed".to_string(),
            });
        }
        if !self.server.is_available() {
            return Err(Error::OperationFailed {
                operation: operation.to_string(),
                cause: "memory engine unavailable".to_string(),
            });
        }
        self.server.shared.lock()
    }

    fn missing(operation: &str, collection: &str) -> Error {
        Error::OperationFailed {
            operation: operation.to_string(),
            cause: format!("collection '{collection}' does not exist"),
        }
    }
}

impl VectorEngine for InMemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_live(&self) -> bool {
        self.open.load(Ordering::SeqCst) && self.server.is_available()
    }

    fn list_collections(&self) -> Result<Vec<String>> {
        let state = self.state("list_collections")?;
        Ok(state.collections.keys().cloned().collect())
    }

    fn has_collection(&self, name: &str) -> Result<bool> {
        let state = self.state("has_collection")?;
        Ok(state.collections.contains_key(name))
    }

    fn create_collection(&self, name: &str) -> Result<()> {
        let mut state = self.state("create_collection")?;
        if !state.collections.contains_key(name) {
            state
                .collections
                .insert(name.to_string(), CollectionData::default());
            state.dirty = true;
        }
        Ok(())
    }

    fn insert_many(&self, collection: &str, objects: Vec<DataObject>) -> Result<Vec<RecordId>> {
        let mut state = self.state("insert_many")?;
        let data = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| Self::missing("insert_many", collection))?;

        // Validate the whole batch before touching the collection.
        let expected = data
            .dimensions
            .or_else(|| objects.first().map(|o| o.vector.len()));
        if let Some(expected) = expected {
            if let Some(bad) = objects.iter().find(|o| o.vector.len() != expected) {
                return Err(Error::OperationFailed {
                    operation: "insert_many".to_string(),
                    cause: format!(
                        "vector dimension mismatch: expected {expected}, got {}",
                        bad.vector.len()
                    ),
                });
            }
        }
        if objects.is_empty() {
            return Ok(Vec::new());
        }

        data.dimensions = expected;
        let mut ids = Vec::with_capacity(objects.len());
        for object in objects {
            let id = RecordId::generate();
            ids.push(id.clone());
            data.objects.push(StoredObject {
                id,
                properties: object.properties,
                vector: object.vector,
            });
        }
        state.dirty = true;
        Ok(ids)
    }

    fn near_vector(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        certainty_floor: f32,
    ) -> Result<Vec<RetrievalHit>> {
        let state = self.state("near_vector")?;
        let data = state
            .collections
            .get(collection)
            .ok_or_else(|| Self::missing("near_vector", collection))?;

        let Some(dimensions) = data.dimensions else {
            return Ok(Vec::new());
        };
        if vector.len() != dimensions {
            return Err(Error::OperationFailed {
                operation: "near_vector".to_string(),
                cause: format!(
                    "query dimension mismatch: expected {dimensions}, got {}",
                    vector.len()
                ),
            });
        }

        let mut scored: Vec<(f32, &StoredObject)> = data
            .objects
            .iter()
            .map(|o| (certainty_from_cosine(cosine_similarity(vector, &o.vector)), o))
            .filter(|(certainty, _)| *certainty >= certainty_floor)
            .collect();

        // Stable sort keeps insertion order among ties.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(certainty, o)| RetrievalHit {
                certainty,
                record: Record::new(o.id.clone(), o.properties.clone()),
            })
            .collect())
    }

    fn delete_by_id(&self, collection: &str, id: &RecordId) -> Result<bool> {
        let mut state = self.state("delete_by_id")?;
        let Some(data) = state.collections.get_mut(collection) else {
            return Ok(false);
        };

        let before = data.objects.len();
        data.objects.retain(|o| &o.id != id);
        let removed = data.objects.len() < before;
        if removed {
            state.dirty = true;
        }
        Ok(removed)
    }

    fn delete_many(&self, collection: &str, filter: &PropertyFilter) -> Result<usize> {
        let matcher = filter.compile()?;
        let mut state = self.state("delete_many")?;
        let Some(data) = state.collections.get_mut(collection) else {
            return Ok(0);
        };

        let before = data.objects.len();
        data.objects.retain(|o| !matcher.matches(&o.properties));
        let removed = before - data.objects.len();
        if removed > 0 {
            state.dirty = true;
        }
        Ok(removed)
    }

    fn iterate(&self, collection: &str) -> Result<Vec<Record>> {
        let state = self.state("iterate")?;
        let data = state
            .collections
            .get(collection)
            .ok_or_else(|| Self::missing("iterate", collection))?;

        Ok(data
            .objects
            .iter()
            .map(|o| Record::new(o.id.clone(), o.properties.clone()))
            .collect())
    }

    fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            self.server.save()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn props(thread_ts: &str, head: &str) -> Properties {
        let mut map = Properties::new();
        map.insert("thread_ts".to_string(), json!(thread_ts));
        map.insert("head".to_string(), json!(head));
        map
    }

    fn connect(server: &InMemoryServer) -> Arc<dyn VectorEngine> {
        server.connector().connect().expect("connect failed")
    }

    #[test]
    fn test_insert_assigns_ids_and_preserves_order() {
        let server = InMemoryServer::new();
        let engine = connect(&server);
        engine.create_collection("threads").expect("create failed");

        let ids = engine
            .insert_many(
                "threads",
                vec![
                    DataObject::new(props("1", "first"), vec![1.0, 0.0]),
                    DataObject::new(props("2", "second"), vec![0.0, 1.0]),
                ],
            )
            .expect("insert failed");

        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);

        let records = engine.iterate("threads").expect("iterate failed");
        assert_eq!(records[0].uuid, ids[0]);
        assert_eq!(records[1].head(), Some("second"));
    }

    #[test]
    fn test_insert_into_missing_collection_fails() {
        let engine = connect(&InMemoryServer::new());
        let result = engine.insert_many("nope", vec![DataObject::new(Properties::new(), vec![1.0])]);
        assert!(matches!(result, Err(Error::OperationFailed { .. })));
    }

    #[test]
    fn test_dimension_fixed_by_first_insert() {
        let engine = connect(&InMemoryServer::new());
        engine.create_collection("threads").expect("create failed");
        engine
            .insert_many("threads", vec![DataObject::new(Properties::new(), vec![1.0, 0.0])])
            .expect("insert failed");

        let result = engine.insert_many(
            "threads",
            vec![DataObject::new(Properties::new(), vec![1.0, 0.0, 0.0])],
        );
        assert!(result.is_err());
        assert_eq!(engine.iterate("threads").expect("iterate failed").len(), 1);
    }

    #[test]
    fn test_near_vector_orders_and_filters() {
        let engine = connect(&InMemoryServer::new());
        engine.create_collection("threads").expect("create failed");
        engine
            .insert_many(
                "threads",
                vec![
                    DataObject::new(props("1", "opposite"), vec![-1.0, 0.0]),
                    DataObject::new(props("2", "close"), vec![0.9, 0.1]),
                    DataObject::new(props("3", "exact"), vec![1.0, 0.0]),
                ],
            )
            .expect("insert failed");

        let hits = engine
            .near_vector("threads", &[1.0, 0.0], 10, 0.5)
            .expect("search failed");
        let heads: Vec<_> = hits.iter().filter_map(|h| h.record.head()).collect();
        assert_eq!(heads, vec!["exact", "close"]);
        assert!(hits.iter().all(|h| h.certainty >= 0.5));

        let hits = engine
            .near_vector("threads", &[1.0, 0.0], 1, 0.0)
            .expect("search failed");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_near_vector_on_empty_collection() {
        let engine = connect(&InMemoryServer::new());
        engine.create_collection("threads").expect("create failed");
        let hits = engine
            .near_vector("threads", &[1.0, 0.0], 3, 0.5)
            .expect("search failed");
        assert!(hits.is_empty());
    }

    #[test]
    fn test_delete_many_by_pattern() {
        let engine = connect(&InMemoryServer::new());
        engine.create_collection("threads").expect("create failed");
        engine
            .insert_many(
                "threads",
                vec![
                    DataObject::new(props("1718000000.000100", "a"), vec![1.0]),
                    DataObject::new(props("1718000000.000100", "b"), vec![1.0]),
                    DataObject::new(props("1718999999.000200", "c"), vec![1.0]),
                ],
            )
            .expect("insert failed");

        let removed = engine
            .delete_many("threads", &PropertyFilter::like("thread_ts", "*1718000000.000100*"))
            .expect("delete failed");
        assert_eq!(removed, 2);
        assert_eq!(engine.iterate("threads").expect("iterate failed").len(), 1);
    }

    #[test]
    fn test_closed_handle_fails_and_state_survives_reconnect() {
        let server = InMemoryServer::new();
        let engine = connect(&server);
        engine.create_collection("threads").expect("create failed");
        engine.close().expect("close failed");
        engine.close().expect("second close failed");

        assert!(!engine.is_live());
        assert!(engine.list_collections().is_err());

        let engine = connect(&server);
        assert_eq!(
            engine.list_collections().expect("list failed"),
            vec!["threads".to_string()]
        );
    }

    #[test]
    fn test_unavailable_server() {
        let server = InMemoryServer::new();
        let engine = connect(&server);
        server.set_available(false);

        assert!(!engine.is_live());
        assert!(engine.has_collection("threads").is_err());
        assert!(server.connector().connect().is_err());

        server.set_available(true);
        assert!(engine.is_live());
    }

    #[test]
    fn test_snapshot_persistence() {
        let dir = TempDir::new().expect("tempdir failed");
        let path = dir.path().join("engine.json");

        {
            let server = InMemoryServer::open(&path).expect("open failed");
            let engine = connect(&server);
            engine.create_collection("threads").expect("create failed");
            engine
                .insert_many("threads", vec![DataObject::new(props("1", "kept"), vec![0.5, 0.5])])
                .expect("insert failed");
            engine.close().expect("close failed");
        }

        let server = InMemoryServer::open(&path).expect("reopen failed");
        let engine = connect(&server);
        let records = engine.iterate("threads").expect("iterate failed");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].head(), Some("kept"));
    }

    #[test]
    fn test_snapshot_written_on_drop() {
        let dir = TempDir::new().expect("tempdir failed");
        let path = dir.path().join("nested").join("engine.json");

        {
            let server = InMemoryServer::open(&path).expect("open failed");
            let engine = connect(&server);
            engine.create_collection("threads").expect("create failed");
        }

        assert!(path.exists());
        let server = InMemoryServer::open(&path).expect("reopen failed");
        assert!(connect(&server).has_collection("threads").expect("query failed"));
    }

    #[test]
    fn test_corrupt_snapshot_is_rejected() {
        let dir = TempDir::new().expect("tempdir failed");
        let path = dir.path().join("engine.json");
        fs::write(&path, "not json").expect("write failed");
        assert!(InMemoryServer::open(&path).is_err());
    }
}
