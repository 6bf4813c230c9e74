//! Redis Stack vector engine.
//!
//! Uses Redis Stack's Vector Similarity Search. Requires Redis Stack 7.2+ or
//! the `RediSearch` 2.4+ module.
//!
//! # Redis Commands Used
//!
//! | Operation | Redis Command | Description |
//! |-----------|---------------|-------------|
//! | Collections | `SADD` / `SMEMBERS` / `SISMEMBER` | Collection registry set |
//! | Create Index | `FT.CREATE` | HNSW COSINE index, created on first insert |
//! | Insert | `HSET` (pipelined, atomic) | One hash per record |
//! | Search | `FT.SEARCH ... KNN` | K-nearest neighbor search |
//! | Delete | `DEL` | Deletes hash keys |
//! | Iterate | `SCAN` + `HGETALL` | Walks a collection's keys |
//! | Liveness | `PING` | Health check |
//!
//! # Key Layout
//!
//! - `threadstore:collections`: set of collection names
//! - `threadstore:dims`: hash of collection name to dimensionality
//! - `threadstore:{collection}:seq`: insertion counter
//! - `threadstore:{collection}:obj:{uuid}`: hash with `embedding` (FLOAT32
//!   little-endian blob), `properties` (JSON), `thread_ts` and `seq`
//! - index `threadstore:idx:{collection}` over prefix
//!   `threadstore:{collection}:obj:`

use super::{Connector, VectorEngine};
use crate::{Error, Result};
use std::sync::Arc;

/// Opens [`RedisEngine`] handles.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    url: String,
}

impl RedisConnector {
    /// Creates a connector for the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Connector for RedisConnector {
    fn target(&self) -> String {
        self.url.clone()
    }

    #[cfg(feature = "redis")]
    fn connect(&self) -> Result<Arc<dyn VectorEngine>> {
        Ok(Arc::new(native::RedisEngine::open(&self.url)?))
    }

    #[cfg(not(feature = "redis"))]
    fn connect(&self) -> Result<Arc<dyn VectorEngine>> {
        Err(Error::FeatureNotEnabled("redis".to_string()))
    }
}

#[cfg(feature = "redis")]
pub use native::RedisEngine;

#[cfg(feature = "redis")]
mod native {
    use super::{Error, Result, VectorEngine};
    use crate::engine::{DataObject, PropertyFilter, certainty_from_cosine};
    use crate::models::{Properties, Record, RecordId, RetrievalHit};
    use redis::{Client, Connection, RedisResult, Value};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    const REGISTRY_KEY: &str = "threadstore:collections";
    const DIMS_KEY: &str = "threadstore:dims";
    const SCAN_COUNT: usize = 500;
    const TIMEOUT: Duration = Duration::from_secs(5);

    fn failed(operation: &str, e: impl std::fmt::Display) -> Error {
        Error::OperationFailed {
            operation: operation.to_string(),
            cause: e.to_string(),
        }
    }

    /// Escapes glob metacharacters for a `SCAN MATCH` pattern.
    fn escape_glob(s: &str) -> String {
        let mut escaped = String::with_capacity(s.len());
        for c in s.chars() {
            if matches!(c, '*' | '?' | '[' | ']' | '\\') {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped
    }

    /// Decodes a stored `properties` payload.
    fn decode_properties(raw: &[u8]) -> Result<Properties> {
        serde_json::from_slice(raw).map_err(|e| failed("decode_properties", e))
    }

    /// A connection to a Redis Stack server.
    ///
    /// The connection is cached and reused across operations.
    pub struct RedisEngine {
        client: Client,
        connection: Mutex<Option<Connection>>,
        open: AtomicBool,
    }

    impl RedisEngine {
        /// Connects and verifies the server answers `PING`.
        ///
        /// # Errors
        ///
        /// Returns an error if the URL is invalid or the server is unreachable.
        pub fn open(url: &str) -> Result<Self> {
            let client = Client::open(url).map_err(|e| failed("redis_connect", e))?;
            let engine = Self {
                client,
                connection: Mutex::new(None),
                open: AtomicBool::new(true),
            };
            let conn = engine.new_connection()?;
            engine.return_connection(conn);
            tracing::debug!(url, "Connected to Redis");
            Ok(engine)
        }

        fn new_connection(&self) -> Result<Connection> {
            let mut conn = self
                .client
                .get_connection()
                .map_err(|e| failed("redis_get_connection", e))?;
            conn.set_read_timeout(Some(TIMEOUT))
                .map_err(|e| failed("redis_set_read_timeout", e))?;
            conn.set_write_timeout(Some(TIMEOUT))
                .map_err(|e| failed("redis_set_write_timeout", e))?;
            redis::cmd("PING")
                .query::<()>(&mut conn)
                .map_err(|e| failed("redis_ping", e))?;
            Ok(conn)
        }

        /// Gets a connection, reusing the cached one if available.
        fn get_connection(&self, operation: &str) -> Result<Connection> {
            if !self.open.load(Ordering::SeqCst) {
                return Err(failed(operation, "connection closed"));
            }

            let mut guard = self
                .connection
                .lock()
                .map_err(|e| failed("redis_lock_connection", e))?;
            if let Some(conn) = guard.take() {
                return Ok(conn);
            }
            drop(guard);

            self.new_connection()
        }

        fn return_connection(&self, conn: Connection) {
            if !self.open.load(Ordering::SeqCst) {
                return;
            }
            if let Ok(mut guard) = self.connection.lock() {
                *guard = Some(conn);
            }
        }

        /// Runs `f` with a pooled connection. A connection that produced an
        /// error is dropped rather than reused.
        fn with_connection<T>(
            &self,
            operation: &str,
            f: impl FnOnce(&mut Connection) -> RedisResult<T>,
        ) -> Result<T> {
            let mut conn = self.get_connection(operation)?;
            match f(&mut conn) {
                Ok(value) => {
                    self.return_connection(conn);
                    Ok(value)
                },
                Err(e) => Err(failed(operation, e)),
            }
        }

        fn object_prefix(collection: &str) -> String {
            format!("threadstore:{collection}:obj:")
        }

        fn object_key(collection: &str, id: &RecordId) -> String {
            format!("{}{}", Self::object_prefix(collection), id.as_str())
        }

        fn index_name(collection: &str) -> String {
            format!("threadstore:idx:{collection}")
        }

        fn scan_pattern(collection: &str) -> String {
            format!("{}*", escape_glob(&Self::object_prefix(collection)))
        }

        fn vector_to_bytes(embedding: &[f32]) -> Vec<u8> {
            embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
        }

        fn scan_keys(conn: &mut Connection, pattern: &str) -> RedisResult<Vec<String>> {
            let mut keys = Vec::new();
            let mut cursor: u64 = 0;
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(SCAN_COUNT)
                    .query(conn)?;
                keys.extend(batch);
                if next == 0 {
                    return Ok(keys);
                }
                cursor = next;
            }
        }

        /// Ensures the collection's vector index exists.
        fn ensure_index(conn: &mut Connection, collection: &str, dimensions: usize) -> RedisResult<()> {
            let info: RedisResult<Value> = redis::cmd("FT.INFO")
                .arg(Self::index_name(collection))
                .query(conn);
            if info.is_ok() {
                return Ok(());
            }

            let created: RedisResult<()> = redis::cmd("FT.CREATE")
                .arg(Self::index_name(collection))
                .arg("ON")
                .arg("HASH")
                .arg("PREFIX")
                .arg("1")
                .arg(Self::object_prefix(collection))
                .arg("SCHEMA")
                .arg("embedding")
                .arg("VECTOR")
                .arg("HNSW")
                .arg("6")
                .arg("TYPE")
                .arg("FLOAT32")
                .arg("DIM")
                .arg(dimensions)
                .arg("DISTANCE_METRIC")
                .arg("COSINE")
                .arg("thread_ts")
                .arg("TAG")
                .query(conn);

            match created {
                Err(e) if !e.to_string().contains("Index already exists") => Err(e),
                _ => Ok(()),
            }
        }

        fn require_collection(conn: &mut Connection, operation: &str, collection: &str) -> Result<()> {
            let exists: bool = redis::cmd("SISMEMBER")
                .arg(REGISTRY_KEY)
                .arg(collection)
                .query(conn)
                .map_err(|e| failed(operation, e))?;
            if exists {
                Ok(())
            } else {
                Err(failed(
                    operation,
                    format!("collection '{collection}' does not exist"),
                ))
            }
        }

        fn read_object(conn: &mut Connection, key: &str) -> Result<Option<(u64, Record)>> {
            let fields: std::collections::HashMap<String, Vec<u8>> = redis::cmd("HGETALL")
                .arg(key)
                .query(conn)
                .map_err(|e| failed("iterate", e))?;
            let Some(raw) = fields.get("properties") else {
                return Ok(None);
            };
            let Some(id) = key.rsplit(':').next() else {
                return Ok(None);
            };
            let seq = fields
                .get("seq")
                .and_then(|s| String::from_utf8_lossy(s).parse().ok())
                .unwrap_or(u64::MAX);
            let properties = decode_properties(raw)?;
            Ok(Some((seq, Record::new(RecordId::new(id), properties))))
        }

        /// Parses FT.SEARCH results into hits.
        fn parse_search_results(value: &Value, certainty_floor: f32) -> Result<Vec<RetrievalHit>> {
            let Value::Array(arr) = value else {
                return Ok(Vec::new());
            };

            let mut hits = Vec::new();
            let mut i = 1;
            while i + 1 < arr.len() {
                let Some(key) = Self::value_to_string(&arr[i]) else {
                    i += 2;
                    continue;
                };
                let (properties, distance) = Self::extract_fields(&arr[i + 1])?;
                i += 2;

                let Some(distance) = distance else {
                    continue;
                };
                // COSINE distance is 1 - cos, in [0, 2].
                let certainty = certainty_from_cosine(1.0 - distance.clamp(0.0, 2.0));
                if certainty < certainty_floor {
                    continue;
                }
                let id = key.rsplit(':').next().unwrap_or(&key);
                hits.push(RetrievalHit {
                    certainty,
                    record: Record::new(RecordId::new(id), properties),
                });
            }
            Ok(hits)
        }

        fn extract_fields(value: &Value) -> Result<(Properties, Option<f32>)> {
            let Value::Array(fields) = value else {
                return Ok((Properties::new(), None));
            };

            let mut properties = Properties::new();
            let mut distance = None;
            let mut j = 0;
            while j + 1 < fields.len() {
                let name = Self::value_to_string(&fields[j]).unwrap_or_default();
                let raw = Self::value_to_string(&fields[j + 1]);
                match (name.as_str(), raw) {
                    ("__embedding_score", Some(s)) => distance = s.parse::<f32>().ok(),
                    ("properties", Some(s)) => properties = decode_properties(s.as_bytes())?,
                    _ => {},
                }
                j += 2;
            }
            Ok((properties, distance))
        }

        fn value_to_string(value: &Value) -> Option<String> {
            match value {
                Value::BulkString(s) => Some(String::from_utf8_lossy(s).to_string()),
                Value::SimpleString(s) => Some(s.clone()),
                Value::Int(i) => Some(i.to_string()),
                _ => None,
            }
        }
    }

    impl VectorEngine for RedisEngine {
        fn name(&self) -> &'static str {
            "redis"
        }

        fn is_live(&self) -> bool {
            self.with_connection("ping", |conn| redis::cmd("PING").query::<()>(conn))
                .is_ok()
        }

        fn list_collections(&self) -> Result<Vec<String>> {
            let mut names: Vec<String> = self.with_connection("list_collections", |conn| {
                redis::cmd("SMEMBERS").arg(REGISTRY_KEY).query(conn)
            })?;
            names.sort();
            Ok(names)
        }

        fn has_collection(&self, name: &str) -> Result<bool> {
            self.with_connection("has_collection", |conn| {
                redis::cmd("SISMEMBER").arg(REGISTRY_KEY).arg(name).query(conn)
            })
        }

        fn create_collection(&self, name: &str) -> Result<()> {
            self.with_connection("create_collection", |conn| {
                redis::cmd("SADD").arg(REGISTRY_KEY).arg(name).query::<()>(conn)
            })
        }

        fn insert_many(&self, collection: &str, objects: Vec<DataObject>) -> Result<Vec<RecordId>> {
            let mut conn = self.get_connection("insert_many")?;
            let result = Self::insert_with(&mut conn, collection, objects);
            if result.is_ok() {
                self.return_connection(conn);
            }
            result
        }

        fn near_vector(
            &self,
            collection: &str,
            vector: &[f32],
            limit: usize,
            certainty_floor: f32,
        ) -> Result<Vec<RetrievalHit>> {
            let mut conn = self.get_connection("near_vector")?;
            Self::require_collection(&mut conn, "near_vector", collection)?;

            let dims: Option<usize> = redis::cmd("HGET")
                .arg(DIMS_KEY)
                .arg(collection)
                .query(&mut conn)
                .map_err(|e| failed("near_vector", e))?;
            let Some(dims) = dims else {
                self.return_connection(conn);
                return Ok(Vec::new());
            };
            if dims != vector.len() {
                self.return_connection(conn);
                return Err(failed(
                    "near_vector",
                    format!("query dimension mismatch: expected {dims}, got {}", vector.len()),
                ));
            }

            let query = format!("*=>[KNN {limit} @embedding $BLOB]");
            let result: RedisResult<Value> = redis::cmd("FT.SEARCH")
                .arg(Self::index_name(collection))
                .arg(&query)
                .arg("PARAMS")
                .arg("2")
                .arg("BLOB")
                .arg(Self::vector_to_bytes(vector))
                .arg("RETURN")
                .arg("2")
                .arg("properties")
                .arg("__embedding_score")
                .arg("SORTBY")
                .arg("__embedding_score")
                .arg("LIMIT")
                .arg("0")
                .arg(limit)
                .arg("DIALECT")
                .arg("2")
                .query(&mut conn);

            match result {
                Ok(value) => {
                    self.return_connection(conn);
                    Self::parse_search_results(&value, certainty_floor)
                },
                Err(e) => Err(failed("near_vector", e)),
            }
        }

        fn delete_by_id(&self, collection: &str, id: &RecordId) -> Result<bool> {
            let key = Self::object_key(collection, id);
            let deleted: i64 =
                self.with_connection("delete_by_id", |conn| redis::cmd("DEL").arg(&key).query(conn))?;
            Ok(deleted > 0)
        }

        fn delete_many(&self, collection: &str, filter: &PropertyFilter) -> Result<usize> {
            let matcher = filter.compile()?;
            let pattern = Self::scan_pattern(collection);

            let candidates: Vec<(String, Option<Vec<u8>>)> =
                self.with_connection("delete_many", |conn| {
                    let mut found = Vec::new();
                    for key in Self::scan_keys(conn, &pattern)? {
                        let raw: Option<Vec<u8>> =
                            redis::cmd("HGET").arg(&key).arg("properties").query(conn)?;
                        found.push((key, raw));
                    }
                    Ok(found)
                })?;

            let mut doomed = Vec::new();
            for (key, raw) in candidates {
                let Some(raw) = raw else {
                    continue;
                };
                if matcher.matches(&decode_properties(&raw)?) {
                    doomed.push(key);
                }
            }
            if doomed.is_empty() {
                return Ok(0);
            }
            self.with_connection("delete_many", |conn| redis::cmd("DEL").arg(&doomed).query(conn))
        }

        fn iterate(&self, collection: &str) -> Result<Vec<Record>> {
            let mut conn = self.get_connection("iterate")?;
            Self::require_collection(&mut conn, "iterate", collection)?;

            let pattern = Self::scan_pattern(collection);
            let keys = Self::scan_keys(&mut conn, &pattern).map_err(|e| failed("iterate", e))?;
            let mut records = Vec::with_capacity(keys.len());
            for key in keys {
                if let Some(entry) = Self::read_object(&mut conn, &key)? {
                    records.push(entry);
                }
            }
            self.return_connection(conn);
            records.sort_by_key(|(seq, _)| *seq);
            Ok(records.into_iter().map(|(_, r)| r).collect())
        }

        fn close(&self) -> Result<()> {
            self.open.store(false, Ordering::SeqCst);
            let mut guard = self
                .connection
                .lock()
                .map_err(|e| failed("redis_lock_connection", e))?;
            guard.take();
            Ok(())
        }
    }

    impl RedisEngine {
        fn insert_with(
            conn: &mut Connection,
            collection: &str,
            objects: Vec<DataObject>,
        ) -> Result<Vec<RecordId>> {
            Self::require_collection(conn, "insert_many", collection)?;
            let Some(first) = objects.first() else {
                return Ok(Vec::new());
            };

            let stored: Option<usize> = redis::cmd("HGET")
                .arg(DIMS_KEY)
                .arg(collection)
                .query(conn)
                .map_err(|e| failed("insert_many", e))?;
            let expected = stored.unwrap_or(first.vector.len());
            if let Some(bad) = objects.iter().find(|o| o.vector.len() != expected) {
                return Err(failed(
                    "insert_many",
                    format!(
                        "vector dimension mismatch: expected {expected}, got {}",
                        bad.vector.len()
                    ),
                ));
            }

            if stored.is_none() {
                redis::cmd("HSET")
                    .arg(DIMS_KEY)
                    .arg(collection)
                    .arg(expected)
                    .query::<()>(conn)
                    .map_err(|e| failed("insert_many", e))?;
            }
            Self::ensure_index(conn, collection, expected).map_err(|e| failed("create_index", e))?;

            let seq_key = format!("threadstore:{collection}:seq");
            let last: u64 = redis::cmd("INCRBY")
                .arg(&seq_key)
                .arg(objects.len())
                .query(conn)
                .map_err(|e| failed("insert_many", e))?;
            let first_seq = last + 1 - objects.len() as u64;

            let mut pipe = redis::pipe();
            pipe.atomic();
            let mut ids = Vec::with_capacity(objects.len());
            for (offset, object) in objects.into_iter().enumerate() {
                let id = RecordId::generate();
                let properties = serde_json::to_string(&object.properties)
                    .map_err(|e| failed("serialize_properties", e))?;
                let thread_ts = object
                    .properties
                    .get(crate::models::THREAD_TS_FIELD)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();

                pipe.cmd("HSET")
                    .arg(Self::object_key(collection, &id))
                    .arg("embedding")
                    .arg(Self::vector_to_bytes(&object.vector))
                    .arg("properties")
                    .arg(properties)
                    .arg("thread_ts")
                    .arg(thread_ts)
                    .arg("seq")
                    .arg(first_seq + offset as u64)
                    .ignore();
                ids.push(id);
            }
            pipe.query::<()>(conn).map_err(|e| failed("insert_many", e))?;
            Ok(ids)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_key_layout() {
            let id = RecordId::new("abc");
            assert_eq!(
                RedisEngine::object_key("slack_threads", &id),
                "threadstore:slack_threads:obj:abc"
            );
            assert_eq!(
                RedisEngine::index_name("slack_threads"),
                "threadstore:idx:slack_threads"
            );
        }

        #[test]
        fn test_vector_to_bytes() {
            let bytes = RedisEngine::vector_to_bytes(&[1.0, -2.0]);
            assert_eq!(bytes.len(), 8);
            assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        }

        #[test]
        fn test_parse_search_results_applies_floor() {
            let reply = Value::Array(vec![
                Value::Int(2),
                Value::BulkString(b"threadstore:t:obj:near".to_vec()),
                Value::Array(vec![
                    Value::BulkString(b"properties".to_vec()),
                    Value::BulkString(br#"{"head":"hi"}"#.to_vec()),
                    Value::BulkString(b"__embedding_score".to_vec()),
                    Value::BulkString(b"0.1".to_vec()),
                ]),
                Value::BulkString(b"threadstore:t:obj:far".to_vec()),
                Value::Array(vec![
                    Value::BulkString(b"__embedding_score".to_vec()),
                    Value::BulkString(b"1.8".to_vec()),
                ]),
            ]);

            let hits = RedisEngine::parse_search_results(&reply, 0.5).expect("parse failed");
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].record.uuid.as_str(), "near");
            assert_eq!(hits[0].record.head(), Some("hi"));
            assert!((hits[0].certainty - 0.95).abs() < 0.001);
        }

        #[test]
        fn test_corrupt_properties_are_an_error() {
            let reply = Value::Array(vec![
                Value::Int(1),
                Value::BulkString(b"threadstore:t:obj:broken".to_vec()),
                Value::Array(vec![
                    Value::BulkString(b"properties".to_vec()),
                    Value::BulkString(b"{not json".to_vec()),
                    Value::BulkString(b"__embedding_score".to_vec()),
                    Value::BulkString(b"0.1".to_vec()),
                ]),
            ]);

            let result = RedisEngine::parse_search_results(&reply, 0.0);
            assert!(matches!(result, Err(Error::OperationFailed { .. })));
            assert!(decode_properties(b"[1, 2]").is_err());
            assert!(decode_properties(br#"{"head":"hi"}"#).is_ok());
        }

        #[test]
        fn test_scan_pattern_escapes_collection_name() {
            assert_eq!(
                RedisEngine::scan_pattern("slack_threads"),
                "threadstore:slack_threads:obj:*"
            );
            assert_eq!(
                RedisEngine::scan_pattern("team*[a]?"),
                "threadstore:team\\*\\[a\\]\\?:obj:*"
            );
        }
    }
}
