//! Configuration management.
//!
//! Configuration is read from a TOML file, then overridden by `THREADSTORE_*`
//! environment variables.
//!
//! ```toml
//! data_dir = "/var/lib/threadstore"
//! collection_name = "slack_threads"
//! embedding_model = "all-MiniLM-L6-v2"
//! generate_embeddings = true
//! k_retrievals = 3
//! certainty_threshold = 0.5
//! engine = "memory"            # or "redis"
//! redis_url = "redis://localhost:6379"
//!
//! [logging]
//! format = "pretty"            # or "json"
//! filter = "threadstore=info"
//! file = "/var/log/threadstore.log"
//!
//! [metrics]
//! enabled = true
//! file = "/var/lib/node_exporter/textfile/threadstore.prom"
//! ```

use crate::models::RetrievalOptions;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default number of retrieval results.
pub const DEFAULT_K_RETRIEVALS: usize = 3;
/// Default certainty floor for retrieval.
pub const DEFAULT_CERTAINTY_THRESHOLD: f32 = 0.5;
/// Default collection for thread records.
pub const DEFAULT_COLLECTION_NAME: &str = "slack_threads";
/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";
/// Default Redis URL.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
/// Snapshot file of the in-memory engine, relative to the data directory.
pub const SNAPSHOT_FILE: &str = "engine.json";

/// Which vector engine to connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineKind {
    /// Embedded in-memory engine.
    #[default]
    Memory,
    /// Redis Stack (requires the `redis` feature).
    Redis,
}

impl EngineKind {
    /// Parses an engine name.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown name.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "in-memory" | "inmemory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(Error::InvalidInput(format!("unknown engine: {other}"))),
        }
    }

    /// Engine name as written in configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
        }
    }
}

/// Main configuration for threadstore.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadStoreConfig {
    /// Directory for the engine snapshot and model cache. `None` keeps the
    /// in-memory engine unpersisted.
    pub data_dir: Option<PathBuf>,
    /// Collection used when none is given.
    pub collection_name: String,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Whether to load an embedding model. Without one only external
    /// vectors and vector queries are accepted.
    pub generate_embeddings: bool,
    /// Default number of retrieval results.
    pub k_retrievals: usize,
    /// Default certainty floor.
    pub certainty_threshold: f32,
    /// Engine to connect to.
    pub engine: EngineKind,
    /// Redis URL, used when `engine` is `redis`.
    pub redis_url: String,
    /// Logging settings from the `[logging]` table.
    pub logging: LoggingSettings,
    /// Metrics settings from the `[metrics]` table.
    pub metrics: MetricsSettings,
}

/// Logging section of the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// `tracing_subscriber::EnvFilter` directives.
    pub filter: Option<String>,
    /// Log file; stderr when absent.
    pub file: Option<PathBuf>,
}

/// Metrics section of the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MetricsSettings {
    /// Install the Prometheus recorder.
    pub enabled: Option<bool>,
    /// Exposition file written after each command.
    pub file: Option<PathBuf>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Collection name.
    pub collection_name: Option<String>,
    /// Embedding model.
    pub embedding_model: Option<String>,
    /// Generate embeddings.
    pub generate_embeddings: Option<bool>,
    /// Retrieval count.
    pub k_retrievals: Option<usize>,
    /// Certainty floor.
    pub certainty_threshold: Option<f32>,
    /// Engine name.
    pub engine: Option<String>,
    /// Redis URL.
    pub redis_url: Option<String>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
    /// Metrics section.
    pub metrics: Option<MetricsSettings>,
}

impl Default for ThreadStoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            generate_embeddings: true,
            k_retrievals: DEFAULT_K_RETRIEVALS,
            certainty_threshold: DEFAULT_CERTAINTY_THRESHOLD,
            engine: EngineKind::Memory,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            logging: LoggingSettings::default(),
            metrics: MetricsSettings::default(),
        }
    }
}

impl ThreadStoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or holds an
    /// invalid value.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or holds an invalid
    /// value.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Self::from_config_file(file)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/threadstore/` on macOS)
    /// 2. XDG config dir (`~/.config/threadstore/` for Unix compatibility)
    ///
    /// Returns default configuration if no config file is found. The data
    /// directory falls back to the platform data dir.
    #[must_use]
    pub fn load_default() -> Self {
        let mut config = Self::find_default_file()
            .and_then(|path| match Self::load_from_file(&path) {
                Ok(config) => Some(config),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                    None
                },
            })
            .unwrap_or_default();

        if config.data_dir.is_none() {
            config.data_dir = default_data_dir();
        }
        config
    }

    fn find_default_file() -> Option<PathBuf> {
        let base_dirs = directories::BaseDirs::new()?;

        // Check platform-specific config dir first
        let platform_config = base_dirs
            .config_dir()
            .join("threadstore")
            .join("config.toml");
        if platform_config.exists() {
            return Some(platform_config);
        }

        // Fall back to XDG-style ~/.config/threadstore/ for Unix compatibility
        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("threadstore")
            .join("config.toml");
        xdg_config.exists().then_some(xdg_config)
    }

    /// Converts a `ConfigFile` to `ThreadStoreConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = Some(PathBuf::from(data_dir));
        }
        if let Some(name) = file.collection_name {
            config.collection_name = name;
        }
        if let Some(model) = file.embedding_model {
            config.embedding_model = model;
        }
        if let Some(v) = file.generate_embeddings {
            config.generate_embeddings = v;
        }
        if let Some(k) = file.k_retrievals {
            config.k_retrievals = k;
        }
        if let Some(certainty) = file.certainty_threshold {
            config.certainty_threshold = certainty;
        }
        if let Some(engine) = file.engine {
            config.engine = EngineKind::parse(&engine)?;
        }
        if let Some(url) = file.redis_url {
            config.redis_url = url;
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }
        if let Some(metrics) = file.metrics {
            config.metrics = metrics;
        }

        config.validate()?;
        Ok(config)
    }

    /// Applies `THREADSTORE_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an unparseable value.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup (keys are the
    /// `THREADSTORE_*` variable names).
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be parsed.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        fn parsed<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
        where
            T::Err: std::fmt::Display,
        {
            value
                .trim()
                .parse()
                .map_err(|e| Error::InvalidInput(format!("{key}={value}: {e}")))
        }

        if let Some(v) = lookup("THREADSTORE_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("THREADSTORE_COLLECTION") {
            self.collection_name = v;
        }
        if let Some(v) = lookup("THREADSTORE_EMBEDDING_MODEL") {
            self.embedding_model = v;
        }
        if let Some(v) = lookup("THREADSTORE_GENERATE_EMBEDDINGS") {
            self.generate_embeddings = parsed("THREADSTORE_GENERATE_EMBEDDINGS", &v)?;
        }
        if let Some(v) = lookup("THREADSTORE_K_RETRIEVALS") {
            self.k_retrievals = parsed("THREADSTORE_K_RETRIEVALS", &v)?;
        }
        if let Some(v) = lookup("THREADSTORE_CERTAINTY_THRESHOLD") {
            self.certainty_threshold = parsed("THREADSTORE_CERTAINTY_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("THREADSTORE_ENGINE") {
            self.engine = EngineKind::parse(&v)?;
        }
        if let Some(v) = lookup("THREADSTORE_REDIS_URL") {
            self.redis_url = v;
        }

        self.validate()?;
        Ok(self)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero `k_retrievals`, a certainty threshold
    /// outside `[0, 1]`, or an empty collection name.
    pub fn validate(&self) -> Result<()> {
        if self.k_retrievals == 0 {
            return Err(Error::InvalidInput("k_retrievals must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.certainty_threshold) {
            return Err(Error::InvalidInput(format!(
                "certainty_threshold must be within [0, 1], got {}",
                self.certainty_threshold
            )));
        }
        if self.collection_name.trim().is_empty() {
            return Err(Error::InvalidInput(
                "collection_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Sets whether an embedding model is loaded.
    #[must_use]
    pub const fn with_generate_embeddings(mut self, generate: bool) -> Self {
        self.generate_embeddings = generate;
        self
    }

    /// Retrieval options from the configured defaults.
    #[must_use]
    pub fn retrieval_options(&self) -> RetrievalOptions {
        RetrievalOptions::new()
            .with_limit(self.k_retrievals)
            .with_certainty_floor(self.certainty_threshold)
    }

    /// Path of the in-memory engine snapshot, if persistent.
    #[must_use]
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|d| d.join(SNAPSHOT_FILE))
    }

    /// Directory embedding models are cached in, if persistent.
    #[must_use]
    pub fn model_cache_dir(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|d| d.join("models"))
    }
}

/// Platform data directory for threadstore.
#[must_use]
pub fn default_data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "threadstore").map(|dirs| dirs.data_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ThreadStoreConfig::default();
        assert_eq!(config.collection_name, "slack_threads");
        assert_eq!(config.k_retrievals, 3);
        assert!((config.certainty_threshold - 0.5).abs() < f32::EPSILON);
        assert!(config.generate_embeddings);
        assert_eq!(config.engine, EngineKind::Memory);
        assert!(config.snapshot_path().is_none());
        assert_eq!(config.retrieval_options(), RetrievalOptions::default());
    }

    #[test]
    fn test_from_toml() {
        let config = ThreadStoreConfig::from_toml(
            r#"
            data_dir = "/tmp/ts"
            collection_name = "support"
            k_retrievals = 5
            certainty_threshold = 0.7
            engine = "redis"
            generate_embeddings = false

            [logging]
            format = "json"

            [metrics]
            enabled = true
            "#,
        )
        .expect("parse failed");

        assert_eq!(config.collection_name, "support");
        assert_eq!(config.k_retrievals, 5);
        assert_eq!(config.engine, EngineKind::Redis);
        assert!(!config.generate_embeddings);
        assert_eq!(config.logging.format.as_deref(), Some("json"));
        assert_eq!(config.metrics.enabled, Some(true));
        assert!(config.metrics.file.is_none());
        assert_eq!(
            config.snapshot_path(),
            Some(PathBuf::from("/tmp/ts").join(SNAPSHOT_FILE))
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ThreadStoreConfig::from_toml("certainty_threshold = 1.5").is_err());
        assert!(ThreadStoreConfig::from_toml("k_retrievals = 0").is_err());
        assert!(ThreadStoreConfig::from_toml("engine = \"qdrant\"").is_err());
        assert!(ThreadStoreConfig::from_toml("not toml [").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("THREADSTORE_COLLECTION", "ops"),
            ("THREADSTORE_K_RETRIEVALS", "7"),
            ("THREADSTORE_GENERATE_EMBEDDINGS", "false"),
        ]
        .into_iter()
        .collect();

        let config = ThreadStoreConfig::default()
            .with_overrides_from(|key| env.get(key).map(ToString::to_string))
            .expect("overrides failed");
        assert_eq!(config.collection_name, "ops");
        assert_eq!(config.k_retrievals, 7);
        assert!(!config.generate_embeddings);

        let bad = ThreadStoreConfig::default()
            .with_overrides_from(|key| (key == "THREADSTORE_K_RETRIEVALS").then(|| "many".to_string()));
        assert!(bad.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().expect("tempdir failed");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "collection_name = \"from_file\"\n").expect("write failed");

        let config = ThreadStoreConfig::load_from_file(&path).expect("load failed");
        assert_eq!(config.collection_name, "from_file");

        assert!(ThreadStoreConfig::load_from_file(&dir.path().join("missing.toml")).is_err());
    }
}
