//! Prometheus metrics.
//!
//! Service operations emit counters and histograms through the `metrics`
//! facade. [`install_prometheus`] installs a Prometheus recorder for them;
//! a library user may install any other recorder instead.

use crate::config::MetricsSettings;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::{Path, PathBuf};

/// Metrics configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Whether a recorder is installed.
    pub enabled: bool,
    /// Exposition file written on flush, for a textfile collector.
    /// Stderr when absent.
    pub file: Option<PathBuf>,
}

impl MetricsConfig {
    /// Builds the configuration from file settings and the process
    /// environment (`THREADSTORE_METRICS_ENABLED`, `THREADSTORE_METRICS_FILE`).
    #[must_use]
    pub fn from_settings(settings: Option<&MetricsSettings>) -> Self {
        Self::from_sources(settings, |key| std::env::var(key).ok())
    }

    /// Builds the configuration from file settings and a variable lookup.
    #[must_use]
    pub fn from_sources(
        settings: Option<&MetricsSettings>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut config = Self {
            enabled: settings.and_then(|s| s.enabled).unwrap_or(false),
            file: settings.and_then(|s| s.file.clone()),
        };

        if let Some(enabled) = lookup("THREADSTORE_METRICS_ENABLED").and_then(|v| parse_bool(&v))
        {
            config.enabled = enabled;
        }
        if let Some(file) = lookup("THREADSTORE_METRICS_FILE") {
            config.file = Some(PathBuf::from(file));
        }
        config
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Handle to the installed recorder's registry.
#[derive(Clone)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
    file: Option<PathBuf>,
}

impl MetricsHandle {
    /// Wraps a Prometheus handle.
    #[must_use]
    pub const fn new(prometheus: PrometheusHandle, file: Option<PathBuf>) -> Self {
        Self { prometheus, file }
    }

    /// Renders the Prometheus text exposition.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus.render()
    }

    /// Exposition file, if configured.
    #[must_use]
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Writes the exposition to `path`, replacing its contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parent directory cannot be
    /// written.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
                operation: "create_metrics_dir".to_string(),
                cause: format!("{}: {e}", parent.display()),
            })?;
        }
        std::fs::write(path, self.render()).map_err(|e| Error::OperationFailed {
            operation: "write_metrics_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })
    }
}

/// Installs the Prometheus recorder globally.
///
/// Returns `None` when metrics are disabled.
///
/// # Errors
///
/// Returns an error if a global recorder is already installed.
pub fn install_prometheus(config: &MetricsConfig) -> Result<Option<MetricsHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_recorder_install".to_string(),
            cause: e.to_string(),
        })?;
    Ok(Some(MetricsHandle::new(prometheus, config.file.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::InMemoryServer;
    use crate::models::{EmbeddingSource, Properties};
    use crate::services::ThreadStore;
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_config_from_sources() {
        let settings = MetricsSettings {
            enabled: Some(true),
            file: Some(PathBuf::from("/tmp/from-file.prom")),
        };
        let config = MetricsConfig::from_sources(Some(&settings), |_| None);
        assert!(config.enabled);
        assert_eq!(config.file, Some(PathBuf::from("/tmp/from-file.prom")));

        let env: HashMap<&str, &str> = [
            ("THREADSTORE_METRICS_ENABLED", "off"),
            ("THREADSTORE_METRICS_FILE", "/tmp/env.prom"),
        ]
        .into_iter()
        .collect();
        let config =
            MetricsConfig::from_sources(Some(&settings), |key| env.get(key).map(ToString::to_string));
        assert!(!config.enabled);
        assert_eq!(config.file, Some(PathBuf::from("/tmp/env.prom")));

        assert_eq!(MetricsConfig::from_sources(None, |_| None), MetricsConfig::default());
    }

    #[test]
    fn test_disabled_installs_nothing() {
        let handle = install_prometheus(&MetricsConfig::default()).expect("install failed");
        assert!(handle.is_none());
    }

    #[test]
    fn test_store_operations_are_recorded() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = MetricsHandle::new(recorder.handle(), None);

        metrics::with_local_recorder(&recorder, || {
            let server = InMemoryServer::new();
            let store = ThreadStore::connect(server.connector(), None).expect("connect failed");
            let mut record = Properties::new();
            record.insert("head".to_string(), json!("deploy failed"));
            let vectors = vec![vec![1.0, 0.0]];
            let status = store
                .store(&[record], "slack_threads", EmbeddingSource::External(&vectors))
                .expect("store failed");
            assert!(status.is_stored());
        });

        let rendered = handle.render();
        assert!(rendered.contains("threadstore_store_total{status=\"success\"} 1"));
        assert!(rendered.contains("threadstore_collection_created_total 1"));
    }

    #[test]
    fn test_write_exposition_file() {
        let dir = TempDir::new().expect("tempdir failed");
        let path = dir.path().join("textfile").join("threadstore.prom");
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = MetricsHandle::new(recorder.handle(), Some(path.clone()));

        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("threadstore_delete_total", "status" => "success").increment(2);
        });

        handle.write_to(handle.file().expect("file configured")).expect("write failed");
        let written = std::fs::read_to_string(&path).expect("read failed");
        assert!(written.contains("threadstore_delete_total{status=\"success\"} 2"));
    }
}
