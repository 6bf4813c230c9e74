//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;

/// Default filter when none is configured.
pub const DEFAULT_FILTER: &str = "threadstore=info,warn";
/// Filter used with `--verbose`.
pub const VERBOSE_FILTER: &str = "threadstore=debug,info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name; anything but `json` is pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directives.
    pub filter: String,
    /// Log file; stderr when absent.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: DEFAULT_FILTER.to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Builds the configuration from file settings and the process
    /// environment (`THREADSTORE_LOG`, `THREADSTORE_LOG_FORMAT`,
    /// `THREADSTORE_LOG_FILE`).
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        Self::from_sources(settings, verbose, |key| std::env::var(key).ok())
    }

    /// Builds the configuration from file settings and a variable lookup.
    ///
    /// Precedence: `--verbose`, then environment, then file, then defaults.
    #[must_use]
    pub fn from_sources(
        settings: Option<&LoggingSettings>,
        verbose: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut config = Self::default();

        if let Some(settings) = settings {
            if let Some(format) = &settings.format {
                config.format = LogFormat::parse(format);
            }
            if let Some(filter) = &settings.filter {
                config.filter.clone_from(filter);
            }
            config.file.clone_from(&settings.file);
        }

        if let Some(format) = lookup("THREADSTORE_LOG_FORMAT") {
            config.format = LogFormat::parse(&format);
        }
        if let Some(filter) = lookup("THREADSTORE_LOG") {
            config.filter = filter;
        }
        if let Some(file) = lookup("THREADSTORE_LOG_FILE") {
            config.file = Some(PathBuf::from(file));
        }

        if verbose {
            VERBOSE_FILTER.clone_into(&mut config.filter);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("other"), LogFormat::Pretty);
    }

    #[test]
    fn test_precedence() {
        let settings = LoggingSettings {
            format: Some("json".to_string()),
            filter: Some("threadstore=trace".to_string()),
            file: None,
        };

        let config = LoggingConfig::from_sources(Some(&settings), false, |_| None);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter, "threadstore=trace");

        let config = LoggingConfig::from_sources(Some(&settings), false, |key| {
            (key == "THREADSTORE_LOG").then(|| "warn".to_string())
        });
        assert_eq!(config.filter, "warn");

        let config = LoggingConfig::from_sources(Some(&settings), true, |_| None);
        assert_eq!(config.filter, VERBOSE_FILTER);
    }
}
