//! Configuration schema definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseraConfig {
    /// Logging settings.
    pub logging: LoggingConfig,

    /// Registry composition settings.
    pub registry: RegistrySettings,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Newline-delimited JSON, requires the `json-log` feature.
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// The file at [`LoggingConfig::file_path`].
    File,
}

/// Rotation period of the log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Minutely,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanEventConfig {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global log level.
    pub level: LogLevel,

    pub format: LogFormat,

    pub output: LogOutput,

    /// Per-target levels, e.g. `tessera_core::service = "debug"`.
    pub filters: BTreeMap<String, LogLevel>,

    pub span_events: SpanEventConfig,

    /// Include thread ids in log lines.
    pub thread_ids: bool,

    /// Include source file and line in log lines.
    pub file_location: bool,

    /// Log file, used when `output` is `file`.
    pub file_path: Option<PathBuf>,

    pub rotation: LogRotation,

    /// Rotated files to keep. Unlimited when unset.
    pub max_files: Option<usize>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            filters: BTreeMap::new(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            rotation: LogRotation::Never,
            max_files: None,
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Registry composition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Load the exports linked into the binary with `#[export]`.
    pub linked_exports: bool,

    /// Values published as JSON plugins.
    pub manifest: Vec<ManifestEntry>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            linked_exports: true,
            manifest: Vec::new(),
        }
    }
}

/// One configured value published to the registry.
///
/// ```toml
/// [[registry.manifest]]
/// name = "greeting"
/// priority = 10
/// value = { text = "hello" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Contract name the value is registered under.
    pub name: String,

    #[serde(default)]
    pub priority: i32,

    pub value: Value,

    /// Extra descriptor metadata.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ManifestEntry {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            value: value.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config: TesseraConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.logging.output, LogOutput::Stdout);
        assert!(config.registry.linked_exports);
        assert!(config.registry.manifest.is_empty());
    }

    #[test]
    fn manifest_entry_shape() {
        let config: TesseraConfig = serde_json::from_value(serde_json::json!({
            "logging": { "level": "warning", "filters": { "tessera_core": "trace" } },
            "registry": {
                "linked_exports": false,
                "manifest": [
                    { "name": "greeting", "priority": 5, "value": "hello" },
                    { "name": "limits", "value": { "max": 3 }, "metadata": { "owner": "ops" } }
                ]
            }
        }))
        .unwrap();

        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(config.logging.filters["tessera_core"], LogLevel::Trace);
        assert!(!config.registry.linked_exports);
        let [greeting, limits] = config.registry.manifest.as_slice() else {
            panic!("expected two manifest entries");
        };
        assert_eq!(greeting.priority, 5);
        assert_eq!(limits.priority, 0);
        assert_eq!(limits.value["max"], 3);
        assert_eq!(limits.metadata["owner"], "ops");
    }

    #[test]
    fn unknown_level_is_rejected() {
        let result = serde_json::from_str::<LoggingConfig>(r#"{ "level": "loud" }"#);
        assert!(result.is_err());
    }
}
