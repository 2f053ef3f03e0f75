//! Configuration types for opensearch-csv-export
//!
//! Configuration is read from an optional TOML file; every field has a
//! default except the search service addresses. Command-line flags are
//! applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// Main configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Search service connection settings
    #[serde(default)]
    pub opensearch: OpenSearchConfig,

    /// Export engine settings
    #[serde(default)]
    pub export: ExportConfig,

    /// HTTP API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(
                "config",
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;
        Self::from_toml(&text)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config {
            message: e.to_string(),
            key: None,
        })
    }

    /// Check settings that have no usable default
    pub fn validate(&self) -> Result<()> {
        if self.opensearch.addresses.is_empty() {
            return Err(Error::config(
                "opensearch.addresses",
                "missing opensearch addresses",
            ));
        }
        for address in &self.opensearch.addresses {
            url::Url::parse(address).map_err(|e| {
                Error::config(
                    "opensearch.addresses",
                    format!("invalid address {address:?}: {e}"),
                )
            })?;
        }
        if self.export.page_size == 0 {
            return Err(Error::config("export.page_size", "page size must be positive"));
        }
        if matches!(self.export.delimiter, ',' | '"' | '\r' | '\n') || !self.export.delimiter.is_ascii() {
            return Err(Error::config(
                "export.delimiter",
                format!(
                    "delimiter {:?} must be an ASCII character other than ',', '\"', CR or LF",
                    self.export.delimiter
                ),
            ));
        }
        if self.export.channel_capacity == 0 {
            return Err(Error::config(
                "export.channel_capacity",
                "channel capacity must be positive",
            ));
        }
        Ok(())
    }
}

/// Search service connection settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OpenSearchConfig {
    /// Base URLs of the search service nodes (at least one required)
    #[serde(default)]
    pub addresses: Vec<String>,

    /// Index names or patterns to search (empty = all indices)
    #[serde(default)]
    pub indices: Vec<String>,

    /// PEM file with an extra CA certificate to trust
    #[serde(default)]
    pub ca_cert_path: Option<PathBuf>,

    /// Per-request timeout in seconds (None = no timeout)
    #[serde(default, with = "optional_duration_serde")]
    pub request_timeout: Option<Duration>,
}

/// Export engine settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Rows requested per page (default: 10000)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// How long the service keeps the result window alive between pages, in seconds (default: 60)
    #[serde(default = "default_scroll_window", with = "duration_serde")]
    pub scroll_window: Duration,

    /// Document field holding the event timestamp (default: "@timestamp")
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,

    /// Document field holding the log message (default: "message")
    #[serde(default = "default_message_field")]
    pub message_field: String,

    /// Cell delimiter (default: ';')
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Free the result window on the service when the export ends (default: true)
    #[serde(default = "default_true")]
    pub release_window: bool,

    /// Compressed bytes to accumulate before handing a chunk to the consumer (default: 32 KiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Chunks buffered between producer and consumer (default: 16)
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            scroll_window: default_scroll_window(),
            timestamp_field: default_timestamp_field(),
            message_field: default_message_field(),
            delimiter: default_delimiter(),
            release_window: true,
            chunk_size: default_chunk_size(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// HTTP API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: false)
    #[serde(default)]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,

    /// Seconds to wait before draining on shutdown under Kubernetes (default: 5)
    #[serde(default = "default_shutdown_grace", with = "duration_serde")]
    pub shutdown_grace: Duration,

    /// Seconds open connections get to finish after shutdown starts (default: 5)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: false,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
            shutdown_grace: default_shutdown_grace(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Logging settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive when RUST_LOG is unset (default: "info")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output (default: false)
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_page_size() -> usize {
    10_000
}

fn default_scroll_window() -> Duration {
    Duration::from_secs(60)
}

fn default_timestamp_field() -> String {
    "@timestamp".to_string()
}

fn default_message_field() -> String {
    "message".to_string()
}

fn default_delimiter() -> char {
    ';'
}

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> usize {
    32 * 1024
}

fn default_channel_capacity() -> usize {
    16
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(5)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_log_level() -> String {
    "info".to_string()
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid() -> Config {
        let mut config = Config::default();
        config.opensearch.addresses = vec!["https://search.internal:9200".to_string()];
        config
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.export.page_size, 10_000);
        assert_eq!(config.export.scroll_window, Duration::from_secs(60));
        assert_eq!(config.export.timestamp_field, "@timestamp");
        assert_eq!(config.export.message_field, "message");
        assert_eq!(config.export.delimiter, ';');
        assert!(config.export.release_window);
        assert_eq!(config.api.bind_address.port(), 8080);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn missing_addresses_fail_validation() {
        let err = Config::default().validate().unwrap_err();
        match err {
            Error::Config { message, key } => {
                assert_eq!(message, "missing opensearch addresses");
                assert_eq!(key.as_deref(), Some("opensearch.addresses"));
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn unparseable_address_fails_validation() {
        let mut config = valid();
        config.opensearch.addresses.push("not a url".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn comma_and_quote_delimiters_are_rejected() {
        for bad in [',', '"', '\n', 'é'] {
            let mut config = valid();
            config.export.delimiter = bad;
            assert!(config.validate().is_err(), "{bad:?} accepted");
        }
        let mut config = valid();
        config.export.delimiter = '\t';
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let mut config = valid();
        config.export.page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = Config::from_toml(
            r#"
            [opensearch]
            addresses = ["http://localhost:9200"]
            indices = ["logs-*"]
            request_timeout = 30

            [export]
            page_size = 500
            scroll_window = 120
            delimiter = "|"

            [api]
            bind_address = "127.0.0.1:9000"
            shutdown_timeout = 20

            [log]
            level = "debug"
            json = true
            "#,
        )
        .unwrap();

        assert_eq!(config.opensearch.indices, vec!["logs-*".to_string()]);
        assert_eq!(config.opensearch.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.export.page_size, 500);
        assert_eq!(config.export.scroll_window, Duration::from_secs(120));
        assert_eq!(config.export.delimiter, '|');
        assert_eq!(config.export.timestamp_field, "@timestamp");
        assert_eq!(config.api.bind_address.port(), 9000);
        assert_eq!(config.api.shutdown_timeout, Duration::from_secs(20));
        assert_eq!(config.api.shutdown_grace, Duration::from_secs(5));
        assert!(config.log.json);
        config.validate().unwrap();
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[opensearch]\naddresses = [\"http://a:9200\", \"http://b:9200\"]").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.opensearch.addresses.len(), 2);
    }

    #[test]
    fn load_reports_missing_file_as_config_error() {
        let err = Config::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = Config::from_toml("[export\npage_size = ").unwrap_err();
        assert!(matches!(err, Error::Config { key: None, .. }));
    }
}
