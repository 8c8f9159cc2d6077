//! Configuration types for postclip-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// External fetch tool configuration
///
/// Groups settings for locating and invoking the external media-fetch binary.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ToolConfig {
    /// Path to the fetch tool executable (auto-detected if None)
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    /// Binary name searched in PATH when no explicit path is set (default: "yt-dlp")
    #[serde(default = "default_binary_name")]
    pub binary_name: String,

    /// Whether to search PATH for the binary if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Extra arguments passed to every invocation (e.g. cookies or proxy flags)
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Upper bound for a single metadata query (default: 60 seconds)
    #[serde(with = "duration_serde", default = "default_metadata_timeout")]
    #[schema(value_type = u64)]
    pub metadata_timeout: Duration,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            binary_name: default_binary_name(),
            search_path: true,
            extra_args: Vec::new(),
            metadata_timeout: default_metadata_timeout(),
        }
    }
}

/// Retrieval behavior configuration (transient files, limits, observers)
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetrievalConfig {
    /// Directory for transient media files (default: system temp dir)
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// File name prefix for transient files (default: "x-video")
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Extension of fetched files when the rendition reports no container (default: "mp4")
    #[serde(default = "default_container_extension")]
    pub container_extension: String,

    /// Maximum accepted media size in bytes, checked against the known
    /// rendition size before the fetch starts (default: 500 MiB, None = unlimited)
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: Option<u64>,

    /// Per-observer progress buffer; records beyond it are dropped for that
    /// observer (default: 64)
    #[serde(default = "default_observer_buffer")]
    pub observer_buffer: usize,

    /// Number of trailing stderr lines kept for failure diagnostics (default: 50)
    #[serde(default = "default_stderr_tail_lines")]
    pub stderr_tail_lines: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            file_prefix: default_file_prefix(),
            container_extension: default_container_extension(),
            max_file_size_bytes: default_max_file_size(),
            observer_buffer: default_observer_buffer(),
            stderr_tail_lines: default_stderr_tail_lines(),
        }
    }
}

/// Main configuration
///
/// Fields are organized into logical sub-configs:
/// - [`tool`](ToolConfig) — the external fetch binary
/// - [`retrieval`](RetrievalConfig) — transient files, limits, progress observers
/// - [`server`](ServerIntegrationConfig) — REST API
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// External fetch tool settings
    #[serde(default)]
    pub tool: ToolConfig,

    /// Retrieval behavior settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// API and external server integration
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config {
            message: e.to_string(),
            key: None,
        })
    }

    /// Load a configuration file (TOML)
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read '{}': {}", path.display(), e),
            key: None,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply overrides from the process environment
    ///
    /// Recognized variables: `PORT`, `RATE_LIMIT` (requests per window),
    /// `MAX_FILE_SIZE` (bytes), `YTDLP_PATH`.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = lookup("PORT") {
            let port: u16 = parse_env("PORT", &port)?;
            self.server.api.bind_address.set_port(port);
        }
        if let Some(limit) = lookup("RATE_LIMIT") {
            let limit: u32 = parse_env("RATE_LIMIT", &limit)?;
            self.server.api.rate_limit.max_requests = limit;
            self.server.api.rate_limit.burst_size = limit;
        }
        if let Some(size) = lookup("MAX_FILE_SIZE") {
            self.retrieval.max_file_size_bytes = Some(parse_env("MAX_FILE_SIZE", &size)?);
        }
        if let Some(path) = lookup("YTDLP_PATH") {
            self.tool.binary_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Check invariants that serde defaults cannot express
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.observer_buffer == 0 {
            return Err(Error::Config {
                message: "observer buffer must hold at least one record".to_string(),
                key: Some("retrieval.observer_buffer".to_string()),
            });
        }
        if self.retrieval.container_extension.is_empty()
            || self.retrieval.container_extension.contains(['/', '\\', '.'])
        {
            return Err(Error::Config {
                message: format!(
                    "invalid container extension '{}'",
                    self.retrieval.container_extension
                ),
                key: Some("retrieval.container_extension".to_string()),
            });
        }
        if self.retrieval.file_prefix.contains(['/', '\\']) {
            return Err(Error::Config {
                message: "file prefix must not contain path separators".to_string(),
                key: Some("retrieval.file_prefix".to_string()),
            });
        }
        let rate_limit = &self.server.api.rate_limit;
        if rate_limit.enabled && (rate_limit.max_requests == 0 || rate_limit.window.is_zero()) {
            return Err(Error::Config {
                message: "rate limit needs a non-zero request count and window".to_string(),
                key: Some("server.api.rate_limit".to_string()),
            });
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| Error::Config {
        message: format!("invalid value '{value}': {e}"),
        key: Some(name.to_string()),
    })
}

/// External access and control interfaces
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 0.0.0.0:5000)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: false)
    #[serde(default)]
    pub swagger_ui: bool,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: false,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Rate limiting configuration
///
/// Each client IP may issue `max_requests` per `window` on the download
/// routes, with at most `burst_size` in quick succession.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RateLimitConfig {
    /// Enable rate limiting (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requests allowed per window per IP (default: 100)
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length (default: 1 hour)
    #[serde(with = "duration_serde", default = "default_rate_window")]
    #[schema(value_type = u64)]
    pub window: Duration,

    /// Burst size (default: 100)
    #[serde(default = "default_max_requests")]
    pub burst_size: u32,

    /// Path prefixes the limiter applies to (default: ["/api/download"])
    #[serde(default = "default_limited_paths")]
    pub limited_paths: Vec<String>,

    /// IPs exempt from rate limiting
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub exempt_ips: Vec<std::net::IpAddr>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_max_requests(),
            window: default_rate_window(),
            burst_size: default_max_requests(),
            limited_paths: default_limited_paths(),
            exempt_ips: Vec::new(),
        }
    }
}

fn default_binary_name() -> String {
    "yt-dlp".to_string()
}

fn default_true() -> bool {
    true
}

fn default_metadata_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_file_prefix() -> String {
    "x-video".to_string()
}

fn default_container_extension() -> String {
    "mp4".to_string()
}

fn default_max_file_size() -> Option<u64> {
    Some(524_288_000) // 500 MiB
}

fn default_observer_buffer() -> usize {
    64
}

fn default_stderr_tail_lines() -> usize {
    50
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

fn default_max_requests() -> u32 {
    100
}

fn default_rate_window() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_limited_paths() -> Vec<String> {
    vec!["/api/download".to_string()]
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

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_the_original_service() {
        let config = Config::default();
        assert_eq!(config.server.api.bind_address.port(), 5000);
        assert_eq!(config.retrieval.max_file_size_bytes, Some(524_288_000));
        assert_eq!(config.server.api.rate_limit.max_requests, 100);
        assert_eq!(
            config.server.api.rate_limit.window,
            Duration::from_secs(3600)
        );
        assert_eq!(config.tool.binary_name, "yt-dlp");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.retrieval.container_extension, "mp4");
        assert_eq!(config.retrieval.observer_buffer, 64);
        assert!(config.tool.search_path);
    }

    #[test]
    fn toml_overrides_nested_sections() {
        let config = Config::from_toml_str(
            r#"
            [tool]
            binary_path = "/opt/yt-dlp"
            metadata_timeout = 15

            [retrieval]
            temp_dir = "/var/tmp/clips"
            max_file_size_bytes = 1024

            [server.api]
            bind_address = "127.0.0.1:8080"

            [server.api.rate_limit]
            enabled = false
            window = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.tool.binary_path, Some(PathBuf::from("/opt/yt-dlp")));
        assert_eq!(config.tool.metadata_timeout, Duration::from_secs(15));
        assert_eq!(config.retrieval.temp_dir, PathBuf::from("/var/tmp/clips"));
        assert_eq!(config.retrieval.max_file_size_bytes, Some(1024));
        assert_eq!(config.server.api.bind_address.port(), 8080);
        assert!(!config.server.api.rate_limit.enabled);
        assert_eq!(config.server.api.rate_limit.window, Duration::from_secs(60));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = Config::from_toml_str("[retrieval\ntemp_dir = 3").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postclip.toml");
        std::fs::write(&path, "[retrieval]\nfile_prefix = \"clip\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.retrieval.file_prefix, "clip");

        let missing = Config::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, Error::Config { .. }));
    }

    #[test]
    fn env_overrides_apply_known_variables() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("PORT", "5001"),
            ("RATE_LIMIT", "10"),
            ("MAX_FILE_SIZE", "2048"),
            ("YTDLP_PATH", "/usr/local/bin/yt-dlp"),
        ]);
        let mut config = Config::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.api.bind_address.port(), 5001);
        assert_eq!(config.server.api.rate_limit.max_requests, 10);
        assert_eq!(config.server.api.rate_limit.burst_size, 10);
        assert_eq!(config.retrieval.max_file_size_bytes, Some(2048));
        assert_eq!(
            config.tool.binary_path,
            Some(PathBuf::from("/usr/local/bin/yt-dlp"))
        );
    }

    #[test]
    fn env_override_with_garbage_names_the_variable() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|name| (name == "PORT").then(|| "not-a-port".to_string()))
            .unwrap_err();

        match err {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("PORT")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    #[serial_test::serial]
    fn env_overrides_read_process_environment() {
        // SAFETY: serialized with other environment-mutating tests
        unsafe { std::env::set_var("MAX_FILE_SIZE", "4096") };
        let mut config = Config::default();
        let result = config.apply_env_overrides();
        unsafe { std::env::remove_var("MAX_FILE_SIZE") };

        result.unwrap();
        assert_eq!(config.retrieval.max_file_size_bytes, Some(4096));
    }

    #[test]
    fn validate_rejects_broken_settings() {
        let mut config = Config::default();
        config.retrieval.observer_buffer = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retrieval.container_extension = "../mp4".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retrieval.file_prefix = "a/b".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.api.rate_limit.max_requests = 0;
        assert!(config.validate().is_err());
    }
}
