//! Configuration module for packrat.

use serde::Deserialize;
use std::path::Path;

use crate::storage::{DEFAULT_FOLDER_SIZE_CEILING, DEFAULT_PREVIEW_MAX_BYTES};
use crate::{PackratError, Result};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Upload storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the uploads root.
    #[serde(default = "default_uploads_path")]
    pub uploads_path: String,
    /// Maximum request body size in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
    /// Run a compaction sweep once at startup.
    #[serde(default = "default_compact_on_startup")]
    pub compact_on_startup: bool,
    /// Largest file served as a text preview.
    #[serde(default = "default_preview_max_bytes")]
    pub preview_max_bytes: u64,
    /// Folder size computation stops once this many bytes are counted.
    #[serde(default = "default_folder_size_ceiling")]
    pub folder_size_ceiling_bytes: u64,
}

fn default_uploads_path() -> String {
    "data/uploads".to_string()
}

fn default_max_upload_size() -> u64 {
    512
}

fn default_compact_on_startup() -> bool {
    true
}

fn default_preview_max_bytes() -> u64 {
    DEFAULT_PREVIEW_MAX_BYTES
}

fn default_folder_size_ceiling() -> u64 {
    DEFAULT_FOLDER_SIZE_CEILING
}

impl StorageConfig {
    /// Maximum request body size in bytes.
    pub fn max_upload_size_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_path: default_uploads_path(),
            max_upload_size_mb: default_max_upload_size(),
            compact_on_startup: default_compact_on_startup(),
            preview_max_bytes: default_preview_max_bytes(),
            folder_size_ceiling_bytes: default_folder_size_ceiling(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/packrat.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Web UI configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    /// CORS allowed origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Whether to serve static files.
    #[serde(default)]
    pub serve_static: bool,
    /// Path to static files directory.
    #[serde(default = "default_static_path")]
    pub static_path: String,
}

fn default_static_path() -> String {
    "web/dist".to_string()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            cors_origins: vec![],
            serve_static: false,
            static_path: default_static_path(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Upload storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Web UI configuration.
    #[serde(default)]
    pub web: WebConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(PackratError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| PackratError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `PACKRAT_UPLOADS_PATH`: Override the uploads root
    /// - `PACKRAT_PORT`: Override the listen port
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("PACKRAT_UPLOADS_PATH") {
            if !path.is_empty() {
                self.storage.uploads_path = path;
            }
        }

        if let Ok(port) = std::env::var("PACKRAT_PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid PACKRAT_PORT"),
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.storage.uploads_path.trim().is_empty() {
            return Err(PackratError::Config(
                "storage.uploads_path must not be empty".to_string(),
            ));
        }
        if self.server.port == 0 {
            return Err(PackratError::Config(
                "server.port must be non-zero".to_string(),
            ));
        }
        if self.storage.max_upload_size_mb == 0 {
            return Err(PackratError::Config(
                "storage.max_upload_size_mb must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
