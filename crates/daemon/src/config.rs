//! Configuration management for the NavFiles daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/navfiles/config.toml`.

use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("bind must be a socket address such as 127.0.0.1:3030, got {0}")]
    InvalidBindAddress(String),

    #[error("mount_path must start with '/', got {0}")]
    InvalidMountPath(String),

    #[error("preview_max_bytes must be greater than 0")]
    InvalidPreviewLimit,

    #[error("max_part_bytes must be greater than 0")]
    InvalidPartLimit,

    #[error("max_part_bytes ({part}) must not exceed max_request_bytes ({request})")]
    PartLimitExceedsRequestLimit { part: u64, request: u64 },

    #[error("archive program must not be empty")]
    EmptyArchiveProgram,

    #[error("root id must not be empty")]
    EmptyRootId,

    #[error("duplicate root id: {0}")]
    DuplicateRootId(String),

    #[error("root {id:?} path must be absolute, got {path}")]
    RelativeRootPath { id: String, path: String },
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Main configuration structure for the NavFiles daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// HTTP server configuration.
    pub server: ServerConfig,

    /// File preview settings.
    pub files: FilesConfig,

    /// Upload limits.
    pub upload: UploadConfig,

    /// Directory archiver.
    pub archive: ArchiveConfig,

    /// Configured file roots. File routes are only mounted when non-empty.
    pub roots: Vec<RootConfig>,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: String,

    /// Prefix under which the file routes are mounted.
    pub mount_path: String,
}

/// File preview settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilesConfig {
    /// Largest file returned inline by `/files/read` (default: 5MiB).
    pub preview_max_bytes: u64,
}

/// Upload limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UploadConfig {
    /// Largest single uploaded file (default: 1GiB).
    pub max_part_bytes: u64,

    /// Largest upload request body (default: 2GiB).
    pub max_request_bytes: u64,
}

/// External archiver used for directory downloads.
///
/// The program runs inside the directory being downloaded and must write a
/// zip archive to stdout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArchiveConfig {
    pub program: String,
    pub args: Vec<String>,
}

/// A file root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RootConfig {
    /// Identifier used by clients.
    pub id: String,

    /// Display label (defaults to the id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Absolute directory path. Created at startup if missing.
    pub path: PathBuf,
}

impl RootConfig {
    /// Label shown to clients.
    pub fn display_label(&self) -> String {
        self.label.clone().unwrap_or_else(|| self.id.clone())
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3030".to_string(),
            mount_path: "/plugins/navfiles".to_string(),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            preview_max_bytes: 5 * MIB,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_part_bytes: GIB,
            max_request_bytes: 2 * GIB,
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            program: "zip".to_string(),
            args: ["-q", "-r", "-", "."].iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("navfiles")
        .join("config.toml")
}

/// Returns the default directory for the starter root.
fn default_root_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("navfiles")
        .join("files")
}

impl Config {
    /// Default configuration with a single `files` root, as written by `init`.
    pub fn starter() -> Self {
        Self {
            roots: vec![RootConfig {
                id: "files".to_string(),
                label: Some("Files".to_string()),
                path: default_root_dir(),
            }],
            ..Self::default()
        }
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - NAVFILES_BIND: Override listen address
    /// - NAVFILES_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    ///
    /// Returns the `(variable, value)` pairs that were applied. Logging is
    /// usually not initialized yet, so the caller reports them.
    pub fn apply_env_overrides(&mut self) -> Vec<(&'static str, String)> {
        let mut applied = Vec::new();

        if let Ok(bind) = std::env::var("NAVFILES_BIND") {
            if !bind.is_empty() {
                self.server.bind = bind.clone();
                applied.push(("NAVFILES_BIND", bind));
            }
        }

        if let Ok(level) = std::env::var("NAVFILES_LOG_LEVEL") {
            if !level.is_empty() {
                self.daemon.log_level = level.clone();
                applied.push(("NAVFILES_LOG_LEVEL", level));
            }
        }

        applied
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        self.bind_addr()?;

        if !self.server.mount_path.starts_with('/') {
            return Err(ConfigError::InvalidMountPath(
                self.server.mount_path.clone(),
            ));
        }

        if self.files.preview_max_bytes == 0 {
            return Err(ConfigError::InvalidPreviewLimit);
        }

        if self.upload.max_part_bytes == 0 {
            return Err(ConfigError::InvalidPartLimit);
        }
        if self.upload.max_part_bytes > self.upload.max_request_bytes {
            return Err(ConfigError::PartLimitExceedsRequestLimit {
                part: self.upload.max_part_bytes,
                request: self.upload.max_request_bytes,
            });
        }

        if self.archive.program.trim().is_empty() {
            return Err(ConfigError::EmptyArchiveProgram);
        }

        let mut seen = HashSet::new();
        for root in &self.roots {
            if root.id.trim().is_empty() {
                return Err(ConfigError::EmptyRootId);
            }
            if !seen.insert(root.id.as_str()) {
                return Err(ConfigError::DuplicateRootId(root.id.clone()));
            }
            if !root.path.is_absolute() {
                return Err(ConfigError::RelativeRootPath {
                    id: root.id.clone(),
                    path: root.path.display().to_string(),
                });
            }
        }

        Ok(())
    }

    /// Parsed listen address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.server.bind.clone()))
    }

    /// Whether the configured archiver can be found.
    ///
    /// A missing archiver only breaks directory downloads, so callers warn
    /// instead of refusing to start.
    pub fn archiver_available(&self) -> bool {
        which::which(&self.archive.program).is_ok()
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
