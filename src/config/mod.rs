//! Configuration management
//!
//! This module handles loading and parsing configuration for the Rollcall service.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables prefixed with `ROLLCALL_` (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Signature evidence storage
    #[serde(default)]
    pub evidence: EvidenceConfig,
    /// Login and bearer token settings
    #[serde(default)]
    pub auth: AuthConfig,
    /// Marking pipeline settings
    #[serde(default)]
    pub attendance: AttendanceConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/rollcall.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// In-process cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached entries
    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,
    /// Cache TTL in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: default_cache_capacity(),
            ttl_seconds: default_cache_ttl(),
        }
    }
}

fn default_cache_capacity() -> u64 {
    10_000
}

fn default_cache_ttl() -> u64 {
    60
}

/// Signature evidence storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceConfig {
    /// Directory the evidence blobs are written to
    #[serde(default = "default_evidence_path")]
    pub path: PathBuf,
    /// Public URL prefix the blobs are served under
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Maximum decoded payload size in bytes (default: 2MB)
    #[serde(default = "default_max_evidence_size")]
    pub max_size: u64,
    /// Images narrower or shorter than this are treated as blank
    #[serde(default = "default_min_dimension")]
    pub min_dimension: u32,
    /// Storage write attempts before giving up
    #[serde(default = "default_upload_attempts")]
    pub upload_attempts: u32,
    /// Initial backoff between storage write attempts
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            path: default_evidence_path(),
            public_base_url: default_public_base_url(),
            max_size: default_max_evidence_size(),
            min_dimension: default_min_dimension(),
            upload_attempts: default_upload_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_evidence_path() -> PathBuf {
    PathBuf::from("uploads/signatures")
}

fn default_public_base_url() -> String {
    "/uploads/signatures".to_string()
}

fn default_max_evidence_size() -> u64 {
    2 * 1024 * 1024 // 2MB
}

fn default_min_dimension() -> u32 {
    2
}

fn default_upload_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Bearer token lifetime in hours
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
    /// Failed logins allowed per username within the window
    #[serde(default = "default_max_login_attempts")]
    pub max_login_attempts: usize,
    /// Failed login window in minutes
    #[serde(default = "default_login_window_minutes")]
    pub login_window_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl_hours(),
            max_login_attempts: default_max_login_attempts(),
            login_window_minutes: default_login_window_minutes(),
        }
    }
}

fn default_session_ttl_hours() -> i64 {
    12
}

fn default_max_login_attempts() -> usize {
    5
}

fn default_login_window_minutes() -> i64 {
    15
}

/// Marking pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceConfig {
    /// Key for record integrity tags. Empty means a random per-process key.
    #[serde(default)]
    pub receipt_secret: String,
    /// Submissions accepted per student per minute
    #[serde(default = "default_max_submissions_per_minute")]
    pub max_submissions_per_minute: usize,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            receipt_secret: String::new(),
            max_submissions_per_minute: default_max_submissions_per_minute(),
        }
    }
}

fn default_max_submissions_per_minute() -> usize {
    10
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - ROLLCALL_SERVER_HOST
    /// - ROLLCALL_SERVER_PORT
    /// - ROLLCALL_SERVER_CORS_ORIGIN
    /// - ROLLCALL_DATABASE_DRIVER
    /// - ROLLCALL_DATABASE_URL
    /// - ROLLCALL_EVIDENCE_PATH
    /// - ROLLCALL_EVIDENCE_PUBLIC_BASE_URL
    /// - ROLLCALL_AUTH_SESSION_TTL_HOURS
    /// - ROLLCALL_ATTENDANCE_RECEIPT_SECRET
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the marking pipeline unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.evidence.upload_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "evidence.upload_attempts must be at least 1".to_string(),
            ));
        }
        if self.auth.session_ttl_hours <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.session_ttl_hours must be positive".to_string(),
            ));
        }
        if self.attendance.max_submissions_per_minute == 0 {
            return Err(ConfigError::ValidationError(
                "attendance.max_submissions_per_minute must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("ROLLCALL_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("ROLLCALL_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("ROLLCALL_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        if let Ok(driver) = std::env::var("ROLLCALL_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("ROLLCALL_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(path) = std::env::var("ROLLCALL_EVIDENCE_PATH") {
            self.evidence.path = PathBuf::from(path);
        }
        if let Ok(base) = std::env::var("ROLLCALL_EVIDENCE_PUBLIC_BASE_URL") {
            self.evidence.public_base_url = base;
        }

        if let Ok(hours) = std::env::var("ROLLCALL_AUTH_SESSION_TTL_HOURS") {
            if let Ok(hours) = hours.parse::<i64>() {
                self.auth.session_ttl_hours = hours;
            }
        }

        if let Ok(secret) = std::env::var("ROLLCALL_ATTENDANCE_RECEIPT_SECRET") {
            self.attendance.receipt_secret = secret;
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
