// Configuration types module
// Defines all configuration-related data structures

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub http: HttpConfig,
    #[serde(default)]
    pub static_files: StaticFilesConfig,
    #[serde(default)]
    pub routes: RoutesConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Database target and pool sizing
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Full connection string; takes precedence over the individual parts
    #[serde(default)]
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

/// Performance configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive_timeout: u64,
    pub read_timeout: u64,
    pub write_timeout: u64,
    pub max_connections: Option<u64>,
}

/// HTTP configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    pub server_name: String,
    pub enable_cors: bool,
    pub max_body_size: u64,
}

/// Front-end bundle served for every non-API path
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StaticFilesConfig {
    #[serde(default = "default_static_enabled")]
    pub enabled: bool,
    #[serde(default = "default_static_root")]
    pub root: String,
    #[serde(default = "default_index_files")]
    pub index_files: Vec<String>,
    /// Files never served even when they sit under `root`
    #[serde(skip)]
    pub hidden: Vec<PathBuf>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_static_enabled() -> bool {
    true
}

#[allow(clippy::missing_const_for_fn)]
fn default_static_root() -> String {
    "static".to_string()
}

fn default_index_files() -> Vec<String> {
    vec!["index.html".to_string()]
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            enabled: default_static_enabled(),
            root: default_static_root(),
            index_files: default_index_files(),
            hidden: Vec::new(),
        }
    }
}

/// Routes configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RoutesConfig {
    /// Health check configuration
    #[serde(default)]
    pub health: HealthConfig,
}

/// Health check configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HealthConfig {
    /// Enable health check endpoints
    #[serde(default = "default_health_enabled")]
    pub enabled: bool,
    /// Liveness probe path (default: /healthz)
    #[serde(default = "default_healthz_path")]
    pub liveness_path: String,
    /// Readiness probe path (default: /readyz)
    #[serde(default = "default_readyz_path")]
    pub readiness_path: String,
}

#[allow(clippy::missing_const_for_fn)]
fn default_health_enabled() -> bool {
    true
}

#[allow(clippy::missing_const_for_fn)]
fn default_healthz_path() -> String {
    "/healthz".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_readyz_path() -> String {
    "/readyz".to_string()
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: default_health_enabled(),
            liveness_path: default_healthz_path(),
            readiness_path: default_readyz_path(),
        }
    }
}

/// Upload handling
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UploadConfig {
    /// Parent directory for per-request scratch directories (system temp if unset)
    #[serde(default)]
    pub temp_dir: Option<String>,
    /// Rows per INSERT statement during bulk import
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Total uncompressed bytes a Zip upload may expand to
    #[serde(default = "default_max_extracted_size")]
    pub max_extracted_size: u64,
    #[serde(default = "default_max_archive_entries")]
    pub max_archive_entries: usize,
}

#[allow(clippy::missing_const_for_fn)]
fn default_batch_size() -> usize {
    500
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_extracted_size() -> u64 {
    1_073_741_824 // 1GB
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_archive_entries() -> usize {
    10_000
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            batch_size: default_batch_size(),
            max_extracted_size: default_max_extracted_size(),
            max_archive_entries: default_max_archive_entries(),
        }
    }
}

/// Administrative API capabilities
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ApiConfig {
    /// Allow `POST /api/query` to run client-supplied SQL
    #[serde(default)]
    pub enable_sql_query: bool,
    /// When set, `X-Admin-Token` must carry this value for ad-hoc SQL
    #[serde(default)]
    pub admin_token: Option<String>,
}
