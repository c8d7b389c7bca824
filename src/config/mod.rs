// Configuration module entry point
// Loads the layered configuration and owns the shared application state

mod state;
mod types;

use std::net::SocketAddr;
use std::path::PathBuf;

pub use state::AppState;
pub use types::{
    ApiConfig, Config, DatabaseConfig, HealthConfig, HttpConfig, LoggingConfig,
    PerformanceConfig, RoutesConfig, ServerConfig, StaticFilesConfig, UploadConfig,
};

/// Default config file (without extension)
pub const DEFAULT_CONFIG_PATH: &str = "config";

impl Config {
    /// Load configuration from the default `config.toml`
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from specified file path (without extension)
    ///
    /// Layering: defaults, then the optional file, then `WEBGIS__*` variables,
    /// then `DATABASE_URL`.
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix("WEBGIS").separator("__"))
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("database.host", "localhost")?
            .set_default("database.port", 5432)?
            .set_default("database.user", "postgres")?
            .set_default("database.password", "postgres")?
            .set_default("database.name", "webgis_db")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 0)?
            .set_default("database.acquire_timeout_secs", 10)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 60)?
            .set_default("performance.write_timeout", 60)?
            .set_default("http.server_name", "webgis-backend")?
            .set_default("http.enable_cors", true)?
            .set_default("http.max_body_size", 104_857_600)? // 100MB
            .build()?;

        let mut cfg: Self = settings.try_deserialize()?;
        if let Some(path) = config_file_path(config_path) {
            cfg.static_files.hidden.push(path);
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                cfg.database.url = Some(url);
            }
        }
        Ok(cfg)
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}

/// Extensions `config::File::with_name` tries, in its order
const CONFIG_EXTENSIONS: [&str; 7] = ["toml", "json", "yaml", "yml", "ini", "ron", "json5"];

/// Canonical path of the file `config::File::with_name(config_path)` reads, if any
fn config_file_path(config_path: &str) -> Option<PathBuf> {
    std::iter::once(PathBuf::from(config_path))
        .chain(CONFIG_EXTENSIONS.iter().map(|ext| PathBuf::from(format!("{config_path}.{ext}"))))
        .find(|p| p.is_file())
        .and_then(|p| p.canonicalize().ok())
}

impl DatabaseConfig {
    /// Connection string for the pool
    ///
    /// A configured URL (cloud target) wins over the local parts.
    pub fn connection_url(&self) -> String {
        match self.url.as_deref() {
            Some(url) => normalize_database_url(url),
            None => format!(
                "postgresql://{}:{}@{}:{}/{}",
                self.user, self.password, self.host, self.port, self.name
            ),
        }
    }

    /// True when the target came from an explicit URL
    pub const fn is_remote(&self) -> bool {
        self.url.is_some()
    }
}

/// Rewrite the legacy `postgres://` scheme to `postgresql://`
pub fn normalize_database_url(url: &str) -> String {
    let url = url.trim();
    url.strip_prefix("postgres://").map_or_else(
        || url.to_string(),
        |rest| format!("postgresql://{rest}"),
    )
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config::load_from("webgis-test-config-that-does-not-exist")
        .expect("defaults should always deserialize")
}

/// State over a lazily connected pool; only touches the database when a test does
#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    let cfg = test_config();
    let db = crate::db::Database::connect_lazy(&cfg.database).expect("lazy pool");
    AppState::new(&cfg, db)
}
