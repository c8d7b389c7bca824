//! Logger module
//!
//! Thin facade over `tracing`:
//! - Subscriber setup from `logging.level` (overridable with `RUST_LOG`)
//! - Server lifecycle logging
//! - Access logging with multiple formats (target `access`)
//! - Error and warning logging

mod format;

pub use format::AccessLogEntry;

use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use crate::config::{Config, LoggingConfig};

/// Install the global `tracing` subscriber
///
/// Should be called once at application startup.
pub fn init(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
}

pub fn log_server_start(addr: &SocketAddr, config: &Config) {
    tracing::info!("======================================");
    tracing::info!("WebGIS backend started");
    tracing::info!("Listening on: http://{addr}");
    tracing::info!("Log level: {}", config.logging.level);
    match config.server.workers {
        Some(workers) => tracing::info!("Worker threads: {workers}"),
        None => tracing::info!("Worker threads: CPU cores"),
    }
    tracing::info!(
        "Database: {} (pool max {})",
        if config.database.is_remote() { "remote (DATABASE_URL)" } else { "local" },
        config.database.max_connections
    );
    tracing::info!("Max body size: {} bytes", config.http.max_body_size);
    if config.static_files.enabled {
        tracing::info!("Static files: {}", config.static_files.root);
    }
    if config.api.enable_sql_query {
        tracing::warn!("Ad-hoc SQL endpoint is ENABLED");
    }
    tracing::info!("======================================");
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    tracing::debug!("[Connection] Accepted from: {peer_addr}");
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    tracing::error!("Failed to serve connection: {err:?}");
}

pub fn log_error(message: &str) {
    tracing::error!("{message}");
}

pub fn log_warning(message: &str) {
    tracing::warn!("{message}");
}

pub fn log_headers_count(count: usize) {
    tracing::trace!("[Headers] Count: {count}");
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    tracing::info!(target: "access", "{}", entry.format(format));
}

pub fn log_api_request(method: &str, path: &str, status: u16) {
    tracing::debug!("[API] {method} {path} - {status}");
}

pub fn log_shutdown(active_connections: usize) {
    tracing::info!("Shutting down, {active_connections} connection(s) still active");
}
