//! Database access module
//!
//! Owns the bounded PostGIS connection pool and the SQL behind every API
//! operation. Table names reaching this module are either looked up in the
//! spatial catalog first or produced by [`ident::sanitize_table_name`], and are
//! always quoted with [`ident::quote_ident`].

pub mod catalog;
pub mod ident;
pub mod layers;
pub mod query;
pub mod writer;

use std::time::Duration;

use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;

/// Handle to the PostGIS database
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

/// Result of `GET /api/test-db`
#[derive(Debug, Serialize)]
pub struct Diagnostics {
    pub db_version: String,
    pub postgis_version: String,
}

impl Database {
    /// Open the pool and verify one connection can be established
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = pool_options(cfg).connect(&cfg.connection_url()).await?;
        Ok(Self { pool })
    }

    /// Build the pool without connecting; connections open on first use
    pub fn connect_lazy(cfg: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = pool_options(cfg).connect_lazy(&cfg.connection_url())?;
        Ok(Self { pool })
    }

    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Server and PostGIS version strings
    pub async fn diagnostics(&self) -> Result<Diagnostics, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        let db_version: String = sqlx::query_scalar("SELECT version()")
            .fetch_one(&mut *conn)
            .await?;
        let postgis_version: String = sqlx::query_scalar("SELECT PostGIS_Full_Version()")
            .fetch_one(&mut *conn)
            .await?;
        Ok(Diagnostics {
            db_version,
            postgis_version,
        })
    }

    /// Readiness probe
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn pool_options(cfg: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(cfg.max_connections.max(1))
        .min_connections(cfg.min_connections)
        .acquire_timeout(Duration::from_secs(cfg.acquire_timeout_secs))
}

/// Pool against `TEST_DATABASE_URL`, or `None` when no fixture database is configured
#[cfg(test)]
pub(crate) async fn test_database() -> Option<Database> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let mut cfg = crate::config::test_config().database;
    cfg.url = Some(url);
    Database::connect(&cfg).await.ok()
}
