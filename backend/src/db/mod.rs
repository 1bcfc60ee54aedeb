//! # Database Module
//!
//! This module handles all database operations for the commission engine.
//! We use PostgreSQL for storing:
//!
//! - Users and their cached left/right pair counts
//! - Scheduled commission rows (`refer_payments`)
//! - The monthly settlement execution log
//!
//! The referral tree itself is never stored; it is rebuilt from `users`
//! whenever placement or pairing runs.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      DATABASE LAYER                              │
//! │                                                                  │
//! │  ┌──────────────────────────────────────────────────────────┐   │
//! │  │                   Connection Pool                         │   │
//! │  │                  (deadpool-postgres)                      │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! │                              │                                   │
//! │         ┌────────────────────┼────────────────────┐             │
//! │         ▼                    ▼                    ▼             │
//! │  ┌────────────┐      ┌──────────────┐     ┌───────────────┐     │
//! │  │   users    │      │refer_payments│     │settlement_runs│     │
//! │  └────────────┘      └──────────────┘     └───────────────┘     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod models;
pub mod queries;

use deadpool_postgres::{Config, Pool, Runtime};
use thiserror::Error;
use tokio_postgres::{Config as TokioConfig, NoTls};
use tracing::{error, info};

/// Schema applied at startup. Idempotent (`IF NOT EXISTS` throughout).
const INITIAL_SCHEMA: &str = include_str!("../../migrations/001_initial_schema.sql");

/// Database-related errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to connect to the database
    #[error("Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryError(#[from] tokio_postgres::Error),

    /// Migration failed
    #[error("Migration failed: {0}")]
    MigrationError(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A stored value could not be decoded into a model
    #[error("Invalid stored value: {0}")]
    DecodeError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

/// Database connection wrapper.
///
/// This struct wraps the connection pool and provides
/// methods for common database operations.
///
/// ## Usage
///
/// ```rust,ignore
/// let db = Database::connect("postgres://...").await?;
/// let user = queries::get_user_by_id(db.pool(), 42).await?;
/// ```
#[derive(Clone)]
pub struct Database {
    /// The connection pool
    pool: Pool,
}

impl Database {
    /// Connect to the PostgreSQL database.
    ///
    /// Creates a connection pool of up to 10 connections and verifies it
    /// with a trivial query.
    ///
    /// ## Arguments
    ///
    /// * `database_url` - PostgreSQL connection string
    pub async fn connect(database_url: &str) -> Result<Self, DatabaseError> {
        info!("Connecting to database...");

        let tokio_config = database_url
            .parse::<TokioConfig>()
            .map_err(|e| DatabaseError::ConfigError(format!("Invalid database URL: {}", e)))?;

        // Convert to deadpool config
        let mut config = Config::new();

        if let Some(dbname) = tokio_config.get_dbname() {
            config.dbname = Some(dbname.to_string());
        }
        if let Some(user) = tokio_config.get_user() {
            config.user = Some(user.to_string());
        }
        if let Some(password) = tokio_config.get_password() {
            config.password = Some(String::from_utf8_lossy(password).to_string());
        }
        if let Some(tokio_postgres::config::Host::Tcp(host)) = tokio_config.get_hosts().first() {
            config.host = Some(host.clone());
        }
        if let Some(port) = tokio_config.get_ports().first() {
            config.port = Some(*port);
        }

        config.pool = Some(deadpool_postgres::PoolConfig {
            max_size: 10,
            ..Default::default()
        });

        let pool = config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        let client = pool
            .get()
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        client
            .query("SELECT 1", &[])
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// Apply the bundled schema.
    ///
    /// Safe to run on every start; existing tables and indexes are left
    /// untouched.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        info!("Applying schema ({} bytes)...", INITIAL_SCHEMA.len());

        let client = self
            .pool
            .get()
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        client.batch_execute(INITIAL_SCHEMA).await.map_err(|e| {
            let detail = e
                .as_db_error()
                .and_then(|db_err| db_err.detail())
                .unwrap_or("No detail available");
            error!("Migration execution error: {} ({})", e, detail);
            DatabaseError::MigrationError(format!("{} ({})", e, detail))
        })?;

        info!("Schema is up to date");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

// Re-export commonly used items
pub use models::*;
