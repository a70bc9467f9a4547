//! Telemetry database: pool setup and the `ai_generation_logs` migration.
//!
//! SYSTEM CONTEXT
//! ==============
//! Only [`crate::telemetry::PgTelemetrySink`] touches Postgres. The binary
//! connects when `DATABASE_URL` is set and migrates before the first
//! generation call, so a bad URL fails the run up front instead of turning
//! every telemetry write into a logged warning.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::llm::config::parse_or;
use crate::telemetry::TelemetryError;

const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;

/// Pool sizing for the telemetry sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_DB_ACQUIRE_TIMEOUT_SECS),
        }
    }
}

impl DbConfig {
    /// Optional:
    /// - `DB_MAX_CONNECTIONS`: default 5, minimum 1
    /// - `DB_ACQUIRE_TIMEOUT_SECS`: default 5
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS).max(1),
            acquire_timeout: Duration::from_secs(parse_or(
                &lookup,
                "DB_ACQUIRE_TIMEOUT_SECS",
                DEFAULT_DB_ACQUIRE_TIMEOUT_SECS,
            )),
        }
    }
}

/// Connect to the telemetry database and apply its migrations.
///
/// # Errors
///
/// Returns [`TelemetryError::Database`] if the connection fails, or
/// [`TelemetryError::Migrate`] if the `ai_generation_logs` migration fails.
pub async fn init_pool(database_url: &str, config: &DbConfig) -> Result<PgPool, TelemetryError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(database_url)
        .await?;

    sqlx::migrate!("src/db/migrations").run(&pool).await?;
    info!(max_connections = config.max_connections, "telemetry database ready");

    Ok(pool)
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
