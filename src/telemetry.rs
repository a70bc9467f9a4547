//! Generation telemetry — one row per `generate` call, written off the hot path.
//!
//! DESIGN
//! ======
//! [`TelemetryLogger::log`] spawns a detached task and returns immediately.
//! The task's only failure channel is `tracing`: a slow or broken sink can
//! never delay or change the caller's result. Short-lived processes call
//! [`TelemetryLogger::drain`] before exiting so pending writes are not lost.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("telemetry migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("sink error: {0}")]
    Sink(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Success,
    Failure,
}

impl GenerationStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Outcome of one generation call. Mirrors the `ai_generation_logs` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetryRecord {
    pub user_id: Option<Uuid>,
    pub note_id: Option<Uuid>,
    pub model_name: String,
    pub status: GenerationStatus,
    pub generation_time_ms: u64,
    pub tokens_used: Option<u32>,
    pub error_message: Option<String>,
}

/// Destination for telemetry rows. Enables mocking in tests.
#[async_trait::async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Persist one record.
    ///
    /// # Errors
    ///
    /// Returns a [`TelemetryError`] if the write fails. Callers log and drop it.
    async fn record(&self, record: &TelemetryRecord) -> Result<(), TelemetryError>;
}

// =============================================================================
// LOGGER
// =============================================================================

/// Count of spawned writes that have not finished yet.
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

/// Decrements [`InFlight`] when a write task ends, including by panic or abort.
struct InFlightGuard(Arc<InFlight>);

impl InFlightGuard {
    fn enter(in_flight: &Arc<InFlight>) -> Self {
        in_flight.count.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(in_flight))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Fire-and-forget front for an optional [`TelemetrySink`].
#[derive(Clone, Default)]
pub struct TelemetryLogger {
    sink: Option<Arc<dyn TelemetrySink>>,
    in_flight: Arc<InFlight>,
}

impl TelemetryLogger {
    #[must_use]
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self { sink: Some(sink), in_flight: Arc::default() }
    }

    /// A logger that drops every record.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Writes spawned by this logger (or its clones) that are still running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Wait up to `limit` for every pending write to finish.
    ///
    /// Returns `false` if writes were still running when `limit` elapsed.
    pub async fn drain(&self, limit: Duration) -> bool {
        let idle = async {
            loop {
                let notified = self.in_flight.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.pending() == 0 {
                    return;
                }
                notified.await;
            }
        };
        let drained = tokio::time::timeout(limit, idle).await.is_ok();
        if !drained {
            warn!(pending = self.pending(), "telemetry: drain timed out");
        }
        drained
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Spawn a detached write of `record`. Never blocks, never fails.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn log(&self, record: TelemetryRecord) {
        let Some(sink) = self.sink.clone() else {
            return;
        };
        let guard = InFlightGuard::enter(&self.in_flight);
        tokio::spawn(async move {
            let _guard = guard;
            match sink.record(&record).await {
                Ok(()) => {
                    debug!(model = %record.model_name, status = record.status.as_str(), "telemetry: recorded");
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        model = %record.model_name,
                        status = record.status.as_str(),
                        "telemetry: write failed; dropping record"
                    );
                }
            }
        });
    }
}

// =============================================================================
// POSTGRES SINK
// =============================================================================

/// Writes records to `ai_generation_logs`.
#[derive(Clone)]
pub struct PgTelemetrySink {
    pool: PgPool,
}

impl PgTelemetrySink {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TelemetrySink for PgTelemetrySink {
    async fn record(&self, record: &TelemetryRecord) -> Result<(), TelemetryError> {
        sqlx::query(
            r"INSERT INTO ai_generation_logs
                (id, user_id, note_id, model_name, status, generation_time_ms, tokens_used, error_message)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(Uuid::new_v4())
        .bind(record.user_id)
        .bind(record.note_id)
        .bind(&record.model_name)
        .bind(record.status.as_str())
        .bind(i64::try_from(record.generation_time_ms).unwrap_or(i64::MAX))
        .bind(record.tokens_used.map(i64::from))
        .bind(record.error_message.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "telemetry_test.rs"]
mod tests;
