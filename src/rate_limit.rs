//! In-memory rate limiting for anonymous generation requests.
//!
//! DESIGN
//! ======
//! Fixed-window counters backed by `HashMap<String, RateLimitEntry>`, keyed by
//! client address. Defaults: 100 admitted requests per 24h per key.
//! A background sweeper evicts expired windows every hour so the map only
//! holds keys that were active within the last window.
//!
//! TRADE-OFFS
//! ==========
//! One coarse `Mutex` guards the whole map. Checks and sweeps are O(1) and
//! O(n) respectively and never await while holding the lock, so contention
//! stays negligible at the request rates this gate is meant for. Every client
//! without an address header shares the `"unknown"` bucket.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::llm::config::parse_or;

const DEFAULT_MAX_REQUESTS: u32 = 100;
const DEFAULT_WINDOW_SECS: u64 = 24 * 60 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60 * 60;
/// `tokio::time::interval` rejects a zero period.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Key shared by every request that carries no address header.
pub const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl RateLimitConfig {
    /// Build limiter config from environment variables.
    ///
    /// Optional:
    /// - `RATE_LIMIT_MAX_REQUESTS`: default 100
    /// - `RATE_LIMIT_WINDOW_SECS`: default 86400
    /// - `RATE_LIMIT_SWEEP_SECS`: default 3600, minimum 1
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. `from_env` delegates here.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let sweep_secs = parse_or(&lookup, "RATE_LIMIT_SWEEP_SECS", DEFAULT_SWEEP_INTERVAL_SECS).max(1);
        Self {
            max_requests: parse_or(&lookup, "RATE_LIMIT_MAX_REQUESTS", DEFAULT_MAX_REQUESTS),
            window: Duration::from_secs(parse_or(&lookup, "RATE_LIMIT_WINDOW_SECS", DEFAULT_WINDOW_SECS)),
            sweep_interval: Duration::from_secs(sweep_secs),
        }
    }
}

// =============================================================================
// DECISION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Denied { retry_after_secs: u64 },
}

impl RateLimitDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

// =============================================================================
// RATE LIMITER
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

/// Fixed-window limiter. Cheap to clone; clones share one store.
#[derive(Clone)]
pub struct RateLimiter {
    entries: Arc<Mutex<HashMap<String, RateLimitEntry>>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self { entries: Arc::new(Mutex::new(HashMap::new())), config }
    }

    #[must_use]
    pub fn from_env() -> Self {
        Self::new(RateLimitConfig::from_env())
    }

    #[must_use]
    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Count a request from `client_key` and decide whether to admit it.
    pub fn check(&self, client_key: &str) -> RateLimitDecision {
        self.check_at(client_key, Instant::now())
    }

    /// Internal: check with explicit timestamp (for testing).
    fn check_at(&self, client_key: &str, now: Instant) -> RateLimitDecision {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let cfg = self.config;

        let entry = entries
            .entry(client_key.to_string())
            .or_insert(RateLimitEntry { count: 0, window_start: now });
        if is_expired(entry, now, cfg.window) {
            *entry = RateLimitEntry { count: 0, window_start: now };
        }

        if entry.count >= cfg.max_requests {
            let retry_after_secs = entry
                .window_start
                .checked_add(cfg.window)
                .map_or(u64::MAX, |window_end| ceil_secs(window_end.saturating_duration_since(now)))
                .max(1);
            debug!(client_key, retry_after_secs, "rate limit: denied");
            return RateLimitDecision::Denied { retry_after_secs };
        }

        entry.count += 1;
        RateLimitDecision::Allowed { remaining: cfg.max_requests - entry.count }
    }

    /// Evict every entry whose window has fully elapsed. Returns the count.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let before = entries.len();
        let window = self.config.window;
        entries.retain(|_, entry| !is_expired(entry, now, window));
        before - entries.len()
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn the periodic sweep. Stop it with [`SweeperHandle::stop`].
    #[must_use]
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        let limiter = self.clone();
        let period = self.config.sweep_interval.max(MIN_SWEEP_INTERVAL);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        info!(sweep_interval_secs = period.as_secs(), "rate limit sweeper started");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let evicted = limiter.sweep();
                        if evicted > 0 {
                            debug!(evicted, remaining = limiter.len(), "rate limit: swept expired windows");
                        }
                    }
                }
            }
        });

        SweeperHandle { shutdown: Some(shutdown_tx), task }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

/// Owner of the background sweep task.
pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to exit and wait for it.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::warn!(error = %e, "rate limit sweeper ended abnormally");
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Derive the rate-limit key from proxy headers.
///
/// Uses the first `x-forwarded-for` hop, then `x-real-ip`, then
/// [`UNKNOWN_CLIENT`].
#[must_use]
pub fn client_key(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    forwarded
        .or_else(real_ip)
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

fn is_expired(entry: &RateLimitEntry, now: Instant, window: Duration) -> bool {
    now.saturating_duration_since(entry.window_start) > window
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "rate_limit_test.rs"]
mod tests;
