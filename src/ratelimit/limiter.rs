//! Core admission store.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::record::{window_end_from, AdmissionRecord};
use crate::error::{GatekeeperError, Result};

/// Default number of requests admitted per window.
pub const DEFAULT_MAX_REQUESTS: u32 = 5;
/// Default window length.
pub const DEFAULT_WINDOW: std::time::Duration = std::time::Duration::from_secs(60);
/// Longest window accepted.
pub const MAX_WINDOW: std::time::Duration = std::time::Duration::from_secs(366 * 24 * 60 * 60);

/// Configuration for the admission store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Maximum requests admitted per key in one window
    pub max_requests: u32,
    /// Length of each window
    pub window: std::time::Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: DEFAULT_WINDOW,
        }
    }
}

impl LimiterConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(GatekeeperError::Config(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        if self.window.is_zero() {
            return Err(GatekeeperError::Config(
                "window must be greater than zero".to_string(),
            ));
        }
        if self.window > MAX_WINDOW {
            return Err(GatekeeperError::Config(format!(
                "window must be at most {} seconds",
                MAX_WINDOW.as_secs()
            )));
        }
        Ok(())
    }
}

/// Outcome of [`RateLimiter::check_and_consume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests left in the window after this call
    pub remaining: u32,
    /// When the window resets
    pub window_end: DateTime<Utc>,
}

/// Outcome of [`RateLimiter::peek_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Requests left in the window
    pub remaining: u32,
    /// When the window resets, or would reset if one opened now
    pub window_end: DateTime<Utc>,
}

/// Per-user fixed-window admission store.
///
/// Records live in a sharded map. Every read-modify-write on a key happens
/// under that key's shard lock, so concurrent requests for one key can never
/// admit more than `max_requests` per window, while keys on other shards
/// proceed independently.
pub struct RateLimiter {
    /// Admission records indexed by user key
    records: DashMap<String, AdmissionRecord>,
    max_requests: u32,
    window: std::time::Duration,
    window_delta: Duration,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a new rate limiter with default settings.
    pub fn new() -> Self {
        let window_delta = Duration::seconds(DEFAULT_WINDOW.as_secs() as i64);
        Self::build(LimiterConfig::default(), window_delta, Arc::new(SystemClock))
    }

    /// Create a rate limiter from a config, reading time from the system clock.
    pub fn with_config(config: LimiterConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a rate limiter from a config and an explicit time source.
    pub fn with_clock(config: LimiterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let window_delta = Duration::from_std(config.window)
            .map_err(|e| GatekeeperError::Config(format!("window out of range: {}", e)))?;
        Ok(Self::build(config, window_delta, clock))
    }

    fn build(config: LimiterConfig, window_delta: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            max_requests: config.max_requests,
            window: config.window,
            window_delta,
            clock,
        }
    }

    /// Decide whether `key` may make a request now, counting it if so.
    pub fn check_and_consume(&self, key: &str) -> AdmissionDecision {
        let now = self.clock.now();

        let decision = match self.records.entry(key.to_owned()) {
            Entry::Vacant(slot) => {
                let record = slot.insert(AdmissionRecord::open(now, self.window_delta));
                debug!(key = %key, window_end = %record.window_end(), "Opening admission window");
                self.admitted(&record)
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                if record.is_expired(now) {
                    trace!(key = %key, "Window expired, opening a new one");
                    *record = AdmissionRecord::open(now, self.window_delta);
                    self.admitted(record)
                } else if record.try_admit(self.max_requests) {
                    self.admitted(record)
                } else {
                    AdmissionDecision {
                        allowed: false,
                        remaining: 0,
                        window_end: record.window_end(),
                    }
                }
            }
        };

        if decision.allowed {
            trace!(key = %key, remaining = decision.remaining, "Request admitted");
        } else {
            debug!(key = %key, window_end = %decision.window_end, "Rate limit exceeded");
        }

        decision
    }

    fn admitted(&self, record: &AdmissionRecord) -> AdmissionDecision {
        AdmissionDecision {
            allowed: true,
            remaining: record.remaining(self.max_requests),
            window_end: record.window_end(),
        }
    }

    /// Report the state of `key` without counting a request or creating a record.
    pub fn peek_status(&self, key: &str) -> RateLimitStatus {
        let now = self.clock.now();

        match self.records.get(key) {
            Some(record) if !record.is_expired(now) => RateLimitStatus {
                remaining: record.remaining(self.max_requests),
                window_end: record.window_end(),
            },
            _ => RateLimitStatus {
                remaining: self.max_requests,
                window_end: window_end_from(now, self.window_delta),
            },
        }
    }

    /// Forget everything about `key`.
    ///
    /// Returns whether a record was present. Resetting an unknown key is a no-op.
    pub fn reset(&self, key: &str) -> bool {
        self.records.remove(key).is_some()
    }

    /// Drop every record whose window has closed. Returns how many were dropped.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let mut evicted = 0;

        self.records.retain(|_, record| {
            let keep = !record.is_expired(now);
            if !keep {
                evicted += 1;
            }
            keep
        });

        evicted
    }

    /// Get the configured maximum per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Get the configured window length.
    pub fn window(&self) -> std::time::Duration {
        self.window
    }

    /// Current time according to the limiter's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Get the number of keys holding a record.
    pub fn active_keys(&self) -> usize {
        self.records.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .field("active_keys", &self.records.len())
            .finish()
    }
}
