//! Per-key admission record.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// Requests admitted for one user key in its current fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionRecord {
    /// Requests admitted since the window opened
    count: u32,
    /// When the window closes
    window_end: DateTime<Utc>,
}

impl AdmissionRecord {
    /// Open a new window at `now` with the opening request already counted.
    pub fn open(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            count: 1,
            window_end: window_end_from(now, window),
        }
    }

    /// Whether the window has closed as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.window_end
    }

    /// Count one more request if the window still has room.
    ///
    /// Returns `false` without touching the count when saturated.
    pub fn try_admit(&mut self, max_requests: u32) -> bool {
        if self.count < max_requests {
            self.count += 1;
            true
        } else {
            false
        }
    }

    /// Requests still available in this window.
    pub fn remaining(&self, max_requests: u32) -> u32 {
        max_requests.saturating_sub(self.count)
    }

    /// Get the current count.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Get the window end.
    pub fn window_end(&self) -> DateTime<Utc> {
        self.window_end
    }
}

/// End of a window opened at `now`, saturating at the latest representable instant.
pub fn window_end_from(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now.checked_add_signed(window)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Whole seconds until `window_end`, rounded up and floored at zero.
pub fn retry_after_secs(window_end: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let left = window_end - now;
    if left <= Duration::zero() {
        return 0;
    }

    let whole = left.num_seconds();
    let secs = if left > Duration::seconds(whole) {
        whole + 1
    } else {
        whole
    };
    secs as u64
}

/// Render a timestamp the way clients expect it: ISO-8601, UTC, milliseconds.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
