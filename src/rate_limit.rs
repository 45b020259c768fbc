//! Fixed-Window Rate Limiting
//!
//! Process-local request throttling keyed by an arbitrary identifier. Callers
//! compose the identifier themselves, usually a principal ID plus a route name
//! (`projects:create:<user_id>`), so each route gets its own budget.
//!
//! # Algorithm
//!
//! ```text
//! check(id) ──> record missing or expired? ──yes──> new window, count = 1 ──> allowed
//!                        │
//!                        no
//!                        ▼
//!               count >= limit? ──yes──> blocked (count untouched)
//!                        │
//!                        no
//!                        ▼
//!                    count += 1 ──> allowed
//! ```
//!
//! Windows are fixed, not sliding: a client can spend `limit` requests at the
//! end of one window and `limit` more at the start of the next. Every process
//! keeps its own table, so running N instances multiplies the effective limit
//! by N.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use saaskit_web::rate_limit::FixedWindowLimiter;
//!
//! let limiter = FixedWindowLimiter::new();
//! let decision = limiter.check("projects:user-1", 60, Duration::from_secs(60));
//! assert!(decision.allowed);
//! assert_eq!(decision.remaining, 59);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Requests allowed per window when the caller does not pick a limit.
pub const DEFAULT_LIMIT: u32 = 60;

/// Window length when the caller does not pick one.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// How often expired windows are purged.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

// =============================================================================
// Clock
// =============================================================================

/// Source of the current time.
///
/// Injected into the limiter so tests can move time forward without sleeping.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = add_duration(*now, by);
    }

    /// Jump to an absolute time
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

fn add_duration(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// =============================================================================
// Records and Decisions
// =============================================================================

/// Request counter for one identifier's current window.
///
/// `count` is at least 1 for as long as the record exists. An expired record
/// is replaced wholesale, never stretched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRecord {
    /// Requests observed in the current window
    pub count: u32,
    /// When the current window ends
    pub window_reset_at: DateTime<Utc>,
}

impl RateLimitRecord {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.window_reset_at < now
    }
}

/// Outcome of a single [`FixedWindowLimiter::check`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Limit that was applied
    pub limit: u32,
    /// Requests left in the window after this one
    pub remaining: u32,
    /// Reset time of the window that governed the decision
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Check if the request is allowed
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Time left until the governing window resets, rounded up to whole seconds
    pub fn retry_after(&self, now: DateTime<Utc>) -> Duration {
        let millis = (self.reset_at - now).num_milliseconds().max(0) as u64;
        Duration::from_secs(millis.div_ceil(1000))
    }

    /// Response headers describing this decision
    pub fn headers(&self, now: DateTime<Utc>) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", self.reset_at.timestamp().to_string()),
        ];
        if !self.allowed {
            headers.push(("Retry-After", self.retry_after(now).as_secs().to_string()));
        }
        headers
    }
}

// =============================================================================
// Limiter
// =============================================================================

/// Per-identifier fixed-window rate limiter.
///
/// Construct one at startup and hand it to request handlers through shared
/// state. Each check runs as a single critical section over the record table,
/// so two concurrent callers can never both slip under the limit.
pub struct FixedWindowLimiter {
    records: Mutex<HashMap<String, RateLimitRecord>>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for FixedWindowLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedWindowLimiter")
            .field("tracked", &self.len())
            .field("clock", &self.clock)
            .finish()
    }
}

impl FixedWindowLimiter {
    /// Create a limiter driven by the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a limiter driven by a custom clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Current time according to the limiter's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Count a request for `identifier` and decide whether it may proceed.
    ///
    /// A `limit` of zero blocks everything without opening a window.
    pub fn check(&self, identifier: &str, limit: u32, window: Duration) -> RateLimitDecision {
        let now = self.clock.now();

        if limit == 0 {
            return RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_at: add_duration(now, window),
            };
        }

        let mut records = self.records.lock();

        if let Some(record) = records
            .get_mut(identifier)
            .filter(|record| !record.is_expired(now))
        {
            if record.count >= limit {
                return RateLimitDecision {
                    allowed: false,
                    limit,
                    remaining: 0,
                    reset_at: record.window_reset_at,
                };
            }

            record.count += 1;
            return RateLimitDecision {
                allowed: true,
                limit,
                remaining: limit - record.count,
                reset_at: record.window_reset_at,
            };
        }

        // Missing or expired: open a fresh window rather than extending the old one.
        let reset_at = add_duration(now, window);
        records.insert(
            identifier.to_string(),
            RateLimitRecord {
                count: 1,
                window_reset_at: reset_at,
            },
        );
        RateLimitDecision {
            allowed: true,
            limit,
            remaining: limit - 1,
            reset_at,
        }
    }

    /// Snapshot of the record for `identifier`, if one is tracked
    pub fn record(&self, identifier: &str) -> Option<RateLimitRecord> {
        self.records.lock().get(identifier).cloned()
    }

    /// Number of identifiers currently tracked
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether no identifiers are tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every record whose window has already passed.
    ///
    /// Returns the number of records removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, record| !record.is_expired(now));
        before - records.len()
    }

    /// Run [`sweep`](Self::sweep) every `every` on the tokio runtime.
    ///
    /// The task only holds a weak reference and exits once the limiter is
    /// dropped.
    pub fn spawn_sweeper(limiter: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(limiter);
        let every = every.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(limiter) = weak.upgrade() else {
                    debug!("Rate limiter dropped, stopping sweeper");
                    break;
                };
                let purged = limiter.sweep();
                if purged > 0 {
                    debug!(
                        purged,
                        tracked = limiter.len(),
                        "Swept expired rate limit windows"
                    );
                }
            }
        })
    }
}

impl Default for FixedWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
