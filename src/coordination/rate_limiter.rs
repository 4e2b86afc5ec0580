//! Sliding-window submission rate limiter
//!
//! Enforces three independent constraints: a rolling per-minute cap, a
//! rolling per-hour cap, and a minimum spacing between consecutive
//! submissions. Denial is data (a computed wait), never an error path.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::clock::Clock;
use crate::config::RateLimitConfig;

const MINUTE_SECS: i64 = 60;
const HOUR_SECS: i64 = 3600;

/// Process-wide submission rate limiter over sliding time windows.
///
/// The window holds one timestamp per dispatched order session and is pruned
/// to the hour horizon on every check, so it never grows past `per_hour`
/// entries plus the burst being evaluated.
pub struct SlidingWindowLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    window: Mutex<VecDeque<DateTime<Utc>>>,
    admitted: AtomicU64,
    denied: AtomicU64,
}

/// Snapshot for monitoring
#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    pub in_minute_window: usize,
    pub in_hour_window: usize,
    pub admitted: u64,
    pub denied: u64,
}

impl SlidingWindowLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            window: Mutex::new(VecDeque::new()),
            admitted: AtomicU64::new(0),
            denied: AtomicU64::new(0),
        }
    }

    /// Side-effect-free admission check (beyond window pruning).
    pub async fn can_submit(&self) -> bool {
        let now = self.clock.now();
        let mut window = self.window.lock().await;
        Self::prune(&mut window, now);
        self.check(&window, now)
    }

    /// Record a dispatched submission. Call only once the order is actually
    /// handed to the gateway, not on validation-only passes.
    pub async fn record(&self) {
        let now = self.clock.now();
        let mut window = self.window.lock().await;
        Self::prune(&mut window, now);
        window.push_back(now);
    }

    /// Earliest instant at which all three constraints would simultaneously
    /// permit a submission. Returns `now` when submission is already allowed.
    pub async fn next_allowed_time(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        let mut window = self.window.lock().await;
        Self::prune(&mut window, now);
        self.earliest_allowed(&window, now)
    }

    /// Atomic check-then-record: reserves a submission slot in one critical
    /// section so two concurrent sessions cannot both take the last slot.
    /// On denial returns the wait until the slot frees up.
    pub async fn try_acquire(&self) -> Result<(), Duration> {
        let now = self.clock.now();
        let mut window = self.window.lock().await;
        Self::prune(&mut window, now);

        if self.check(&window, now) {
            window.push_back(now);
            self.admitted.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        let allowed_at = self.earliest_allowed(&window, now);
        let wait = (allowed_at - now).to_std().unwrap_or(Duration::ZERO);
        self.denied.fetch_add(1, Ordering::Relaxed);
        debug!(wait_ms = wait.as_millis() as u64, "submission rate-limited");
        Err(wait)
    }

    pub async fn stats(&self) -> RateLimiterStats {
        let now = self.clock.now();
        let mut window = self.window.lock().await;
        Self::prune(&mut window, now);
        RateLimiterStats {
            in_minute_window: Self::minute_count(&window, now),
            in_hour_window: window.len(),
            admitted: self.admitted.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
        }
    }

    /// Drop timestamps older than the longest configured horizon.
    fn prune(window: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
        let hour_cutoff = now - ChronoDuration::seconds(HOUR_SECS);
        while let Some(front) = window.front() {
            if *front <= hour_cutoff {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    fn minute_count(window: &VecDeque<DateTime<Utc>>, now: DateTime<Utc>) -> usize {
        let minute_cutoff = now - ChronoDuration::seconds(MINUTE_SECS);
        window.iter().filter(|ts| **ts > minute_cutoff).count()
    }

    fn check(&self, window: &VecDeque<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        if window.len() >= self.config.per_hour as usize {
            return false;
        }
        if Self::minute_count(window, now) >= self.config.per_minute as usize {
            return false;
        }
        if let Some(last) = window.back() {
            let spacing = ChronoDuration::from_std(self.config.min_interval())
                .unwrap_or_else(|_| ChronoDuration::seconds(0));
            if now < *last + spacing {
                return false;
            }
        }
        true
    }

    fn earliest_allowed(&self, window: &VecDeque<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut allowed = now;

        // Per-minute constraint: wait for enough minute-window entries to age out.
        let minute_cutoff = now - ChronoDuration::seconds(MINUTE_SECS);
        let minute_entries: Vec<_> = window.iter().filter(|ts| **ts > minute_cutoff).collect();
        let per_minute = self.config.per_minute as usize;
        if minute_entries.len() >= per_minute {
            let frees_slot = minute_entries[minute_entries.len() - per_minute];
            allowed = allowed.max(*frees_slot + ChronoDuration::seconds(MINUTE_SECS));
        }

        // Per-hour constraint, same shape over the full window.
        let per_hour = self.config.per_hour as usize;
        if window.len() >= per_hour {
            let frees_slot = window[window.len() - per_hour];
            allowed = allowed.max(frees_slot + ChronoDuration::seconds(HOUR_SECS));
        }

        // Minimum spacing from the most recent submission.
        if let Some(last) = window.back() {
            let spacing = ChronoDuration::from_std(self.config.min_interval())
                .unwrap_or_else(|_| ChronoDuration::seconds(0));
            allowed = allowed.max(*last + spacing);
        }

        allowed
    }
}
