//! Per-user sliding-window rate limiter
//!
//! Admission state is process-local and starts empty on every restart.
//! A multi-process deployment would need a shared store with atomic
//! increments keyed by user instead.

use moka::sync::Cache;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Result of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Event admitted and counted against the window
    Allowed,
    /// User is inside an active block; nothing was counted
    Blocked,
    /// This event exhausted the window and started a block
    Throttled,
}

impl Admission {
    /// Whether the event may proceed
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug, Default)]
struct RateLimitEntry {
    hits: VecDeque<u64>,
    blocked_until: u64,
}

impl RateLimitEntry {
    fn admit(&mut self, now_ms: u64, max: usize, window_ms: u64, block_ms: u64) -> Admission {
        if now_ms < self.blocked_until {
            return Admission::Blocked;
        }

        while let Some(&oldest) = self.hits.front() {
            if now_ms.saturating_sub(oldest) >= window_ms {
                self.hits.pop_front();
            } else {
                break;
            }
        }

        if self.hits.len() >= max {
            self.blocked_until = now_ms.saturating_add(block_ms);
            return Admission::Throttled;
        }

        self.hits.push_back(now_ms);
        Admission::Allowed
    }
}

/// Sliding-window limiter with temporary blocking
///
/// Each user's entry sits behind its own mutex, so two events of the same
/// user cannot both read the hit list before either appends to it. Idle
/// entries are evicted once neither the window nor a block can still apply.
pub struct RateLimiter {
    entries: Cache<i64, Arc<Mutex<RateLimitEntry>>>,
    max: usize,
    window_ms: u64,
    block_ms: u64,
    epoch: Instant,
}

impl RateLimiter {
    /// Creates a limiter admitting `max` events per `window_ms`, blocking for
    /// `block_ms` once the window is exhausted.
    ///
    /// # Examples
    ///
    /// ```
    /// use tron_wallet_bot::rate_limit::RateLimiter;
    ///
    /// let limiter = RateLimiter::new(8, 10_000, 15_000);
    /// assert!(limiter.admit(42).is_allowed());
    /// ```
    #[must_use]
    pub fn new(max: usize, window_ms: u64, block_ms: u64) -> Self {
        let entries = Cache::builder()
            .time_to_idle(Duration::from_millis(window_ms.saturating_add(block_ms)))
            .build();

        Self {
            entries,
            max,
            window_ms,
            block_ms,
            epoch: Instant::now(),
        }
    }

    /// Checks and records an event for `user_id` at the current time
    pub fn admit(&self, user_id: i64) -> Admission {
        let now_ms = u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.check_at(user_id, now_ms)
    }

    /// Checks and records an event for `user_id` at an explicit time
    /// (milliseconds on a monotonic clock).
    pub fn check_at(&self, user_id: i64, now_ms: u64) -> Admission {
        let entry = self
            .entries
            .get_with(user_id, || Arc::new(Mutex::new(RateLimitEntry::default())));
        let mut entry = entry.lock().unwrap_or_else(PoisonError::into_inner);
        let admission = entry.admit(now_ms, self.max, self.window_ms, self.block_ms);

        if admission == Admission::Throttled {
            debug!(user_id, blocked_until = entry.blocked_until, "Rate limit exceeded");
        }
        admission
    }

    #[cfg(test)]
    fn hits_in_window(&self, user_id: i64) -> usize {
        self.entries.get(&user_id).map_or(0, |entry| {
            entry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .hits
                .len()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_then_block_then_reset() {
        let limiter = RateLimiter::new(8, 10_000, 15_000);
        let user = 7;

        for i in 0..8 {
            assert_eq!(limiter.check_at(user, 1_000 + i * 100), Admission::Allowed);
        }

        let now = 2_000;
        assert_eq!(limiter.check_at(user, now), Admission::Throttled);
        assert_eq!(limiter.check_at(user, now + 15_000 - 1), Admission::Blocked);
        assert_eq!(limiter.check_at(user, now + 15_000 + 1), Admission::Allowed);

        // Old hits fell out of the window
        assert_eq!(limiter.hits_in_window(user), 1);
    }

    #[test]
    fn test_blocked_events_do_not_consume_capacity() {
        let limiter = RateLimiter::new(2, 1_000, 5_000);

        assert!(limiter.check_at(1, 0).is_allowed());
        assert!(limiter.check_at(1, 10).is_allowed());
        assert_eq!(limiter.check_at(1, 20), Admission::Throttled);
        for t in [30, 500, 4_000] {
            assert_eq!(limiter.check_at(1, t), Admission::Blocked);
        }
        assert_eq!(limiter.hits_in_window(1), 2);
    }

    #[test]
    fn test_sliding_window_prunes_old_hits() {
        let limiter = RateLimiter::new(2, 1_000, 5_000);

        assert!(limiter.check_at(1, 0).is_allowed());
        assert!(limiter.check_at(1, 600).is_allowed());
        // First hit is exactly one window old and no longer counts
        assert!(limiter.check_at(1, 1_000).is_allowed());
        assert_eq!(limiter.hits_in_window(1), 2);
    }

    #[test]
    fn test_users_are_independent() {
        let limiter = RateLimiter::new(1, 10_000, 15_000);

        assert!(limiter.check_at(1, 0).is_allowed());
        assert_eq!(limiter.check_at(1, 1), Admission::Throttled);
        assert!(limiter.check_at(2, 1).is_allowed());
    }

    #[test]
    fn test_concurrent_admissions_for_same_user() {
        let limiter = Arc::new(RateLimiter::new(8, 60_000, 60_000));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || limiter.check_at(99, 5))
            })
            .collect();

        let allowed = handles
            .into_iter()
            .filter_map(|h| h.join().ok())
            .filter(|a| a.is_allowed())
            .count();
        assert_eq!(allowed, 8);
    }
}
