// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound command rate limiting (§4.A).
//!
//! A global bucket (capacity 30, refill 10/s) and a separate "expensive"
//! bucket (capacity 2, refill 2/min) for `start_run`, `new_prd`,
//! `refine_prd`, `clone_repo`, `create_project`. `ping` is exempt from
//! both (checked by the caller via `Command::is_ping`).

use std::time::Duration;

use chief_core::Clock;
use parking_lot::Mutex;

#[derive(Debug)]
struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: std::time::Instant,
}

impl Bucket {
    fn new(capacity: f64, refill_per_sec: f64, now: std::time::Instant) -> Self {
        Bucket { capacity, tokens: capacity, refill_per_sec, last_refill: now }
    }

    fn try_take(&mut self, now: std::time::Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub struct RateLimiter<C: Clock> {
    clock: C,
    global: Mutex<Bucket>,
    expensive: Mutex<Bucket>,
}

impl<C: Clock> RateLimiter<C> {
    pub fn new(clock: C) -> Self {
        let now = clock.now();
        RateLimiter {
            global: Mutex::new(Bucket::new(30.0, 10.0, now)),
            expensive: Mutex::new(Bucket::new(2.0, 2.0 / 60.0, now)),
            clock,
        }
    }

    /// Returns true if the command is admitted. `ping` should never be
    /// passed here — callers check `Command::is_ping` first (§4.A).
    pub fn admit(&self, expensive: bool) -> bool {
        let now = self.clock.now();
        if !self.global.lock().try_take(now) {
            return false;
        }
        if expensive && !self.expensive.lock().try_take(now) {
            return false;
        }
        true
    }
}

/// Convenience for tests/docs: how long a single bucket takes to refill
/// by one token.
pub fn refill_interval(per_sec: f64) -> Duration {
    Duration::from_secs_f64(1.0 / per_sec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chief_core::FakeClock;

    #[test]
    fn thirty_non_ping_commands_succeed_then_rate_limited() {
        let clock = FakeClock::new();
        let limiter = RateLimiter::new(clock.clone());
        for _ in 0..30 {
            assert!(limiter.admit(false));
        }
        assert!(!limiter.admit(false));
    }

    #[test]
    fn global_bucket_refills_over_time() {
        let clock = FakeClock::new();
        let limiter = RateLimiter::new(clock.clone());
        for _ in 0..30 {
            assert!(limiter.admit(false));
        }
        assert!(!limiter.admit(false));
        clock.advance(Duration::from_millis(500));
        assert!(limiter.admit(false));
    }

    #[test]
    fn three_expensive_calls_within_a_minute_hit_limit() {
        let clock = FakeClock::new();
        let limiter = RateLimiter::new(clock.clone());
        let mut limited = false;
        for _ in 0..3 {
            if !limiter.admit(true) {
                limited = true;
            }
        }
        assert!(limited);
    }
}
