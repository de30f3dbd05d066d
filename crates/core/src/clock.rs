// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling.
//!
//! Production code takes a `Clock` rather than calling
//! `Instant::now()`/`Utc::now()` directly so that inactivity timeouts,
//! backoff curves, and rate-limiter refills can be driven
//! deterministically in tests.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// A clock that provides both a monotonic instant (for timers/backoff) and
/// wall-clock UTC time (for envelope timestamps and `expires_at` checks).
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn utc_now(&self) -> DateTime<Utc>;
}

/// Real system clock.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fake clock for deterministic tests.
#[derive(Clone)]
pub struct FakeClock {
    monotonic: Arc<Mutex<Instant>>,
    utc: Arc<Mutex<DateTime<Utc>>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self { monotonic: Arc::new(Mutex::new(Instant::now())), utc: Arc::new(Mutex::new(Utc::now())) }
    }

    pub fn advance(&self, duration: Duration) {
        *self.monotonic.lock() += duration;
        *self.utc.lock() += chrono::Duration::from_std(duration).unwrap_or_default();
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.monotonic.lock()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        *self.utc.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_both_timelines() {
        let clock = FakeClock::new();
        let t0 = clock.now();
        let u0 = clock.utc_now();
        clock.advance(Duration::from_secs(30));
        assert!(clock.now() >= t0 + Duration::from_secs(30));
        assert!(clock.utc_now() >= u0 + chrono::Duration::seconds(30));
    }
}
