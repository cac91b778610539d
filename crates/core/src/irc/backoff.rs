//! Reconnect backoff: exponential with a cap and ±20% jitter.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: None,
        }
    }

    /// Next delay: doubles each call, capped, with ±20% jitter applied.
    pub fn next(&mut self) -> Duration {
        let base = match self.current {
            None => self.initial,
            Some(previous) => (previous * 2).min(self.max),
        };
        self.current = Some(base);
        jittered(base)
    }

    /// Called after a successful registration.
    pub fn reset(&mut self) {
        self.current = None;
    }
}

fn jittered(base: Duration) -> Duration {
    // Clock-derived jitter; the spread matters, not the quality.
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let factor = 0.8 + 0.4 * f64::from(nanos % 1000) / 1000.0;
    base.mul_f64(factor)
}
