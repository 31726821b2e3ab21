//! Randomized pre-run delay.
//!
//! Freshly deployed collectors come up at slightly different times; sleeping a
//! random amount inside a window before touching the group lets the whole
//! fleet register first.

use std::time::Duration;

use rand::Rng;

use crate::cancel::Cancellation;

pub const DEFAULT_JITTER_MIN: Duration = Duration::from_secs(120);
pub const DEFAULT_JITTER_MAX: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterWindow {
    min: Duration,
    max: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidJitterWindow {
    pub min: Duration,
    pub max: Duration,
}

impl std::fmt::Display for InvalidJitterWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid jitter window: min {}s is greater than max {}s",
            self.min.as_secs(),
            self.max.as_secs()
        )
    }
}

impl std::error::Error for InvalidJitterWindow {}

impl Default for JitterWindow {
    fn default() -> Self {
        Self {
            min: DEFAULT_JITTER_MIN,
            max: DEFAULT_JITTER_MAX,
        }
    }
}

impl JitterWindow {
    pub fn new(min: Duration, max: Duration) -> Result<Self, InvalidJitterWindow> {
        if min > max {
            return Err(InvalidJitterWindow { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min_ms = self.min.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;
        Duration::from_millis(rng.gen_range(min_ms..=max_ms))
    }
}

/// Sleeps for `delay` unless cancelled first. Returns `false` when cancelled.
pub async fn sleep_jitter(delay: Duration, cancel: &Cancellation) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = cancel.cancelled() => false,
    }
}
