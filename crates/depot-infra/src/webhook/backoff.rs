//! Exponential backoff with jitter for webhook retries.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

const BASE_DELAY: Duration = Duration::from_secs(30);
const MAX_DELAY: Duration = Duration::from_secs(4 * 60 * 60);
const JITTER_FACTOR: f64 = 0.25;

/// Source of uniform samples in `[0, 1)`
pub trait JitterSource: Send + Sync {
    fn sample(&self) -> f64;
}

/// Thread-local RNG jitter
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample(&self) -> f64 {
        rand::rng().random::<f64>()
    }
}

/// Constant jitter sample. `0.5` yields the undisturbed delay.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn sample(&self) -> f64 {
        self.0
    }
}

/// Retry delay calculator
///
/// `delay(a)` is `min(30s * 2^a, 4h)` scaled by a random factor in
/// `[0.75, 1.25]`.
#[derive(Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter_factor: f64,
    source: Arc<dyn JitterSource>,
}

impl Backoff {
    pub fn new(source: Arc<dyn JitterSource>) -> Self {
        Self {
            base: BASE_DELAY,
            max: MAX_DELAY,
            jitter_factor: JITTER_FACTOR,
            source,
        }
    }

    /// Delay before the retry following failed attempt `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt).as_secs_f64();
        let r = self.source.sample().clamp(0.0, 1.0);
        let factor = 1.0 + self.jitter_factor * (2.0 * r - 1.0);
        Duration::from_secs_f64((ceiling * factor).max(0.0))
    }

    /// Un-jittered delay for `attempt`
    pub fn ceiling(&self, attempt: u32) -> Duration {
        // 2^1024 overflows to infinity, which the cap absorbs
        let exponent = attempt.min(1024) as i32;
        let secs = self.base.as_secs_f64() * 2f64.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max.as_secs_f64()))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Arc::new(ThreadRngJitter))
    }
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backoff")
            .field("base", &self.base)
            .field("max", &self.max)
            .field("jitter_factor", &self.jitter_factor)
            .finish_non_exhaustive()
    }
}
