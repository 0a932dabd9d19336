//! Capped exponential backoff with jitter.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Delay before retry `attempt` (0-based):
/// `base = min(2^attempt s, max)`, `center = base / 2`,
/// `delay = min(center + uniform[0, center), max)`.
///
/// The random source is shared by every clone and locked per draw.
#[derive(Debug, Clone)]
pub struct Backoff {
    max_delay: Duration,
    rng: Arc<Mutex<StdRng>>,
}

impl Backoff {
    pub fn new(max_delay: Duration) -> Self {
        Self::with_rng(max_delay, StdRng::from_os_rng())
    }

    pub fn seeded(max_delay: Duration, seed: u64) -> Self {
        Self::with_rng(max_delay, StdRng::seed_from_u64(seed))
    }

    fn with_rng(max_delay: Duration, rng: StdRng) -> Self {
        Self {
            max_delay,
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.max_delay.is_zero() {
            return Duration::ZERO;
        }

        let exponential = Duration::from_secs(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
        let center = exponential.min(self.max_delay) / 2;
        (center + self.jitter(center)).min(self.max_delay)
    }

    fn jitter(&self, cap: Duration) -> Duration {
        let cap = u64::try_from(cap.as_nanos()).unwrap_or(u64::MAX);
        if cap == 0 {
            return Duration::ZERO;
        }
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        Duration::from_nanos(rng.random_range(0..cap))
    }
}
