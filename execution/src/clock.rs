use liftoff_types::crash::Multiplier;
use std::time::Duration;

/// Default growth constant: 2.00x after ~5.8s, 10.00x after ~17.3s.
pub const DEFAULT_GROWTH: f64 = 0.03;

/// Maps flight time to the current multiplier with `1 + k * t^2`.
///
/// The clock holds no mutable state, so the scheduler tick and any number of
/// cash-out requests can sample it concurrently and agree on the multiplier for
/// a given instant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MultiplierClock {
    growth: f64,
}

impl Default for MultiplierClock {
    fn default() -> Self {
        Self::new(DEFAULT_GROWTH)
    }
}

impl MultiplierClock {
    pub fn new(growth: f64) -> Self {
        Self { growth }
    }

    pub fn growth(&self) -> f64 {
        self.growth
    }

    /// Multiplier after `elapsed` time in flight, truncated to two decimals.
    pub fn multiplier_at(&self, elapsed: Duration) -> Multiplier {
        let seconds = elapsed.as_secs_f64();
        Multiplier::floor(1.0 + self.growth * seconds * seconds).max(Multiplier::ONE)
    }

    /// Earliest flight time at which `multiplier_at` reaches `target`.
    pub fn elapsed_until(&self, target: Multiplier) -> Duration {
        if target <= Multiplier::ONE || self.growth <= 0.0 {
            return Duration::ZERO;
        }
        let seconds = ((target.as_f64() - 1.0) / self.growth).sqrt();
        let mut elapsed = Duration::from_secs_f64(seconds);

        // Float error can land a hair before the target; step forward until it is reached.
        while self.multiplier_at(elapsed) < target {
            elapsed += Duration::from_millis(1);
        }
        elapsed
    }
}
