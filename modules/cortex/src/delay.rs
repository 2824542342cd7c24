use std::sync::{Mutex, PoisonError};
use std::time::Duration;

const SUCCESS_FACTOR: f64 = 0.8;
const FAILURE_FACTOR: f64 = 1.5;

/// Inter-request delay that backs off on failures and recovers on successes,
/// always within `[min, max]`.
#[derive(Debug)]
pub struct AdaptiveDelay {
    min: Duration,
    max: Duration,
    current: Mutex<Duration>,
}

impl AdaptiveDelay {
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self {
            min,
            max,
            current: Mutex::new(min),
        }
    }

    pub fn current(&self) -> Duration {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn on_success(&self) -> Duration {
        self.scale(SUCCESS_FACTOR)
    }

    pub fn on_failure(&self) -> Duration {
        self.scale(FAILURE_FACTOR)
    }

    pub async fn wait(&self) {
        let delay = self.current();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn scale(&self, factor: f64) -> Duration {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        // A zero floor would never grow again; step up from 100ms instead.
        let base = if current.is_zero() && factor > 1.0 {
            Duration::from_millis(100)
        } else {
            current.mul_f64(factor)
        };
        *current = base.clamp(self.min, self.max);
        *current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(actual: Duration, expected_ms: u64) {
        let diff = actual.as_secs_f64() * 1000.0 - expected_ms as f64;
        assert!(diff.abs() < 1.0, "expected ~{expected_ms}ms, got {actual:?}");
    }

    #[test]
    fn failures_grow_and_successes_shrink_within_bounds() {
        let delay = AdaptiveDelay::new(Duration::from_millis(100), Duration::from_millis(400));
        assert_eq!(delay.current(), Duration::from_millis(100));

        approx(delay.on_failure(), 150);
        approx(delay.on_failure(), 225);
        approx(delay.on_failure(), 337);
        assert_eq!(delay.on_failure(), Duration::from_millis(400));

        approx(delay.on_success(), 320);
        for _ in 0..20 {
            delay.on_success();
        }
        assert_eq!(delay.current(), Duration::from_millis(100));
    }

    #[test]
    fn zero_minimum_can_still_back_off() {
        let delay = AdaptiveDelay::new(Duration::ZERO, Duration::from_secs(1));
        assert_eq!(delay.on_success(), Duration::ZERO);
        assert_eq!(delay.on_failure(), Duration::from_millis(100));
        approx(delay.on_failure(), 150);
    }

    #[test]
    fn inverted_bounds_collapse_to_min() {
        let delay = AdaptiveDelay::new(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(delay.on_failure(), Duration::from_secs(2));
    }
}
