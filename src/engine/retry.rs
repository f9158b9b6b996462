use std::time::Duration;

/// Bounded retry for compare-and-swap conflicts.
#[derive(Debug, Clone)]
pub struct CasRetry {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Down-jitter factor (0.5 = up to 50% shorter).
    pub jitter_factor: f64,
}

impl Default for CasRetry {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
            jitter_factor: 0.5,
        }
    }
}

impl CasRetry {
    /// Delay before retry number `step` (0-based): exponential, capped, jittered.
    pub fn delay(&self, step: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * 2.0_f64.powi(step.min(16) as i32);
        let capped = base.min(self.max_delay.as_secs_f64());
        let jitter = 1.0 - rand::random::<f64>() * self.jitter_factor.clamp(0.0, 1.0);
        Duration::from_secs_f64(capped * jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_and_caps() {
        let retry = CasRetry {
            jitter_factor: 0.0,
            ..CasRetry::default()
        };
        assert_eq!(retry.delay(0), Duration::from_millis(10));
        assert_eq!(retry.delay(1), Duration::from_millis(20));
        assert_eq!(retry.delay(10), Duration::from_millis(200));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let retry = CasRetry::default();
        for _ in 0..100 {
            let d = retry.delay(2);
            assert!(d <= Duration::from_millis(40));
            assert!(d >= Duration::from_millis(20));
        }
    }
}
