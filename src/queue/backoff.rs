// src/queue/backoff.rs

//! Exponential retry backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// `base * 2^(attempts-1)` clamped to `max`, plus uniform jitter in
/// `[0, base)` so synchronized failures do not retry in lockstep.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(32);
        let scaled = self.base.saturating_mul(2u32.saturating_pow(exponent));
        let capped = scaled.min(self.max);
        let jitter_bound = self.base.as_millis().max(1) as u64;
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..jitter_bound));
        capped + jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_secs(30),
            max: Duration::from_secs(3600),
        }
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let p = policy();
        for attempts in 1..=5u32 {
            let floor = Duration::from_secs(30 * 2u64.pow(attempts - 1));
            let delay = p.delay(attempts);
            assert!(delay >= floor, "attempt {attempts}: {delay:?} < {floor:?}");
            assert!(delay < floor + p.base);
        }
    }

    #[test]
    fn test_delay_is_clamped_to_max() {
        let p = policy();
        let delay = p.delay(30);
        assert!(delay >= p.max);
        assert!(delay < p.max + p.base);
    }
}
