//! Jittered exponential backoff, ported from
//! `foundation_core::retries::exponential::ExponentialBackoffDecider`.
//!
//! Used by idle workers while they spin through failed steal attempts
//! before committing to a park on the `NotifierBus`, and by the pipeline's
//! SERIAL-pipe ordering wait.

use std::cell::RefCell;
use std::time::Duration;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::core::{RetryDecider, RetryState, DEFAULT_MIN_DURATION};

const DEFAULT_JITTER: f32 = 0.5;
const DEFAULT_FACTOR: u32 = 2;

#[derive(Debug)]
pub struct ExponentialBackoffDecider {
    pub factor: u32,
    pub jitter: f32,
    pub min_duration: Duration,
    pub max_duration: Duration,
    rng: RefCell<ChaCha8Rng>,
}

impl Default for ExponentialBackoffDecider {
    fn default() -> Self {
        Self::new(DEFAULT_FACTOR, DEFAULT_JITTER, DEFAULT_MIN_DURATION, None)
    }
}

impl ExponentialBackoffDecider {
    pub fn new(
        factor: u32,
        jitter: f32,
        min_duration: Duration,
        max_duration: impl Into<Option<Duration>>,
    ) -> Self {
        assert!(
            jitter > 0.0 && jitter < 1.0,
            "ExponentialBackoffDecider: jitter must be in (0, 1)"
        );
        Self {
            factor,
            jitter,
            min_duration,
            max_duration: max_duration.into().unwrap_or(Duration::from_millis(10)),
            rng: RefCell::new(ChaCha8Rng::seed_from_u64(fastrand::u64(..))),
        }
    }

    pub fn with_seed(seed: u64, min_duration: Duration, max_duration: Duration) -> Self {
        Self {
            factor: DEFAULT_FACTOR,
            jitter: DEFAULT_JITTER,
            min_duration,
            max_duration,
            rng: RefCell::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }
}

impl RetryDecider for ExponentialBackoffDecider {
    fn decide(&self, state: RetryState) -> Option<RetryState> {
        if state.exhausted() {
            return None;
        }

        let next_attempt = state.attempt.saturating_add(1);
        let exponent = self.factor.saturating_pow(next_attempt);
        let base = self.min_duration.saturating_mul(exponent.max(1));

        let jitter_pct = (self.jitter * 100.0) as u32;
        let roll = self.rng.borrow_mut().next_u32() % (jitter_pct * 2).max(1);
        let mut duration = base;
        if roll < jitter_pct {
            duration -= duration.saturating_mul(roll) / 100;
        } else {
            duration += duration.saturating_mul(roll / 2) / 100;
        }

        Some(RetryState {
            wait: Some(duration.clamp(self.min_duration, self.max_duration)),
            attempt: next_attempt,
            total_allowed: state.total_allowed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backs_off_then_exhausts() {
        let decider = ExponentialBackoffDecider::with_seed(
            7,
            Duration::from_micros(10),
            Duration::from_millis(5),
        );
        let state = RetryState::new(0, 3, None);
        let s1 = decider.decide(state).expect("first retry");
        assert!(s1.wait.is_some());
        let s2 = decider.decide(s1).expect("second retry");
        let s3 = decider.decide(s2).expect("third retry");
        assert!(decider.decide(s3).is_none());
    }
}
