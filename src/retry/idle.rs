//! Tracks a bounded run of idle spins, ported from
//! `foundation_core::synca::idleman::Idleman`.

use super::core::{RetryDecider, RetryState};
use super::exponential::ExponentialBackoffDecider;

#[derive(Clone, Debug)]
pub enum IdleState {
    Ongoing(Option<RetryState>),
    Expired,
}

pub struct IdleMan {
    max_idles: u32,
    last_state: IdleState,
    decider: ExponentialBackoffDecider,
}

impl IdleMan {
    pub fn new(max_idles: u32, decider: ExponentialBackoffDecider) -> Self {
        Self {
            max_idles,
            decider,
            last_state: IdleState::Ongoing(None),
        }
    }

    pub fn reset(&mut self) {
        self.last_state = IdleState::Ongoing(None);
    }

    /// Advances to the next idle step, returning the state to back off by
    /// (or `Expired` once the bounded number of idle rounds has elapsed).
    pub fn next_idle(&mut self) -> IdleState {
        match &self.last_state {
            IdleState::Ongoing(retry_state) => {
                let state = retry_state
                    .clone()
                    .unwrap_or_else(|| RetryState::new(0, self.max_idles, None));

                self.last_state = match self.decider.decide(state) {
                    Some(next) => IdleState::Ongoing(Some(next)),
                    None => IdleState::Expired,
                };
                self.last_state.clone()
            }
            IdleState::Expired => IdleState::Expired,
        }
    }
}
