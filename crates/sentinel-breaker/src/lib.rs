//! Per-adapter circuit breaker.
//!
//! Three states: `closed` (calls allowed), `open` (calls refused until
//! a reset timeout elapses), `half_open` (a bounded number of trial
//! calls decide whether to close or reopen). One breaker tracks one
//! adapter; the reliability layer holds one per configured adapter
//! name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout_seconds: u64,
    pub half_open_max_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_seconds: 300,
            half_open_max_calls: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { opened_at: DateTime<Utc> },
    HalfOpen { trials_in_flight: u32 },
}

/// Whether the breaker currently allows a call, and its persisted
/// state across ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: BreakerState,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: BreakerState::Closed { consecutive_failures: 0 },
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Whether a call should be allowed right now. `open` transitions
    /// to `half_open` here if `reset_timeout_seconds` has elapsed,
    /// since that transition only becomes observable when something
    /// asks to call through the breaker.
    pub fn allow_call(&mut self, now: DateTime<Utc>) -> bool {
        match self.state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { opened_at } => {
                let elapsed = (now - opened_at).num_seconds().max(0) as u64;
                if elapsed >= self.config.reset_timeout_seconds {
                    self.state = BreakerState::HalfOpen { trials_in_flight: 1 };
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen { trials_in_flight } => {
                if trials_in_flight < self.config.half_open_max_calls {
                    self.state = BreakerState::HalfOpen { trials_in_flight: trials_in_flight + 1 };
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call. Any success in `half_open` closes the
    /// breaker; a success in `closed` resets the failure streak.
    pub fn record_success(&mut self) {
        self.state = BreakerState::Closed { consecutive_failures: 0 };
    }

    /// Record a failed call. A failure in `half_open` reopens the
    /// breaker and resets its reset-timeout clock. A failure in
    /// `closed` trips the breaker once `failure_threshold` consecutive
    /// failures have been seen.
    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        match self.state {
            BreakerState::Closed { consecutive_failures } => {
                let failures = consecutive_failures + 1;
                if failures >= self.config.failure_threshold {
                    self.state = BreakerState::Open { opened_at: now };
                } else {
                    self.state = BreakerState::Closed { consecutive_failures: failures };
                }
            }
            BreakerState::Open { .. } | BreakerState::HalfOpen { .. } => {
                self.state = BreakerState::Open { opened_at: now };
            }
        }
    }
}
