//! Backoff calculation and the persisted retry queue for the
//! reliability layer.
//!
//! A failed adapter call that [`sentinel_types::ErrorReason::is_retryable`]
//! doesn't schedule a sleep-and-retry in process; it's pushed onto the
//! state document's `retry_queue` as a [`sentinel_types::RetryQueueEntry`]
//! and picked back up by a later tick once its `next_attempt_at` has
//! passed. This crate supplies the delay math and the due/not-due
//! decision; persistence itself lives in `sentinel-state`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sentinel_types::RetryQueueEntry;
use serde::{Deserialize, Serialize};

/// Strategy type for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategyType {
    Immediate,
    #[default]
    Exponential,
    Linear,
    Constant,
}

/// Configuration for a retry strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryStrategyConfig {
    #[serde(default)]
    pub strategy: RetryStrategyType,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(3600)
}

fn default_jitter() -> f64 {
    0.2
}

impl Default for RetryStrategyConfig {
    /// Base 60s, cap 1h, 5 attempts: the reliability layer's default
    /// backoff for adapter retries.
    fn default() -> Self {
        Self {
            strategy: RetryStrategyType::Exponential,
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            jitter: default_jitter(),
        }
    }
}

/// Delay before the next attempt, given the attempt number just made
/// (1-indexed) and no jitter applied. Callers that want jitter should
/// call [`jittered_delay`] instead.
pub fn calculate_delay(config: &RetryStrategyConfig, attempt: u32) -> Duration {
    let delay = match config.strategy {
        RetryStrategyType::Immediate => Duration::ZERO,
        RetryStrategyType::Exponential => {
            let pow = attempt.saturating_sub(1).min(16);
            config.base_delay.saturating_mul(2_u32.saturating_pow(pow))
        }
        RetryStrategyType::Linear => config.base_delay.saturating_mul(attempt),
        RetryStrategyType::Constant => config.base_delay,
    };

    delay.min(config.max_delay)
}

/// [`calculate_delay`] plus randomized jitter so many entries scheduled
/// at once don't all wake up in the same instant.
pub fn jittered_delay(config: &RetryStrategyConfig, attempt: u32) -> Duration {
    let capped = calculate_delay(config, attempt);
    if config.jitter > 0.0 {
        apply_jitter(capped, config.jitter)
    } else {
        capped
    }
}

fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    use rand::Rng;

    let jitter_range = 2.0 * jitter;
    let mut rng = rand::rng();
    let random_value: f64 = rng.random();
    let random_factor = 1.0 - jitter + (random_value * jitter_range);
    let millis = (delay.as_millis() as f64 * random_factor).round() as u64;
    Duration::from_millis(millis)
}

/// Build the next [`RetryQueueEntry`] after a failed attempt, or `None`
/// if `max_attempts` has been reached and the entry should be dropped
/// (surfaced by the caller as a permanent failure instead).
pub fn next_entry(
    config: &RetryStrategyConfig,
    adapter: impl Into<String>,
    stage: impl Into<String>,
    action_id: impl Into<String>,
    attempt: u32,
    last_error: Option<String>,
    now: DateTime<Utc>,
) -> Option<RetryQueueEntry> {
    if attempt >= config.max_attempts {
        return None;
    }
    let delay = jittered_delay(config, attempt);
    let next_attempt_at = now + chrono::Duration::from_std(delay).unwrap_or_default();
    Some(RetryQueueEntry {
        adapter: adapter.into(),
        stage: stage.into(),
        action_id: action_id.into(),
        attempt: attempt + 1,
        next_attempt_at,
        last_error,
    })
}

/// Whether a queued entry is due to be retried at `now`.
pub fn is_due(entry: &RetryQueueEntry, now: DateTime<Utc>) -> bool {
    entry.next_attempt_at <= now
}
