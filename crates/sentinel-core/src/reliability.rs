//! Phase 4 (retry drain) and the per-adapter circuit breaker consulted
//! by the executor in Phase 6. Both pieces of state — `breakers` and
//! `retry_queue` — live on [`StateDocument`] so they survive a process
//! restart between ticks; this module is the thin logic layer over
//! `sentinel-breaker`/`sentinel-retry` that reads and writes them.

use chrono::{DateTime, Utc};
use sentinel_breaker::{BreakerConfig, CircuitBreaker};
use sentinel_retry::RetryStrategyConfig;
use sentinel_types::{RetryQueueEntry, StateDocument};

/// Whether `adapter` may be called right now, creating its breaker
/// (closed, default config) on first use. Mutates `state.breakers` in
/// place since `allow_call` itself can advance `open -> half_open`.
pub fn allow_call(state: &mut StateDocument, adapter: &str, config: BreakerConfig, now: DateTime<Utc>) -> bool {
    state
        .breakers
        .entry(adapter.to_string())
        .or_insert_with(|| CircuitBreaker::new(config))
        .allow_call(now)
}

pub fn record_success(state: &mut StateDocument, adapter: &str, config: BreakerConfig) {
    state
        .breakers
        .entry(adapter.to_string())
        .or_insert_with(|| CircuitBreaker::new(config))
        .record_success();
}

pub fn record_failure(state: &mut StateDocument, adapter: &str, config: BreakerConfig, now: DateTime<Utc>) {
    state
        .breakers
        .entry(adapter.to_string())
        .or_insert_with(|| CircuitBreaker::new(config))
        .record_failure(now);
}

/// Entries from `state.retry_queue` whose `next_attempt_at` has passed,
/// removing them from the queue. The executor re-queues a fresh entry
/// itself if the retried attempt fails again.
pub fn drain_due(state: &mut StateDocument, now: DateTime<Utc>) -> Vec<RetryQueueEntry> {
    let (due, pending): (Vec<_>, Vec<_>) =
        std::mem::take(&mut state.retry_queue).into_iter().partition(|entry| sentinel_retry::is_due(entry, now));
    state.retry_queue = pending;
    due
}

/// Schedule the next retry for a failed action, or `None` if
/// `max_attempts` has been exhausted (the caller emits `action_dropped`
/// in that case instead of re-queueing).
pub fn schedule_retry(
    state: &mut StateDocument,
    config: &RetryStrategyConfig,
    adapter: &str,
    stage: &str,
    action_id: &str,
    attempt: u32,
    last_error: Option<String>,
    now: DateTime<Utc>,
) -> Option<RetryQueueEntry> {
    let entry = sentinel_retry::next_entry(config, adapter, stage, action_id, attempt, last_error, now)?;
    state.retry_queue.push(entry.clone());
    Some(entry)
}
