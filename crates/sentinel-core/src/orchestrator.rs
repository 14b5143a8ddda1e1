//! The tick's public entry point: sequences the eight phases described
//! by every other module in this crate against one project's data
//! directory, under the exclusive file lock, and produces a single
//! atomic state write plus an appended run of audit events.
//!
//! Phase order is invariant and never interleaves with adapter I/O
//! from a different tick: Load -> Time evaluation -> Renewal/Release
//! resolution -> Retry drain -> Rule evaluation -> Action selection ->
//! Persist -> Release lock.
//!
//! Every phase up through Phase 6 is checked against the request's
//! cancellation signal before it runs. Once Phase 7 (the state write)
//! begins, cancellation is no longer observed: an in-flight write
//! always completes.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use rand::RngCore;
use sentinel_adapters::AdapterRegistry;
use sentinel_breaker::BreakerConfig;
use sentinel_events::EventLog;
use sentinel_lock::LockFile;
use sentinel_retry::RetryStrategyConfig;
use sentinel_state::StateStore;
use sentinel_types::{AuditEvent, AuditEventPayload, StateDocument};

use crate::action_selector;
use crate::error::CoreError;
use crate::executor::{self, ExecutorConfig};
use crate::facts::{build_facts, evaluate_time};
use crate::release::{self, ReleaseRequest, SecretOutcome};
use crate::reliability;
use crate::reporter::Reporter;
use crate::rule_engine;

/// An in-flight renewal or release command to resolve in Phase 3,
/// ahead of ordinary rule evaluation. A tick that isn't carrying an
/// operator command runs with `None`.
pub enum Command {
    Renew { provided_secret: String },
    Release { provided_secret: String, request: ReleaseRequest },
}

pub struct TickRequest<'a> {
    pub state_dir: &'a Path,
    pub policy_dir: &'a Path,
    pub known_adapters: &'a [&'a str],
    pub configured_secret: &'a str,
    pub registry: &'a AdapterRegistry,
    pub breaker: BreakerConfig,
    pub retry: RetryStrategyConfig,
    pub mock_mode: bool,
    pub lock_timeout: std::time::Duration,
    pub command: Option<Command>,
    /// Cooperative cancellation signal, polled between phases up
    /// through Phase 6. `None` means this tick is never cancellable.
    pub cancellation: Option<&'a AtomicBool>,
}

#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub tick_id: String,
    pub stage: String,
    pub previous_stage: Option<String>,
    pub command_outcome: Option<SecretOutcome>,
    pub events: Vec<AuditEvent>,
}

fn is_cancelled(request: &TickRequest) -> bool {
    request.cancellation.is_some_and(|flag| flag.load(Ordering::SeqCst))
}

/// Build a fresh ledger out of this tick's buffered events and append
/// it to the project's audit log. Never reads the existing ledger
/// first: `EventLog::write_to_file` already opens in append mode, so
/// folding the prior history back in here would duplicate it on every
/// tick. Best-effort: a failure to flush is logged, not propagated,
/// so it never masks the error that triggered the flush.
fn flush_ledger(
    events: Vec<AuditEventPayload>,
    project_id: &str,
    tick_id: &str,
    now: DateTime<Utc>,
    state_dir: &Path,
    reporter: &mut dyn Reporter,
) -> Vec<AuditEvent> {
    let mut log = EventLog::new();
    let audit_events: Vec<AuditEvent> = events
        .into_iter()
        .map(|payload| AuditEvent::new(project_id.to_string(), tick_id.to_string(), now, payload))
        .collect();
    for event in &audit_events {
        log.record(event.clone());
    }
    if let Err(err) = log.write_to_file(&sentinel_events::events_path(state_dir)) {
        reporter.error(&format!("tick {tick_id} failed to flush audit ledger: {err:#}"));
    }
    audit_events
}

/// Run one full tick for the project rooted at `request.state_dir`.
///
/// Any error returned here means no state write happened: the
/// in-memory document is discarded and the lock is released by
/// [`LockFile`]'s `Drop` impl on the way out. Whatever was buffered so
/// far, plus a `tick_aborted` event naming the cause, is still flushed
/// to the ledger before returning — the ledger is the audit trail of
/// what a tick attempted, not just what it finished.
pub fn run_tick(
    request: &TickRequest,
    clock: &dyn crate::clock::Clock,
    reporter: &mut dyn Reporter,
) -> Result<TickOutcome, CoreError> {
    let now = clock.now();
    let tick_id = generate_tick_id(now);
    let mut events = Vec::new();
    // Unknown until state loads; the ledger still needs *a* project_id
    // to record the events that happen before that point.
    let mut project_id = "unknown".to_string();

    reporter.info(&format!("tick {tick_id} starting"));
    events.push(AuditEventPayload::TickStarted);

    macro_rules! abort {
        ($err:expr, $reason:expr) => {{
            let err = $err;
            events.push(AuditEventPayload::TickAborted { reason: $reason });
            flush_ledger(events, &project_id, &tick_id, now, request.state_dir, reporter);
            return Err(err);
        }};
    }

    // Phase 1: Load.
    let mut lock = match LockFile::acquire_with_timeout(request.state_dir, &tick_id, request.lock_timeout) {
        Ok(lock) => lock,
        Err(sentinel_lock::LockError::Held { tick_id: holder_tick_id, hostname, .. }) => {
            events.push(AuditEventPayload::LockContended { holder_tick_id, holder_hostname: hostname.clone() });
            reporter.warn(&format!("tick {tick_id} could not acquire lock, held by {hostname}"));
            let err: CoreError = sentinel_lock::LockError::Held {
                tick_id: tick_id.clone(),
                pid: std::process::id(),
                hostname,
                acquired_at: now,
            }
            .into();
            abort!(err, "lock contended".to_string());
        }
        Err(other) => {
            let reason = format!("lock error: {other}");
            abort!(other.into(), reason);
        }
    };
    let lock_hostname = LockFile::read_lock_info(request.state_dir).map(|info| info.hostname).unwrap_or_default();
    events.push(AuditEventPayload::LockAcquired { hostname: lock_hostname });

    if is_cancelled(request) {
        abort!(CoreError::Other(anyhow::anyhow!("tick cancelled before policy load")), "cancelled".to_string());
    }

    let policy = match sentinel_policy::load_dir(request.policy_dir, request.known_adapters) {
        Ok(policy) => policy,
        Err(err) => {
            let reason = format!("policy load failed: {err}");
            abort!(err.into(), reason);
        }
    };
    events.push(AuditEventPayload::PolicyLoaded { schema: policy.schema.clone() });

    let store = StateStore::new(request.state_dir);
    let mut state = match store.load() {
        Ok(state) => state,
        Err(err) => {
            let reason = format!("state load failed: {err}");
            abort!(err.into(), reason);
        }
    };
    project_id = state.meta.project_id.clone();
    events.push(AuditEventPayload::StateLoaded { schema: state.meta.schema.clone() });

    if is_cancelled(request) {
        abort!(CoreError::Other(anyhow::anyhow!("tick cancelled after load")), "cancelled".to_string());
    }

    // Phase 2: Time evaluation (consumed implicitly by rule_engine and facts below).
    let _time = evaluate_time(state.timer.deadline, now);

    // Phase 3: Renewal/Release resolution.
    let command_outcome = match apply_command(&policy, &mut state, request.configured_secret, &request.command, now, &mut events) {
        Ok(outcome) => outcome,
        Err(err) => {
            let reason = format!("command resolution failed: {err}");
            abort!(err, reason);
        }
    };

    if let Some(target) = release::apply_due_release(&mut state, now) {
        events.push(AuditEventPayload::StageEntered {
            stage: target.clone(),
            previous_stage: state.escalation.previous_stage.clone(),
        });
        events.push(AuditEventPayload::ReleaseExecuted { stage: target });
    }

    if is_cancelled(request) {
        abort!(CoreError::Other(anyhow::anyhow!("tick cancelled before rule evaluation")), "cancelled".to_string());
    }

    // Phase 4: Retry drain.
    let due_retries = reliability::drain_due(&mut state, now);

    // Phase 5: Rule evaluation.
    let previous_stage_before_rules = state.escalation.stage.clone();
    let outcome = match rule_engine::evaluate(&policy, &state, now) {
        Ok(outcome) => outcome,
        Err(err) => {
            let reason = format!("rule evaluation failed: {err}");
            abort!(err, reason);
        }
    };
    state = outcome.state;
    for fired in &outcome.fired {
        events.push(AuditEventPayload::RuleFired {
            rule_id: fired.rule_id.clone(),
            from_stage: fired.from_stage.clone(),
            to_stage: fired.to_stage.clone(),
        });
    }
    if state.escalation.stage != previous_stage_before_rules {
        events.push(AuditEventPayload::StageEntered {
            stage: state.escalation.stage.clone(),
            previous_stage: Some(previous_stage_before_rules),
        });
    }

    if is_cancelled(request) {
        abort!(CoreError::Other(anyhow::anyhow!("tick cancelled before action execution")), "cancelled".to_string());
    }

    // Phase 6: Action selection + execution.
    let time = evaluate_time(state.timer.deadline, now);
    let facts = build_facts(&state, &policy, time);
    let selected = action_selector::select(&policy, &state);
    let executor_config = ExecutorConfig { breaker: request.breaker, retry: request.retry.clone(), mock_mode: request.mock_mode };
    let execution_events = executor::run(
        request.registry,
        &mut state,
        &facts,
        &selected,
        due_retries,
        &policy,
        &executor_config,
        reporter,
        now,
    );
    events.extend(execution_events);

    // Phase 7: Persist. No cancellation check past this point: once the
    // write starts, it always finishes.
    state.meta.updated_at = now;
    if let Err(err) = store.save(&state) {
        let reason = format!("persist failed: {err}");
        abort!(err.into(), reason);
    }
    events.push(AuditEventPayload::TickCompleted { duration_ms: (Utc::now() - now).num_milliseconds().max(0) as u64 });

    let audit_events = flush_ledger(events, &project_id, &tick_id, now, request.state_dir, reporter);

    reporter.info(&format!("tick {tick_id} completed in stage `{}`", state.escalation.stage));

    // Phase 8: Release lock.
    lock.release().map_err(CoreError::Other)?;

    Ok(TickOutcome {
        tick_id,
        stage: state.escalation.stage.clone(),
        previous_stage: state.escalation.previous_stage.clone(),
        command_outcome,
        events: audit_events,
    })
}

fn apply_command(
    policy: &sentinel_types::PolicySnapshot,
    state: &mut StateDocument,
    configured_secret: &str,
    command: &Option<Command>,
    now: DateTime<Utc>,
    events: &mut Vec<AuditEventPayload>,
) -> Result<Option<SecretOutcome>, CoreError> {
    let Some(command) = command.as_ref() else { return Ok(None) };

    let outcome = match command {
        Command::Renew { provided_secret } => release::apply_renewal(policy, state, configured_secret, provided_secret, now),
        Command::Release { provided_secret, request } => {
            release::verify_and_trigger_release(policy, state, configured_secret, provided_secret, request, now)?
        }
    };

    match &outcome {
        SecretOutcome::Accepted => match command {
            Command::Renew { .. } => events.push(AuditEventPayload::RenewalAccepted),
            Command::Release { request, .. } => events.push(AuditEventPayload::ReleaseTriggered {
                target_stage: request.target_stage.clone(),
                execute_after: state.release.execute_after,
            }),
        },
        SecretOutcome::Rejected { failed_attempts } | SecretOutcome::LockedOut { failed_attempts } => match command {
            Command::Renew { .. } => events.push(AuditEventPayload::RenewalRejected { failed_attempts: *failed_attempts }),
            Command::Release { .. } => events.push(AuditEventPayload::ReleaseRejected { failed_attempts: *failed_attempts }),
        },
    }

    Ok(Some(outcome))
}

fn generate_tick_id(now: DateTime<Utc>) -> String {
    let mut bytes = [0_u8; 4];
    rand::rng().fill_bytes(&mut bytes);
    format!("tick-{}-{}", now.format("%Y%m%dT%H%M%SZ"), hex::encode(bytes))
}
