//! Phase 6: drives the adapter registry through the reliability layer
//! for every selected action (plus any retry-queue entries drained in
//! Phase 4), updating idempotency/breaker/retry-queue state on
//! `StateDocument` and producing the audit events for what happened.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sentinel_adapters::{AdapterRegistry, ExecutionContext};
use sentinel_breaker::BreakerConfig;
use sentinel_output_sanitizer::redact_known_patterns;
use sentinel_retry::RetryStrategyConfig;
use sentinel_types::{
    ActionDefinition, AuditEventPayload, ErrorReason, PolicySnapshot, Receipt, RetryQueueEntry,
    StateDocument,
};
use serde_json::Value;

use crate::action_selector::resolve_template;
use crate::reliability;
use crate::reporter::Reporter;

pub struct ExecutorConfig {
    pub breaker: BreakerConfig,
    pub retry: RetryStrategyConfig,
    pub mock_mode: bool,
}

/// One unit of work the executor attempts: either a freshly selected
/// action at the current stage, or a due retry-queue entry carried
/// over from an earlier tick.
enum WorkItem<'a> {
    Fresh { action: &'a ActionDefinition, stage: String },
    Retried(RetryQueueEntry),
}

/// Run every selected action and every due retry through the registry,
/// mutating `state` (idempotency, breakers, retry queue) in place and
/// returning the audit events the orchestrator should append.
pub fn run(
    registry: &AdapterRegistry,
    state: &mut StateDocument,
    facts: &Value,
    selected: &[&ActionDefinition],
    due_retries: Vec<RetryQueueEntry>,
    policy: &PolicySnapshot,
    config: &ExecutorConfig,
    reporter: &mut dyn Reporter,
    now: DateTime<Utc>,
) -> Vec<AuditEventPayload> {
    let mut events = Vec::new();

    let mut work: Vec<WorkItem> = selected
        .iter()
        .map(|action| WorkItem::Fresh { action, stage: state.escalation.stage.clone() })
        .collect();
    for entry in due_retries {
        work.push(WorkItem::Retried(entry));
    }

    for item in work {
        let (adapter_name, action_id, stage, title, body, channel, attempt_index, last_error_carry) = match &item {
            WorkItem::Fresh { action, stage } => {
                let rendered = resolve_template(action, facts);
                (action.adapter.clone(), action.id.clone(), stage.clone(), rendered.title, rendered.body, rendered.channel, 1_u32, None)
            }
            WorkItem::Retried(entry) => {
                let Some(action) = policy.plans.get(&entry.stage).and_then(|plan| plan.actions.iter().find(|a| a.id == entry.action_id))
                else {
                    // Plan no longer lists this action (policy changed between ticks); drop silently.
                    events.push(AuditEventPayload::ActionDropped {
                        adapter: entry.adapter.clone(),
                        action_id: entry.action_id.clone(),
                        attempt: entry.attempt,
                    });
                    continue;
                };
                let rendered = resolve_template(action, facts);
                (
                    entry.adapter.clone(),
                    entry.action_id.clone(),
                    entry.stage.clone(),
                    rendered.title,
                    rendered.body,
                    rendered.channel,
                    entry.attempt,
                    entry.last_error.clone(),
                )
            }
        };

        reporter.info(&format!("executing action `{action_id}` via adapter `{adapter_name}`"));

        let key = idempotency_key_for(&stage, &action_id, state);
        if state.actions.has_executed(&key) {
            events.push(AuditEventPayload::ActionSkippedIdempotent { adapter: adapter_name, action_id });
            continue;
        }

        let receipt = if !reliability::allow_call(state, &adapter_name, config.breaker, now) {
            Receipt::deferred(&adapter_name, &action_id, ErrorReason::CircuitOpen, now)
        } else {
            let ctx = ExecutionContext {
                project_id: state.meta.project_id.clone(),
                stage: stage.clone(),
                action_id: action_id.clone(),
                title,
                body,
                channel,
                addresses: state.routing.addresses.clone(),
                mock_mode: config.mock_mode,
                now,
            };
            events.push(AuditEventPayload::ActionAttempt { adapter: adapter_name.clone(), action_id: action_id.clone() });
            let receipt = registry.execute(&adapter_name, &ctx);
            match receipt.kind {
                sentinel_types::ReceiptKind::Ok => reliability::record_success(state, &adapter_name, config.breaker),
                sentinel_types::ReceiptKind::Failed => reliability::record_failure(state, &adapter_name, config.breaker, now),
                sentinel_types::ReceiptKind::Skipped | sentinel_types::ReceiptKind::Deferred => {}
            }
            receipt
        };

        let sanitized_detail = receipt.detail.as_deref().map(redact_known_patterns);

        events.push(AuditEventPayload::ActionReceipt {
            adapter: adapter_name.clone(),
            action_id: action_id.clone(),
            reason: receipt.reason,
        });

        if receipt.consumes_idempotency_key() {
            state.actions.record(&key, now);
        }

        if receipt.should_retry() {
            let last_error = sanitized_detail.or_else(|| receipt.reason.map(|r| r.to_string()));
            match reliability::schedule_retry(state, &config.retry, &adapter_name, &stage, &action_id, attempt_index, last_error, now) {
                Some(entry) => events.push(AuditEventPayload::RetryScheduled {
                    adapter: adapter_name,
                    action_id,
                    attempt: entry.attempt,
                    next_attempt_at: entry.next_attempt_at,
                }),
                None => events.push(AuditEventPayload::ActionDropped { adapter: adapter_name, action_id, attempt: attempt_index }),
            }
        } else {
            let _ = last_error_carry; // carried for symmetry; superseded by the fresh receipt's own detail
        }

        if let sentinel_breaker::BreakerState::Open { .. } = state.breakers.get(&adapter_name).map(|b| b.state()).unwrap_or(sentinel_breaker::BreakerState::Closed { consecutive_failures: 0 }) {
            if matches!(receipt.kind, sentinel_types::ReceiptKind::Failed) {
                events.push(AuditEventPayload::BreakerOpened { adapter: adapter_name.clone() });
            }
        }
    }

    events
}

fn idempotency_key_for(stage: &str, action_id: &str, state: &StateDocument) -> sentinel_types::IdempotencyKey {
    sentinel_types::IdempotencyKey {
        stage: stage.to_string(),
        action_id: action_id.to_string(),
        stage_entered_at: state.escalation.stage_entered_at,
    }
}
