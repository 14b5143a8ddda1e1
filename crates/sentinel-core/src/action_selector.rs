//! Phase 6: maps the tick's resulting stage to an ordered, idempotency
//! filtered action list, then resolves each action's message template.

use sentinel_types::{ActionDefinition, IdempotencyKey, PolicySnapshot, StateDocument};
use serde_json::Value;

/// Actions still worth attempting for `state`'s current stage: plan
/// entries in declaration order, minus disabled actions and actions
/// whose idempotency key already has an `ok`/`skipped` receipt. A
/// stage absent from the policy's plans selects nothing — not an
/// error, since a terminal or silent stage legitimately has no
/// actions.
pub fn select<'a>(policy: &'a PolicySnapshot, state: &StateDocument) -> Vec<&'a ActionDefinition> {
    let Some(plan) = policy.plans.get(&state.escalation.stage) else { return Vec::new() };

    plan.actions
        .iter()
        .filter(|action| action.enabled)
        .filter(|action| {
            let key = idempotency_key(state, action);
            !state.actions.has_executed(&key)
        })
        .collect()
}

pub fn idempotency_key(state: &StateDocument, action: &ActionDefinition) -> IdempotencyKey {
    IdempotencyKey {
        stage: state.escalation.stage.clone(),
        action_id: action.id.clone(),
        stage_entered_at: state.escalation.stage_entered_at,
    }
}

/// One action with its template variables substituted.
#[derive(Debug, Clone, Default)]
pub struct ResolvedAction {
    pub title: String,
    pub body: String,
    pub channel: String,
}

/// Substitutes `{{dotted.path}}` placeholders against the tick's fact
/// tree. A missing variable resolves to an empty string rather than
/// failing the action — a half-rendered notification is better than
/// none at all going out during an incident.
pub fn resolve_template(action: &ActionDefinition, facts: &Value) -> ResolvedAction {
    ResolvedAction {
        title: render(action.template.get("title").map(String::as_str).unwrap_or(""), facts),
        body: render(action.template.get("body").map(String::as_str).unwrap_or(""), facts),
        channel: render(action.template.get("channel").map(String::as_str).unwrap_or(""), facts),
    }
}

fn render(template: &str, facts: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let Some(end) = rest[start..].find("}}") else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let path = rest[start + 2..start + end].trim();
        let value = crate::facts::get_path(facts, path);
        out.push_str(&value_as_display(value));
        rest = &rest[start + end + 2..];
    }
    out.push_str(rest);
    out
}

fn value_as_display(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
