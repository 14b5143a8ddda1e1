//! Phase 5 of the tick: ordered predicate evaluation over the policy's
//! rules, producing state mutations and transition events.
//!
//! Rule predicates are evaluated once, against the fact view sampled
//! at the top of the tick; mutations are pooled and applied atomically
//! once every rule has been considered, never rule-by-rule.

use chrono::{DateTime, Utc};
use sentinel_types::{PolicySnapshot, RuleMutation, StateDocument};
use serde_json::Value;

use crate::error::CoreError;
use crate::facts::{build_facts, evaluate_time};
use crate::mutation::{clear_path, increment_path, set_path};
use crate::predicate::evaluate_all;

/// One rule whose predicate matched this tick.
#[derive(Debug, Clone)]
pub struct FiredRule {
    pub rule_id: String,
    pub from_stage: String,
    pub to_stage: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RuleEvalOutcome {
    pub state: StateDocument,
    pub fired: Vec<FiredRule>,
}

/// Evaluate every enabled rule in declaration order against `state`,
/// pool their mutations, and apply them. `stop` on a matching rule
/// ends evaluation for the tick; a `set_state` target outside the
/// monotonic order from the current stage is silently refused (the
/// rule's other field mutations still apply) since ordinary rule
/// firings never bypass monotonic progression — only the release and
/// renewal protocol do that, and they mutate state before this runs.
pub fn evaluate(policy: &PolicySnapshot, state: &StateDocument, now: DateTime<Utc>) -> Result<RuleEvalOutcome, CoreError> {
    let time = evaluate_time(state.timer.deadline, now);
    let facts = build_facts(state, policy, time);

    let mut fired = Vec::new();
    let mut pooled_mutations: Vec<&RuleMutation> = Vec::new();
    let mut set_state_targets: Vec<String> = Vec::new();

    for rule in &policy.rules {
        if !rule.enabled {
            continue;
        }
        if !evaluate_all(&facts, &rule.when.all) {
            continue;
        }

        let mut to_stage = None;
        for mutation in &rule.then {
            if let RuleMutation::SetState { to } = mutation {
                set_state_targets.push(to.clone());
                to_stage = Some(to.clone());
            }
            pooled_mutations.push(mutation);
        }

        fired.push(FiredRule { rule_id: rule.id.clone(), from_stage: state.escalation.stage.clone(), to_stage });

        if rule.stop {
            break;
        }
    }

    set_state_targets.dedup();
    if set_state_targets.len() > 1 {
        return Err(CoreError::ConflictingStateTransition { targets: set_state_targets });
    }

    let mut patched: Value = serde_json::to_value(state).expect("StateDocument always serializes");
    for mutation in &pooled_mutations {
        match mutation {
            RuleMutation::SetState { .. } => {} // applied below, after the monotonic check
            RuleMutation::SetField { path, value } => {
                set_path(&mut patched, path, value.clone());
            }
            RuleMutation::IncrementField { path, by } => {
                increment_path(&mut patched, path, *by);
            }
            RuleMutation::ClearField { path } => {
                clear_path(&mut patched, path);
            }
        }
    }

    if let Some(target) = set_state_targets.into_iter().next() {
        let current_order = policy.state_order(&state.escalation.stage);
        let target_order = policy.state_order(&target);
        let monotonic_ok = match (current_order, target_order) {
            (Some(cur), Some(tgt)) => tgt >= cur,
            _ => true, // unknown orders: loader already validated the name exists, let it through
        };
        // A tick that just applied a renewal reset holds that stage for
        // the rest of the tick; an ordinary rule re-escalating in the
        // same pass would defeat the reset the operator just asked for.
        if monotonic_ok && !state.renewal.renewed_this_tick {
            set_path(&mut patched, "escalation.previous_stage", Value::String(state.escalation.stage.clone()));
            set_path(&mut patched, "escalation.stage", Value::String(target));
            set_path(&mut patched, "escalation.stage_entered_at", serde_json::to_value(now).unwrap());
        }
    }

    set_path(&mut patched, "meta.updated_at", serde_json::to_value(now).unwrap());

    let new_state: StateDocument = serde_json::from_value(patched).map_err(CoreError::StateEncoding)?;
    Ok(RuleEvalOutcome { state: new_state, fired })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_duration::Minutes;
    use sentinel_types::{
        ActionsSection, Constants, EscalationSection, MetaSection, Plan, Predicate, PredicateAtom,
        PredicateOp, ReleaseSection, RenewalSection, RoutingSection, Rule, StateDef, TimerSection,
    };
    use std::collections::BTreeMap;

    fn t(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn base_state(stage: &str, now: DateTime<Utc>) -> StateDocument {
        StateDocument {
            meta: MetaSection { project_id: "p".into(), schema: "sentinel.state.v1".into(), created_at: now, updated_at: now },
            timer: TimerSection { deadline: now, grace_minutes: Minutes(0) },
            escalation: EscalationSection { stage: stage.into(), stage_entered_at: now, previous_stage: None },
            renewal: RenewalSection { last_renewal_at: None, renewed_this_tick: false, failed_attempts: 0 },
            release: ReleaseSection::default(),
            actions: ActionsSection::default(),
            routing: RoutingSection::default(),
            retry_queue: Vec::new(),
            breakers: BTreeMap::new(),
        }
    }

    fn policy_with_rules(rules: Vec<Rule>) -> PolicySnapshot {
        PolicySnapshot {
            schema: "sentinel.policy.v1".into(),
            states: vec![
                StateDef { name: "armed".into(), order: 0, terminal: false },
                StateDef { name: "escalated".into(), order: 1, terminal: false },
                StateDef { name: "released".into(), order: 2, terminal: true },
            ],
            rules,
            plans: BTreeMap::from([("escalated".to_string(), Plan::default())]),
            constants: Constants::default(),
        }
    }

    #[test]
    fn matching_rule_applies_set_state_and_records_previous_stage() {
        let now = t("2026-01-01T01:00:00Z");
        let state = base_state("armed", now);
        let rule = Rule {
            id: "overdue-escalate".into(),
            description: String::new(),
            when: Predicate { all: vec![PredicateAtom { path: "escalation.stage".into(), op: PredicateOp::StateIs, value: serde_json::json!("armed") }] },
            then: vec![RuleMutation::SetState { to: "escalated".into() }],
            stop: true,
            enabled: true,
            locked: false,
        };
        let outcome = evaluate(&policy_with_rules(vec![rule]), &state, now).unwrap();
        assert_eq!(outcome.state.escalation.stage, "escalated");
        assert_eq!(outcome.state.escalation.previous_stage.as_deref(), Some("armed"));
        assert_eq!(outcome.fired.len(), 1);
    }

    #[test]
    fn stop_rule_prevents_later_rules_from_firing() {
        let now = t("2026-01-01T01:00:00Z");
        let state = base_state("armed", now);
        let stopping = Rule {
            id: "r1".into(),
            description: String::new(),
            when: Predicate::default(),
            then: vec![RuleMutation::IncrementField { path: "renewal.failed_attempts".into(), by: 1 }],
            stop: true,
            enabled: true,
            locked: false,
        };
        let never_runs = Rule {
            id: "r2".into(),
            description: String::new(),
            when: Predicate::default(),
            then: vec![RuleMutation::IncrementField { path: "renewal.failed_attempts".into(), by: 100 }],
            stop: false,
            enabled: true,
            locked: false,
        };
        let outcome = evaluate(&policy_with_rules(vec![stopping, never_runs]), &state, now).unwrap();
        assert_eq!(outcome.state.renewal.failed_attempts, 1);
    }

    #[test]
    fn conflicting_set_state_targets_is_an_error() {
        let now = t("2026-01-01T01:00:00Z");
        let state = base_state("armed", now);
        let r1 = Rule {
            id: "to-escalated".into(),
            description: String::new(),
            when: Predicate::default(),
            then: vec![RuleMutation::SetState { to: "escalated".into() }],
            stop: false,
            enabled: true,
            locked: false,
        };
        let r2 = Rule {
            id: "to-released".into(),
            description: String::new(),
            when: Predicate::default(),
            then: vec![RuleMutation::SetState { to: "released".into() }],
            stop: false,
            enabled: true,
            locked: false,
        };
        let result = evaluate(&policy_with_rules(vec![r1, r2]), &state, now);
        assert!(matches!(result, Err(CoreError::ConflictingStateTransition { .. })));
    }

    #[test]
    fn set_state_regressing_order_is_refused_but_other_mutations_still_apply() {
        let now = t("2026-01-01T01:00:00Z");
        let state = base_state("escalated", now);
        let rule = Rule {
            id: "bad-regression".into(),
            description: String::new(),
            when: Predicate::default(),
            then: vec![
                RuleMutation::SetState { to: "armed".into() },
                RuleMutation::IncrementField { path: "renewal.failed_attempts".into(), by: 1 },
            ],
            stop: true,
            enabled: true,
            locked: false,
        };
        let outcome = evaluate(&policy_with_rules(vec![rule]), &state, now).unwrap();
        assert_eq!(outcome.state.escalation.stage, "escalated");
        assert_eq!(outcome.state.renewal.failed_attempts, 1);
    }

    #[test]
    fn disabled_rules_never_fire() {
        let now = t("2026-01-01T01:00:00Z");
        let state = base_state("armed", now);
        let rule = Rule {
            id: "disabled".into(),
            description: String::new(),
            when: Predicate::default(),
            then: vec![RuleMutation::SetState { to: "escalated".into() }],
            stop: true,
            enabled: false,
            locked: false,
        };
        let outcome = evaluate(&policy_with_rules(vec![rule]), &state, now).unwrap();
        assert_eq!(outcome.state.escalation.stage, "armed");
        assert!(outcome.fired.is_empty());
    }

    #[test]
    fn renewed_this_tick_refuses_reescalation_for_the_rest_of_the_tick() {
        let now = t("2026-01-01T01:00:00Z");
        let mut state = base_state("armed", now);
        state.renewal.renewed_this_tick = true;
        let rule = Rule {
            id: "overdue-escalate".into(),
            description: String::new(),
            when: Predicate::default(),
            then: vec![RuleMutation::SetState { to: "escalated".into() }],
            stop: true,
            enabled: true,
            locked: true,
        };
        let outcome = evaluate(&policy_with_rules(vec![rule]), &state, now).unwrap();
        assert_eq!(outcome.state.escalation.stage, "armed");
    }
}
