//! Release protocol: an out-of-band command path that bypasses
//! time-based escalation, and renewal, its mirror operation.
//!
//! Both operations mutate [`StateDocument`] directly rather than going
//! through [`crate::rule_engine::evaluate`] — the monotonic-progression
//! invariant the rule engine enforces is exactly what these two need to
//! bypass, and bypassing it from outside is simpler than teaching the
//! engine which caller is allowed to break its own rule.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sentinel_types::{PolicySnapshot, StateDocument};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseScope {
    Full,
    SiteOnly,
}

#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    pub target_stage: String,
    pub delay: Duration,
    pub scope: ReleaseScope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretOutcome {
    Accepted,
    Rejected { failed_attempts: u32 },
    LockedOut { failed_attempts: u32 },
}

/// `Constants` key for the lockout threshold; missing from a policy
/// means lockout never engages, since the loader's own validation
/// already requires referenced constants to exist if a rule reads them.
const MAX_FAILED_ATTEMPTS_KEY: &str = "max_failed_attempts";

fn is_locked_out(state: &StateDocument, policy: &PolicySnapshot) -> bool {
    match policy.constants.get_u64(MAX_FAILED_ATTEMPTS_KEY) {
        Some(max) => u64::from(state.renewal.failed_attempts) >= max,
        None => false,
    }
}

/// Verify `provided` against the project's configured release secret
/// and, on success, arm the release: set `release.triggered`,
/// `target_stage`, `trigger_time`, `execute_after`, and a fresh nonce.
/// A mismatch increments `renewal.failed_attempts` (the same counter
/// renewal uses) and touches nothing else.
pub fn verify_and_trigger_release(
    policy: &PolicySnapshot,
    state: &mut StateDocument,
    configured_secret: &str,
    provided_secret: &str,
    request: &ReleaseRequest,
    now: DateTime<Utc>,
) -> Result<SecretOutcome, CoreError> {
    if is_locked_out(state, policy) {
        return Ok(SecretOutcome::LockedOut { failed_attempts: state.renewal.failed_attempts });
    }

    if !sentinel_auth::secrets_match(provided_secret, configured_secret) {
        state.renewal.failed_attempts += 1;
        return Ok(SecretOutcome::Rejected { failed_attempts: state.renewal.failed_attempts });
    }

    let current_order = policy.state_order(&state.escalation.stage).unwrap_or(0);
    match policy.state_order(&request.target_stage) {
        Some(target_order) if target_order >= current_order => {}
        _ => {
            return Err(CoreError::Other(anyhow::anyhow!(
                "release target stage `{}` is not >= current stage `{}`",
                request.target_stage,
                state.escalation.stage
            )));
        }
    }

    state.release.triggered = true;
    state.release.target_stage = Some(request.target_stage.clone());
    state.release.trigger_time = Some(now);
    state.release.execute_after = Some(now + request.delay);
    state.release.nonce = Some(generate_nonce());
    state
        .routing
        .flags
        .insert("release_scope_site_only".to_string(), request.scope == ReleaseScope::SiteOnly);

    Ok(SecretOutcome::Accepted)
}

/// Verify `provided` and, on success, clear any pending release, reset
/// the stage to the policy's lowest-order state, bump
/// `last_renewal_at`, and mark `renewed_this_tick` so the rule engine
/// holds that reset for the remainder of the tick.
pub fn apply_renewal(
    policy: &PolicySnapshot,
    state: &mut StateDocument,
    configured_secret: &str,
    provided_secret: &str,
    now: DateTime<Utc>,
) -> SecretOutcome {
    if is_locked_out(state, policy) {
        return SecretOutcome::LockedOut { failed_attempts: state.renewal.failed_attempts };
    }

    if !sentinel_auth::secrets_match(provided_secret, configured_secret) {
        state.renewal.failed_attempts += 1;
        return SecretOutcome::Rejected { failed_attempts: state.renewal.failed_attempts };
    }

    state.release = sentinel_types::ReleaseSection::default();

    if let Some(lowest) = policy.states.iter().min_by_key(|s| s.order) {
        state.escalation.previous_stage = Some(state.escalation.stage.clone());
        state.escalation.stage = lowest.name.clone();
        state.escalation.stage_entered_at = now;
    }

    state.renewal.last_renewal_at = Some(now);
    state.renewal.renewed_this_tick = true;
    state.renewal.failed_attempts = 0;

    SecretOutcome::Accepted
}

/// If a release is armed and due (`triggered && now >= execute_after`),
/// apply its stage transition directly, bypassing monotonic
/// progression, and clear `triggered` while preserving `trigger_time`
/// for the audit trail. Returns the stage transitioned to, if any.
pub fn apply_due_release(state: &mut StateDocument, now: DateTime<Utc>) -> Option<String> {
    if !state.release.triggered {
        return None;
    }
    let Some(execute_after) = state.release.execute_after else { return None };
    if now < execute_after {
        return None;
    }
    let Some(target) = state.release.target_stage.clone() else { return None };

    state.escalation.previous_stage = Some(state.escalation.stage.clone());
    state.escalation.stage = target.clone();
    state.escalation.stage_entered_at = now;
    state.release.triggered = false;

    Some(target)
}

fn generate_nonce() -> String {
    let mut bytes = [0_u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_duration::Minutes;
    use sentinel_types::{
        ActionsSection, Constants, EscalationSection, MetaSection, ReleaseSection, RenewalSection,
        RoutingSection, StateDef, TimerSection,
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

    fn policy() -> PolicySnapshot {
        PolicySnapshot {
            schema: "sentinel.policy.v1".into(),
            states: vec![
                StateDef { name: "armed".into(), order: 0, terminal: false },
                StateDef { name: "escalated".into(), order: 1, terminal: false },
                StateDef { name: "released".into(), order: 2, terminal: true },
            ],
            rules: Vec::new(),
            plans: BTreeMap::new(),
            constants: Constants { values: BTreeMap::from([("max_failed_attempts".to_string(), serde_json::json!(3))]) },
        }
    }

    #[test]
    fn mismatched_secret_increments_failed_attempts_and_touches_nothing_else() {
        let now = t("2026-01-01T00:00:00Z");
        let mut state = base_state("armed", now);
        let request = ReleaseRequest { target_stage: "released".into(), delay: Duration::zero(), scope: ReleaseScope::Full };
        let outcome = verify_and_trigger_release(&policy(), &mut state, "correct", "wrong", &request, now).unwrap();
        assert_eq!(outcome, SecretOutcome::Rejected { failed_attempts: 1 });
        assert!(!state.release.triggered);
    }

    #[test]
    fn matching_secret_arms_the_release() {
        let now = t("2026-01-01T00:00:00Z");
        let mut state = base_state("armed", now);
        let request = ReleaseRequest { target_stage: "released".into(), delay: Duration::minutes(30), scope: ReleaseScope::Full };
        let outcome = verify_and_trigger_release(&policy(), &mut state, "correct", "correct", &request, now).unwrap();
        assert_eq!(outcome, SecretOutcome::Accepted);
        assert!(state.release.triggered);
        assert_eq!(state.release.target_stage.as_deref(), Some("released"));
        assert_eq!(state.release.execute_after, Some(now + Duration::minutes(30)));
        assert!(state.release.nonce.is_some());
    }

    #[test]
    fn lockout_freezes_release_regardless_of_secret_correctness() {
        let now = t("2026-01-01T00:00:00Z");
        let mut state = base_state("armed", now);
        state.renewal.failed_attempts = 3;
        let request = ReleaseRequest { target_stage: "released".into(), delay: Duration::zero(), scope: ReleaseScope::Full };
        let outcome = verify_and_trigger_release(&policy(), &mut state, "correct", "correct", &request, now).unwrap();
        assert_eq!(outcome, SecretOutcome::LockedOut { failed_attempts: 3 });
        assert!(!state.release.triggered);
    }

    #[test]
    fn renewal_resets_stage_and_clears_failed_attempts() {
        let now = t("2026-01-01T00:00:00Z");
        let mut state = base_state("escalated", now);
        state.renewal.failed_attempts = 2;
        state.release.triggered = true;
        let outcome = apply_renewal(&policy(), &mut state, "correct", "correct", now);
        assert_eq!(outcome, SecretOutcome::Accepted);
        assert_eq!(state.escalation.stage, "armed");
        assert_eq!(state.escalation.previous_stage.as_deref(), Some("escalated"));
        assert!(state.renewal.renewed_this_tick);
        assert_eq!(state.renewal.failed_attempts, 0);
        assert!(!state.release.triggered);
    }

    #[test]
    fn due_release_transitions_and_clears_triggered_but_keeps_trigger_time() {
        let armed_at = t("2026-01-01T00:00:00Z");
        let mut state = base_state("armed", armed_at);
        state.release.triggered = true;
        state.release.trigger_time = Some(armed_at);
        state.release.execute_after = Some(armed_at + Duration::minutes(10));
        state.release.target_stage = Some("released".into());

        let too_early = armed_at + Duration::minutes(5);
        assert!(apply_due_release(&mut state, too_early).is_none());

        let due = armed_at + Duration::minutes(10);
        let transitioned = apply_due_release(&mut state, due);
        assert_eq!(transitioned.as_deref(), Some("released"));
        assert_eq!(state.escalation.stage, "released");
        assert!(!state.release.triggered);
        assert_eq!(state.release.trigger_time, Some(armed_at));
    }

    #[test]
    fn not_yet_triggered_release_is_a_no_op() {
        let now = t("2026-01-01T00:00:00Z");
        let mut state = base_state("armed", now);
        assert!(apply_due_release(&mut state, now).is_none());
    }
}
