//! Builds the flattened, dotted-path fact view the predicate language
//! evaluates against: the state document's own JSON shape, plus a
//! synthesized `time` namespace and the policy's `constants` map.

use chrono::{DateTime, Utc};
use sentinel_types::{PolicySnapshot, StateDocument};
use serde_json::Value;

/// `time_to_deadline_minutes` / `overdue_minutes`, computed once per
/// tick from a single clock read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeContext {
    pub time_to_deadline_minutes: i64,
    pub overdue_minutes: i64,
}

/// Deadline - now, floored to whole minutes; `overdue` never goes
/// negative, and `deadline == now` reads as `overdue = 0` rather than
/// a signed zero crossing.
pub fn evaluate_time(deadline: DateTime<Utc>, now: DateTime<Utc>) -> TimeContext {
    let seconds = (deadline - now).num_seconds();
    let time_to_deadline_minutes = seconds.div_euclid(60);
    let overdue_minutes = (-time_to_deadline_minutes).max(0);
    TimeContext { time_to_deadline_minutes, overdue_minutes }
}

/// Build the combined fact tree: `state.*` document fields at their
/// own top-level keys (`meta`, `timer`, ...), plus `time.*` and
/// `constants.*`.
pub fn build_facts(state: &StateDocument, policy: &PolicySnapshot, time: TimeContext) -> Value {
    let mut root = serde_json::to_value(state).expect("StateDocument always serializes");
    let obj = root.as_object_mut().expect("StateDocument serializes to an object");

    obj.insert(
        "time".to_string(),
        serde_json::json!({
            "time_to_deadline_minutes": time.time_to_deadline_minutes,
            "overdue_minutes": time.overdue_minutes,
        }),
    );
    obj.insert(
        "constants".to_string(),
        serde_json::to_value(&policy.constants.values).unwrap_or(Value::Object(Default::default())),
    );

    root
}

/// Resolve a dotted path (`"escalation.stage"`, `"time.overdue_minutes"`)
/// against a fact tree. Missing paths return `None`, never an error:
/// predicate evaluation is total.
pub fn get_path<'a>(facts: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = facts;
    for part in path.split('.') {
        cur = cur.as_object()?.get(part)?;
    }
    Some(cur)
}
