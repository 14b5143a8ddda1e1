//! Applies `set_field` / `increment_field` / `clear_field` mutations to
//! a state document's JSON shape. `set_state` is handled separately by
//! the rule engine, since a stage transition carries bookkeeping
//! (`previous_stage`, `stage_entered_at`) a generic path-set can't
//! know about.

use serde_json::Value;

/// Set the value at a dotted path. Returns `false` if any path segment
/// but the last doesn't already exist (a mutation can't invent new
/// document shape, only change values the schema already defines).
pub fn set_path(root: &mut Value, path: &str, new_value: Value) -> bool {
    let Some((parent, last)) = navigate_to_parent(root, path) else { return false };
    if !parent.is_object() || parent.get(last).is_none() {
        return false;
    }
    parent[last] = new_value;
    true
}

/// Add `by` to the numeric value at `path`. No-op if the current value
/// isn't a number.
pub fn increment_path(root: &mut Value, path: &str, by: i64) -> bool {
    let Some((parent, last)) = navigate_to_parent(root, path) else { return false };
    let Some(current) = parent.get(last).and_then(Value::as_i64) else { return false };
    parent[last] = Value::from(current + by);
    true
}

/// Reset the value at `path` to its type's zero value (`0`, `""`,
/// `false`, `[]`, or `null` stays `null`).
pub fn clear_path(root: &mut Value, path: &str) -> bool {
    let Some((parent, last)) = navigate_to_parent(root, path) else { return false };
    let Some(current) = parent.get(last) else { return false };
    let cleared = match current {
        Value::Null => Value::Null,
        Value::Bool(_) => Value::Bool(false),
        Value::Number(_) => Value::from(0),
        Value::String(_) => Value::String(String::new()),
        Value::Array(_) => Value::Array(Vec::new()),
        Value::Object(_) => return false,
    };
    parent[last] = cleared;
    true
}

fn navigate_to_parent<'a>(root: &'a mut Value, path: &str) -> Option<(&'a mut Value, &'a str)> {
    let mut parts = path.split('.').peekable();
    let mut cur = root;
    loop {
        let part = parts.next()?;
        if parts.peek().is_none() {
            return Some((cur, part));
        }
        cur = cur.get_mut(part)?;
    }
}
