//! Evaluates the policy's predicate language against a fact tree.
//! Evaluation is total and side-effect-free: a path that resolves to
//! nothing simply fails to match, it never errors the tick.

use sentinel_types::{PredicateAtom, PredicateOp};
use serde_json::Value;

use crate::facts::get_path;

/// A conjunction of atoms; empty matches unconditionally.
pub fn evaluate_all(facts: &Value, atoms: &[PredicateAtom]) -> bool {
    atoms.iter().all(|atom| evaluate_atom(facts, atom))
}

fn evaluate_atom(facts: &Value, atom: &PredicateAtom) -> bool {
    let Some(actual) = get_path(facts, &atom.path) else { return false };

    match atom.op {
        PredicateOp::StateIs => actual == &atom.value,
        PredicateOp::StateIn => match &atom.value {
            Value::Array(candidates) => candidates.iter().any(|c| c == actual),
            _ => false,
        },
        PredicateOp::Eq => actual == &atom.value,
        PredicateOp::Lt => compare_numeric(actual, &atom.value, |a, b| a < b),
        PredicateOp::Lte => compare_numeric(actual, &atom.value, |a, b| a <= b),
        PredicateOp::Gt => compare_numeric(actual, &atom.value, |a, b| a > b),
        PredicateOp::Gte => compare_numeric(actual, &atom.value, |a, b| a >= b),
    }
}

fn compare_numeric(actual: &Value, expected: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}
