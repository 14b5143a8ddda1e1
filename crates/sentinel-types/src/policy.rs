use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::SchemaVersion;

/// An immutable, validated policy for one tick. Loaded once per tick by
/// the policy loader and never mutated; rule evaluation only mutates
/// the state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub schema: String,
    pub states: Vec<StateDef>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub plans: BTreeMap<String, Plan>,
    #[serde(default)]
    pub constants: Constants,
}

impl PolicySnapshot {
    pub fn schema_version(&self) -> Result<SchemaVersion, sentinel_schema::SchemaError> {
        SchemaVersion::parse_checked(&self.schema, "sentinel", "policy")
    }

    /// States in declared order. Rule evaluation's monotonic-progression
    /// invariant is checked against this ordering.
    pub fn state_order(&self, name: &str) -> Option<u32> {
        self.states.iter().find(|s| s.name == name).map(|s| s.order)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDef {
    pub name: String,
    pub order: u32,
    #[serde(default)]
    pub terminal: bool,
}

/// One declaration-ordered rule. `when` is a conjunction of atoms;
/// `then` is an ordered list of mutations applied if `when` matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub when: Predicate,
    pub then: Vec<RuleMutation>,
    #[serde(default)]
    pub stop: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub locked: bool,
}

fn default_true() -> bool {
    true
}

/// A conjunction of [`PredicateAtom`]s. An empty predicate matches
/// unconditionally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    #[serde(default)]
    pub all: Vec<PredicateAtom>,
}

/// One atom of the predicate language: `path` is a dotted lookup into
/// the flattened time-namespace-plus-state-document view the rule
/// engine builds per tick; `op` picks the comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredicateAtom {
    pub path: String,
    pub op: PredicateOp,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateOp {
    StateIs,
    StateIn,
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// A single field mutation applied when a rule fires, e.g. `set_state`
/// or `set_field`. Kept as a tagged enum so the rule engine can match
/// on it exhaustively rather than string-sniffing a generic op name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RuleMutation {
    SetState { to: String },
    SetField { path: String, value: serde_json::Value },
    IncrementField { path: String, by: i64 },
    ClearField { path: String },
}

/// The ordered list of actions to run when a stage is entered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub actions: Vec<ActionDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub id: String,
    pub adapter: String,
    #[serde(default)]
    pub template: BTreeMap<String, String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Named timing values referenced by rule predicates and the executor,
/// e.g. `max_failed_attempts`, `retry_base_seconds`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constants {
    #[serde(flatten)]
    pub values: BTreeMap<String, serde_json::Value>,
}

impl Constants {
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.values.get(key).and_then(|v| v.as_u64())
    }
}
