//! Policy loader: parses a policy directory's TOML files into an
//! immutable [`PolicySnapshot`] and validates it before a tick is
//! allowed to use it.
//!
//! A policy directory holds one or more `*.toml` files; each file
//! contributes top-level tables (`schema`, `states`, `rules`, `plans`,
//! `constants`) that are merged before parsing. Splitting across files
//! is a convenience for large policies; a single `policy.toml` works
//! just as well.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use sentinel_types::{PolicySnapshot, PredicateOp, RuleMutation};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read policy file {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to parse policy file {path}: {source}")]
    Parse { path: PathBuf, #[source] source: toml::de::Error },
    #[error("policy schema error: {0}")]
    Schema(#[from] sentinel_schema::SchemaError),
    #[error("key `{key}` is defined in more than one policy file")]
    DuplicateTopLevelKey { key: String },
    #[error("rule `{rule_id}` references unknown state `{state}`")]
    UnknownStateInRule { rule_id: String, state: String },
    #[error("duplicate rule id `{0}`")]
    DuplicateRuleId(String),
    #[error("plan for stage `{0}` does not match any declared state")]
    UnknownPlanStage(String),
    #[error("action `{action_id}` in stage `{stage}` uses unknown adapter `{adapter}`")]
    UnknownAdapter { stage: String, action_id: String, adapter: String },
    #[error("rule `{0}` is locked but declared disabled; locked rules cannot be disabled")]
    LockedRuleDisabled(String),
    #[error("constant `{0}` is negative; constants must be non-negative")]
    NegativeConstant(String),
    #[error("rule `{rule_id}` references unknown constant `{constant}`")]
    UnknownConstantInRule { rule_id: String, constant: String },
}

/// Parse and validate every `*.toml` file in `dir` into one
/// [`PolicySnapshot`]. `known_adapters` is the set of adapter names the
/// caller's registry actually serves; kept as a parameter rather than a
/// dependency so this crate never needs to depend on the adapters
/// crate.
pub fn load_dir(dir: &Path, known_adapters: &[&str]) -> Result<PolicySnapshot, PolicyError> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|source| PolicyError::Io { path: dir.to_path_buf(), source })?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    entries.sort();

    let mut merged = toml::map::Map::new();
    for path in entries {
        let content = fs::read_to_string(&path)
            .map_err(|source| PolicyError::Io { path: path.clone(), source })?;
        let parsed: toml::Value = toml::from_str(&content)
            .map_err(|source| PolicyError::Parse { path: path.clone(), source })?;
        let toml::Value::Table(table) = parsed else {
            continue;
        };
        for (key, value) in table {
            if merged.insert(key.clone(), value).is_some() {
                return Err(PolicyError::DuplicateTopLevelKey { key });
            }
        }
    }

    let snapshot: PolicySnapshot = toml::Value::Table(merged)
        .try_into()
        .map_err(|source| PolicyError::Parse { path: dir.to_path_buf(), source })?;

    snapshot.schema_version()?;
    validate(&snapshot, known_adapters)?;

    Ok(snapshot)
}

/// Structural validation independent of file loading, so tests can
/// exercise it against an in-memory snapshot directly.
pub fn validate(snapshot: &PolicySnapshot, known_adapters: &[&str]) -> Result<(), PolicyError> {
    let known_states: BTreeMap<&str, ()> =
        snapshot.states.iter().map(|s| (s.name.as_str(), ())).collect();

    let mut seen_ids = BTreeMap::new();
    for rule in &snapshot.rules {
        if seen_ids.insert(rule.id.clone(), ()).is_some() {
            return Err(PolicyError::DuplicateRuleId(rule.id.clone()));
        }
        if rule.locked && !rule.enabled {
            return Err(PolicyError::LockedRuleDisabled(rule.id.clone()));
        }

        for atom in &rule.when.all {
            if matches!(atom.op, PredicateOp::StateIs) {
                if let Some(state) = atom.value.as_str() {
                    if !known_states.contains_key(state) {
                        return Err(PolicyError::UnknownStateInRule {
                            rule_id: rule.id.clone(),
                            state: state.to_string(),
                        });
                    }
                }
            }
            if matches!(atom.op, PredicateOp::StateIn) {
                if let Some(states) = atom.value.as_array() {
                    for s in states {
                        if let Some(state) = s.as_str() {
                            if !known_states.contains_key(state) {
                                return Err(PolicyError::UnknownStateInRule {
                                    rule_id: rule.id.clone(),
                                    state: state.to_string(),
                                });
                            }
                        }
                    }
                }
            }
        }

        for mutation in &rule.then {
            if let RuleMutation::SetState { to } = mutation {
                if !known_states.contains_key(to.as_str()) {
                    return Err(PolicyError::UnknownStateInRule {
                        rule_id: rule.id.clone(),
                        state: to.clone(),
                    });
                }
            }
        }

        for atom in &rule.when.all {
            if let Some(constant) = atom.path.strip_prefix("constants.") {
                if !snapshot.constants.values.contains_key(constant) {
                    return Err(PolicyError::UnknownConstantInRule {
                        rule_id: rule.id.clone(),
                        constant: constant.to_string(),
                    });
                }
            }
        }
    }

    for (stage, plan) in &snapshot.plans {
        if !known_states.contains_key(stage.as_str()) {
            return Err(PolicyError::UnknownPlanStage(stage.clone()));
        }
        for action in &plan.actions {
            if !known_adapters.contains(&action.adapter.as_str()) {
                return Err(PolicyError::UnknownAdapter {
                    stage: stage.clone(),
                    action_id: action.id.clone(),
                    adapter: action.adapter.clone(),
                });
            }
        }
    }

    for (name, value) in &snapshot.constants.values {
        if let Some(n) = value.as_f64() {
            if n < 0.0 {
                return Err(PolicyError::NegativeConstant(name.clone()));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_types::{ActionDefinition, Constants, Plan, Predicate, PredicateAtom, Rule, StateDef};

    fn base_snapshot() -> PolicySnapshot {
        PolicySnapshot {
            schema: "sentinel.policy.v1".into(),
            states: vec![
                StateDef { name: "armed".into(), order: 0, terminal: false },
                StateDef { name: "escalated".into(), order: 1, terminal: false },
                StateDef { name: "released".into(), order: 2, terminal: true },
            ],
            rules: vec![Rule {
                id: "r1".into(),
                description: String::new(),
                when: Predicate {
                    all: vec![PredicateAtom {
                        path: "escalation.stage".into(),
                        op: PredicateOp::StateIs,
                        value: serde_json::json!("armed"),
                    }],
                },
                then: vec![RuleMutation::SetState { to: "escalated".into() }],
                stop: false,
                enabled: true,
                locked: false,
            }],
            plans: BTreeMap::from([(
                "escalated".to_string(),
                Plan {
                    actions: vec![ActionDefinition {
                        id: "notify".into(),
                        adapter: "webhook".into(),
                        template: BTreeMap::new(),
                        enabled: true,
                    }],
                },
            )]),
            constants: Constants { values: BTreeMap::from([("max_failed_attempts".to_string(), serde_json::json!(3))]) },
        }
    }

    #[test]
    fn valid_snapshot_passes() {
        assert!(validate(&base_snapshot(), &["webhook"]).is_ok());
    }

    #[test]
    fn rejects_rule_referencing_unknown_state() {
        let mut snapshot = base_snapshot();
        snapshot.rules[0].when.all[0].value = serde_json::json!("nonexistent");
        assert!(matches!(
            validate(&snapshot, &["webhook"]),
            Err(PolicyError::UnknownStateInRule { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_rule_ids() {
        let mut snapshot = base_snapshot();
        let dup = snapshot.rules[0].clone();
        snapshot.rules.push(dup);
        assert!(matches!(validate(&snapshot, &["webhook"]), Err(PolicyError::DuplicateRuleId(_))));
    }

    #[test]
    fn rejects_locked_rule_disabled() {
        let mut snapshot = base_snapshot();
        snapshot.rules[0].locked = true;
        snapshot.rules[0].enabled = false;
        assert!(matches!(
            validate(&snapshot, &["webhook"]),
            Err(PolicyError::LockedRuleDisabled(_))
        ));
    }

    #[test]
    fn rejects_plan_for_unknown_stage() {
        let mut snapshot = base_snapshot();
        snapshot.plans.insert("ghost_stage".into(), Plan::default());
        assert!(matches!(validate(&snapshot, &["webhook"]), Err(PolicyError::UnknownPlanStage(_))));
    }

    #[test]
    fn rejects_unknown_adapter_name() {
        let snapshot = base_snapshot();
        assert!(matches!(
            validate(&snapshot, &["mock"]),
            Err(PolicyError::UnknownAdapter { .. })
        ));
    }

    #[test]
    fn rejects_rule_referencing_unknown_constant() {
        let mut snapshot = base_snapshot();
        snapshot.rules[0].when.all.push(PredicateAtom {
            path: "constants.nonexistent".into(),
            op: PredicateOp::Gte,
            value: serde_json::json!(1),
        });
        assert!(matches!(
            validate(&snapshot, &["webhook"]),
            Err(PolicyError::UnknownConstantInRule { .. })
        ));
    }

    #[test]
    fn rejects_negative_constant() {
        let mut snapshot = base_snapshot();
        snapshot
            .constants
            .values
            .insert("bad".to_string(), serde_json::json!(-1));
        assert!(matches!(validate(&snapshot, &["webhook"]), Err(PolicyError::NegativeConstant(_))));
    }

    #[test]
    fn load_dir_merges_multiple_files_and_rejects_duplicate_keys() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("states.toml"),
            r#"
            schema = "sentinel.policy.v1"
            [[states]]
            name = "armed"
            order = 0
            "#,
        )
        .unwrap();
        fs::write(
            dir.path().join("states_dup.toml"),
            r#"
            [[states]]
            name = "escalated"
            order = 1
            "#,
        )
        .unwrap();
        let result = load_dir(dir.path(), &["webhook"]);
        assert!(matches!(result, Err(PolicyError::DuplicateTopLevelKey { .. })));
    }
}
