//! Atomic persistence for the continuity orchestrator's state document.
//!
//! A tick loads the state document once at the start, mutates an
//! in-memory copy through the rule engine, and saves it once at the
//! end via write-tmp-then-rename so a crash never leaves a torn file
//! on disk.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sentinel_schema::SchemaError;
use sentinel_types::{StateDocument, STATE_SCHEMA_MIN_SUPPORTED, STATE_SCHEMA_VERSION};
use thiserror::Error;

/// Default state file name within a project's data directory.
pub const STATE_FILE: &str = "state.json";

pub fn state_path(state_dir: &Path) -> PathBuf {
    state_dir.join(STATE_FILE)
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state file not found: {0}")]
    NotFound(PathBuf),
    #[error("state file {path} has unsupported schema: {source}")]
    UnsupportedSchema { path: PathBuf, #[source] source: SchemaError },
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// Persistent store for one project's state document.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_path(state_dir),
        }
    }

    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Write `doc` to disk atomically: serialize to a sibling `.tmp`
    /// file, then rename over the real path.
    pub fn save(&self, doc: &StateDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create state dir {}", parent.display()))?;
        }

        let tmp_path = self.path.with_extension("tmp");

        let json =
            serde_json::to_string_pretty(doc).context("failed to serialize state document")?;

        fs::write(&tmp_path, json)
            .with_context(|| format!("failed to write state file {}", tmp_path.display()))?;

        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to rename state file to {}", self.path.display()))?;

        Ok(())
    }

    /// Load and validate the schema tag of the state document at this
    /// store's path.
    pub fn load(&self) -> Result<StateDocument, StateError> {
        if !self.path.exists() {
            return Err(StateError::NotFound(self.path.clone()));
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read state file {}", self.path.display()))
            .map_err(StateError::Io)?;

        let doc: StateDocument = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse state JSON from {}", self.path.display()))
            .map_err(StateError::Io)?;

        doc.meta
            .schema_version()
            .map_err(|source| StateError::UnsupportedSchema { path: self.path.clone(), source })?
            .is_supported(STATE_SCHEMA_MIN_SUPPORTED, STATE_SCHEMA_VERSION)
            .then_some(())
            .ok_or_else(|| StateError::UnsupportedSchema {
                path: self.path.clone(),
                source: SchemaError::Unsupported {
                    found: doc.meta.schema_version().map(|v| v.version()).unwrap_or_default(),
                    min: STATE_SCHEMA_MIN_SUPPORTED,
                    max: STATE_SCHEMA_VERSION,
                },
            })?;

        Ok(doc)
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sentinel_types::{
        ActionsSection, EscalationSection, MetaSection, ReleaseSection, RenewalSection,
        RoutingSection, TimerSection,
    };
    use sentinel_duration::Minutes;
    use tempfile::tempdir;

    fn sample_doc() -> StateDocument {
        let now = Utc::now();
        StateDocument {
            meta: MetaSection {
                project_id: "proj-1".into(),
                schema: "sentinel.state.v1".into(),
                created_at: now,
                updated_at: now,
            },
            timer: TimerSection { deadline: now, grace_minutes: Minutes(60) },
            escalation: EscalationSection {
                stage: "armed".into(),
                stage_entered_at: now,
                previous_stage: None,
            },
            renewal: RenewalSection { last_renewal_at: None, renewed_this_tick: false, failed_attempts: 0 },
            release: ReleaseSection::default(),
            actions: ActionsSection::default(),
            routing: RoutingSection::default(),
            retry_queue: Vec::new(),
            breakers: std::collections::BTreeMap::new(),
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let doc = sample_doc();
        store.save(&doc).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.meta.project_id, doc.meta.project_id);
    }

    #[test]
    fn load_missing_file_errors() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        assert!(matches!(store.load(), Err(StateError::NotFound(_))));
    }

    #[test]
    fn load_rejects_unsupported_schema() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let mut doc = sample_doc();
        doc.meta.schema = "sentinel.state.v99".into();
        store.save(&doc).unwrap();
        assert!(matches!(store.load(), Err(StateError::UnsupportedSchema { .. })));
    }

    #[test]
    fn save_never_leaves_a_tmp_file_behind() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store.save(&sample_doc()).unwrap();
        assert!(!store.path().with_extension("tmp").exists());
        assert!(store.exists());
    }
}
