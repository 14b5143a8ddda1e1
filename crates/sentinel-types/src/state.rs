use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sentinel_breaker::CircuitBreaker;
use sentinel_duration::Minutes;
use serde::{Deserialize, Serialize};

use crate::SchemaVersion;

/// The single persisted record a tick reads at the start and writes at
/// the end. Every field here is normative on-disk shape; see the crate
/// doc comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    pub meta: MetaSection,
    pub timer: TimerSection,
    pub escalation: EscalationSection,
    pub renewal: RenewalSection,
    pub release: ReleaseSection,
    pub actions: ActionsSection,
    pub routing: RoutingSection,
    #[serde(default)]
    pub retry_queue: Vec<RetryQueueEntry>,
    /// Per-adapter circuit breaker state, keyed by adapter name.
    /// Persisted alongside the retry queue so an `open` breaker
    /// survives a process restart between ticks.
    #[serde(default)]
    pub breakers: BTreeMap<String, CircuitBreaker>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaSection {
    pub project_id: String,
    pub schema: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MetaSection {
    pub fn schema_version(&self) -> Result<SchemaVersion, sentinel_schema::SchemaError> {
        SchemaVersion::parse_checked(&self.schema, "sentinel", "state")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimerSection {
    pub deadline: DateTime<Utc>,
    pub grace_minutes: Minutes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationSection {
    pub stage: String,
    pub stage_entered_at: DateTime<Utc>,
    pub previous_stage: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenewalSection {
    pub last_renewal_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub renewed_this_tick: bool,
    #[serde(default)]
    pub failed_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseSection {
    #[serde(default)]
    pub triggered: bool,
    pub trigger_time: Option<DateTime<Utc>>,
    pub execute_after: Option<DateTime<Utc>>,
    pub target_stage: Option<String>,
    pub nonce: Option<String>,
}

impl Default for ReleaseSection {
    fn default() -> Self {
        Self {
            triggered: false,
            trigger_time: None,
            execute_after: None,
            target_stage: None,
            nonce: None,
        }
    }
}

/// `(stage, action_id, stage_entered_at)` — at-most-once key for a
/// single action execution. Stored as a string since it's a JSON map
/// key; [`IdempotencyKey::render`] is the one place that format lives.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IdempotencyKey {
    pub stage: String,
    pub action_id: String,
    pub stage_entered_at: DateTime<Utc>,
}

impl IdempotencyKey {
    pub fn render(&self) -> String {
        format!(
            "{}::{}::{}",
            self.stage,
            self.action_id,
            self.stage_entered_at.to_rfc3339()
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionsSection {
    /// Keyed by [`IdempotencyKey::render`]; value is the UTC timestamp
    /// the action was recorded as executed.
    #[serde(default)]
    pub executed: BTreeMap<String, DateTime<Utc>>,
}

impl ActionsSection {
    pub fn has_executed(&self, key: &IdempotencyKey) -> bool {
        self.executed.contains_key(&key.render())
    }

    pub fn record(&mut self, key: &IdempotencyKey, at: DateTime<Utc>) {
        self.executed.insert(key.render(), at);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingSection {
    #[serde(default)]
    pub addresses: BTreeMap<String, String>,
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
}

/// One pending retry, persisted alongside state so a crashed process
/// doesn't lose in-flight backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryQueueEntry {
    pub adapter: String,
    pub stage: String,
    pub action_id: String,
    pub attempt: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
}
