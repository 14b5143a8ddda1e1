use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::ErrorReason;

/// One line of the append-only audit ledger. Serialized as a single
/// JSON object per line (JSONL); never rewritten, only appended.
///
/// `event_id` and `ts_iso` are mandatory, normative field names: a
/// consumer diffing ledgers across projects depends on them meaning
/// the same thing everywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub project_id: String,
    pub tick_id: String,
    pub ts_iso: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: AuditEventPayload,
}

/// The kinds of thing a tick can record. Tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventPayload {
    TickStarted,
    TickCompleted {
        duration_ms: u64,
    },
    TickFailed {
        error: String,
    },
    /// A tick that stopped before Phase 7 and wrote no state. `reason`
    /// is a short human-readable cause, not an `ErrorReason` — nothing
    /// here was an adapter outcome.
    TickAborted {
        reason: String,
    },
    LockAcquired {
        hostname: String,
    },
    LockContended {
        holder_tick_id: String,
        holder_hostname: String,
    },
    StateLoaded {
        schema: String,
    },
    PolicyLoaded {
        schema: String,
    },
    RuleFired {
        rule_id: String,
        from_stage: String,
        to_stage: Option<String>,
    },
    StageEntered {
        stage: String,
        previous_stage: Option<String>,
    },
    /// Recorded immediately before the adapter is actually invoked, so
    /// a crash mid-call still leaves a trace that the attempt happened.
    ActionAttempt {
        adapter: String,
        action_id: String,
    },
    /// The matching outcome for an `action_attempt`, recorded once the
    /// call (or short-circuit) returns a [`crate::Receipt`].
    ActionReceipt {
        adapter: String,
        action_id: String,
        reason: Option<ErrorReason>,
    },
    ActionSkippedIdempotent {
        adapter: String,
        action_id: String,
    },
    RetryScheduled {
        adapter: String,
        action_id: String,
        attempt: u32,
        next_attempt_at: DateTime<Utc>,
    },
    ActionDropped {
        adapter: String,
        action_id: String,
        attempt: u32,
    },
    BreakerOpened {
        adapter: String,
    },
    RenewalAccepted,
    RenewalRejected {
        failed_attempts: u32,
    },
    ReleaseTriggered {
        target_stage: String,
        execute_after: Option<DateTime<Utc>>,
    },
    /// A release command rejected by the same secret/lockout path a
    /// renewal would use, kept distinct from `renewal_rejected` so the
    /// ledger can tell which command was at fault.
    ReleaseRejected {
        failed_attempts: u32,
    },
    /// A previously-armed release that reached its `execute_after` and
    /// actually transitioned the stage this tick.
    ReleaseExecuted {
        stage: String,
    },
    /// Operator-triggered wipe of a project's state back to its initial
    /// document. Not produced by any tick phase today; reserved for the
    /// `factory-reset` operator command.
    FactoryReset,
}

impl AuditEvent {
    pub fn new(
        project_id: impl Into<String>,
        tick_id: impl Into<String>,
        ts_iso: DateTime<Utc>,
        payload: AuditEventPayload,
    ) -> Self {
        Self {
            event_id: generate_event_id(),
            project_id: project_id.into(),
            tick_id: tick_id.into(),
            ts_iso,
            payload,
        }
    }

    pub fn to_jsonl(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn generate_event_id() -> String {
    let mut bytes = [0_u8; 8];
    rand::rng().fill_bytes(&mut bytes);
    format!("evt-{}", hex::encode(bytes))
}
