//! Core domain types for the continuity orchestrator.
//!
//! This crate defines the fundamental data structures shared by every
//! other crate in the workspace:
//! - [`StateDocument`] — the single persisted record a tick reads and writes.
//! - [`PolicySnapshot`] — the immutable, validated policy for one tick.
//! - [`Receipt`] — the outcome of one adapter invocation.
//! - [`AuditEvent`] — one line of the append-only audit ledger.
//!
//! Field names on [`StateDocument`] and [`AuditEvent`] are normative:
//! they are persisted as JSON and read back by later ticks, so renaming
//! a field is a schema change.

mod audit;
mod error;
mod policy;
mod receipt;
mod state;

pub use audit::{AuditEvent, AuditEventPayload};
pub use error::ErrorReason;
pub use policy::{
    ActionDefinition, Constants, Plan, PolicySnapshot, Predicate, PredicateAtom, PredicateOp,
    Rule, RuleMutation, StateDef,
};
pub use receipt::{Receipt, ReceiptKind};
pub use state::{
    ActionsSection, EscalationSection, IdempotencyKey, MetaSection, ReleaseSection,
    RenewalSection, RetryQueueEntry, RoutingSection, StateDocument,
};

pub use sentinel_schema::SchemaVersion;

/// Current schema version this binary writes for state documents.
pub const STATE_SCHEMA_VERSION: u32 = 1;
/// Oldest state-document schema version this binary can load.
pub const STATE_SCHEMA_MIN_SUPPORTED: u32 = 1;

/// Current schema version this binary writes for policy snapshots.
pub const POLICY_SCHEMA_VERSION: u32 = 1;
/// Oldest policy schema version this binary can load.
pub const POLICY_SCHEMA_MIN_SUPPORTED: u32 = 1;
