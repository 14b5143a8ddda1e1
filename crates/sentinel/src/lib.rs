//! # Sentinel
//!
//! A dead-man's-switch continuity orchestrator for Rust workspaces and
//! services: a renewable countdown, policy-driven escalation, and a
//! signed release protocol, run one tick at a time.
//!
//! This crate re-exports the microcrates that make up the engine under
//! one name, for embedders who want `sentinel::core::run_tick` instead
//! of depending on each `sentinel-*` crate individually. The
//! `sentinel-cli` binary is the reference caller.
//!
//! ## Pipeline
//!
//! A tick is **load -> evaluate -> resolve renewal/release -> drain
//! retries -> evaluate rules -> select and execute actions -> persist
//! -> release lock**, all under an exclusive file lock so two ticks
//! against the same project never interleave:
//!
//! 1. [`core::Clock`] samples the current time.
//! 2. [`core`]'s facts/release/reliability modules resolve renewal,
//!    release, retries, and breaker state against the loaded
//!    [`types::StateDocument`].
//! 3. [`core`]'s rule engine evaluates the loaded [`types::PolicySnapshot`]
//!    against those facts and pools the resulting mutations.
//! 4. [`core`]'s action selector and executor run due actions through
//!    [`adapters::AdapterRegistry`].
//! 5. [`state::StateStore`] persists the result; [`events::EventLog`]
//!    appends the tick's audit trail.
//!
//! ## Modules
//!
//! - [`core`] — clock, rule engine, action selector, executor, release
//!   protocol, and [`core::run_tick`], the tick orchestrator.
//! - [`types`] — domain types: state document, policy snapshot, audit
//!   events, receipts.
//! - [`state`] — state document persistence.
//! - [`events`] — append-only JSONL audit event log.
//! - [`policy`] — policy file loading and validation.
//! - [`lock`] — exclusive file lock preventing concurrent ticks.
//! - [`auth`] — release secret resolution (env var or secrets file).
//! - [`adapters`] — the adapter trait, registry, and mock adapter.
//! - [`webhook`] — the webhook adapter.
//! - [`retry`] — retry/backoff strategy.
//! - [`breaker`] — per-adapter circuit breaker.

pub use sentinel_adapters as adapters;
pub use sentinel_auth as auth;
pub use sentinel_breaker as breaker;
pub use sentinel_core as core;
pub use sentinel_events as events;
pub use sentinel_lock as lock;
pub use sentinel_policy as policy;
pub use sentinel_retry as retry;
pub use sentinel_state as state;
pub use sentinel_types as types;
pub use sentinel_webhook as webhook;

pub use sentinel_core::{run_tick, Clock, Command, CoreError, SystemClock, TickOutcome, TickRequest};
