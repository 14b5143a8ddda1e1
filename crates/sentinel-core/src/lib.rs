//! Core library behind the `sentinel` CLI.
//!
//! This crate owns the tick engine: the deterministic rule/state
//! evaluator, the adapter fan-out executor, and the release-trigger
//! protocol. Everything here is storage- and transport-agnostic except
//! for the concrete `sentinel-state`/`sentinel-lock`/`sentinel-events`
//! crates the orchestrator composes — a caller that wants a different
//! persistence backend can use the phase modules directly instead of
//! [`orchestrator::run_tick`].

pub mod action_selector;
pub mod clock;
pub mod error;
pub mod executor;
pub mod facts;
pub mod mutation;
pub mod orchestrator;
pub mod predicate;
pub mod release;
pub mod reliability;
pub mod reporter;
pub mod rule_engine;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::CoreError;
pub use orchestrator::{run_tick, Command, TickOutcome, TickRequest};
pub use release::{ReleaseRequest, ReleaseScope, SecretOutcome};
pub use reporter::{NullReporter, Reporter};
