//! Typed errors at the seams a caller (the CLI's exit code, `doctor`'s
//! diagnostics) must branch on. Everything else — adapter I/O,
//! filesystem races — is propagated as `anyhow::Error` with
//! `.context(...)` breadcrumbs instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("policy error: {0}")]
    Policy(#[from] sentinel_policy::PolicyError),

    #[error("state error: {0}")]
    State(#[from] sentinel_state::StateError),

    #[error("lock error: {0}")]
    Lock(#[from] sentinel_lock::LockError),

    #[error("rules for stage(s) {targets:?} fired conflicting set_state mutations in one tick")]
    ConflictingStateTransition { targets: Vec<String> },

    #[error("state document failed to round-trip through JSON after mutation: {0}")]
    StateEncoding(serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
