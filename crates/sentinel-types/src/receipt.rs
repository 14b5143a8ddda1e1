use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ErrorReason;

/// The outcome of one adapter invocation, returned by `Adapter::execute`
/// and recorded verbatim (after sanitization) into the audit ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub adapter: String,
    pub action_id: String,
    pub kind: ReceiptKind,
    pub reason: Option<ErrorReason>,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl Receipt {
    pub fn ok(adapter: impl Into<String>, action_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            adapter: adapter.into(),
            action_id: action_id.into(),
            kind: ReceiptKind::Ok,
            reason: None,
            detail: None,
            at,
        }
    }

    pub fn failed(
        adapter: impl Into<String>,
        action_id: impl Into<String>,
        reason: ErrorReason,
        detail: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            adapter: adapter.into(),
            action_id: action_id.into(),
            kind: ReceiptKind::Failed,
            reason: Some(reason),
            detail: Some(detail.into()),
            at,
        }
    }

    pub fn skipped(
        adapter: impl Into<String>,
        action_id: impl Into<String>,
        reason: ErrorReason,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            adapter: adapter.into(),
            action_id: action_id.into(),
            kind: ReceiptKind::Skipped,
            reason: Some(reason),
            detail: None,
            at,
        }
    }

    /// A breaker-open short-circuit: same idempotency treatment as
    /// `failed`, but never touches the breaker's own counters.
    pub fn deferred(
        adapter: impl Into<String>,
        action_id: impl Into<String>,
        reason: ErrorReason,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            adapter: adapter.into(),
            action_id: action_id.into(),
            kind: ReceiptKind::Deferred,
            reason: Some(reason),
            detail: None,
            at,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.kind, ReceiptKind::Ok)
    }

    /// Whether this receipt marks the idempotency key as consumed, so
    /// a later tick won't attempt the same action again.
    pub fn consumes_idempotency_key(&self) -> bool {
        matches!(self.kind, ReceiptKind::Ok | ReceiptKind::Skipped)
    }

    /// Whether this receipt should produce a retry-queue entry.
    pub fn should_retry(&self) -> bool {
        matches!(self.kind, ReceiptKind::Failed | ReceiptKind::Deferred)
            && self.reason.is_some_and(|r| r.is_retryable() || matches!(r, ErrorReason::CircuitOpen))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptKind {
    Ok,
    Failed,
    /// Not attempted at all (disabled, mock mode).
    Skipped,
    /// Not attempted because the circuit breaker was open.
    Deferred,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_receipt_has_no_reason() {
        let r = Receipt::ok("webhook", "notify_primary", Utc::now());
        assert!(r.is_ok());
        assert!(r.reason.is_none());
    }

    #[test]
    fn failed_transient_receipt_should_retry() {
        let r = Receipt::failed(
            "webhook",
            "notify_primary",
            ErrorReason::TransientError,
            "connection reset",
            Utc::now(),
        );
        assert!(r.should_retry());
    }

    #[test]
    fn skipped_receipt_never_retries() {
        let r = Receipt::skipped("webhook", "notify_primary", ErrorReason::NotConfigured, Utc::now());
        assert!(!r.should_retry());
    }

    #[test]
    fn failed_non_retryable_reason_does_not_retry() {
        let r = Receipt::failed(
            "webhook",
            "notify_primary",
            ErrorReason::InvalidArgument,
            "bad template",
            Utc::now(),
        );
        assert!(!r.should_retry());
    }

    #[test]
    fn deferred_circuit_open_should_retry_but_not_consume_key() {
        let r = Receipt::deferred("webhook", "notify_primary", ErrorReason::CircuitOpen, Utc::now());
        assert!(r.should_retry());
        assert!(!r.consumes_idempotency_key());
    }

    #[test]
    fn ok_and_skipped_consume_idempotency_key() {
        let ok = Receipt::ok("webhook", "notify_primary", Utc::now());
        let skipped = Receipt::skipped("webhook", "notify_primary", ErrorReason::MockMode, Utc::now());
        assert!(ok.consumes_idempotency_key());
        assert!(skipped.consumes_idempotency_key());
    }
}
