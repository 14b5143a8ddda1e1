use serde::{Deserialize, Serialize};

/// The fixed error taxonomy surfaced as a receipt `reason` or an audit
/// event's `error` field. Every adapter failure is classified into one
/// of these; nothing else is a valid `reason` for a non-`ok` receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    /// Adapter disabled; reported once per tick.
    NotConfigured,
    /// Global mock flag set; adapter short-circuited.
    MockMode,
    /// Template or routing data malformed.
    InvalidArgument,
    /// Breaker refused the call.
    CircuitOpen,
    /// Adapter exceeded its per-call budget.
    Timeout,
    /// Upstream signalled throttling; retried.
    RateLimited,
    /// Non-retryable upstream response (4xx non-429).
    UpstreamError,
    /// Retryable upstream response (5xx, network).
    TransientError,
    /// Adapter raised an uncaught error.
    AdapterException,
    /// Tick cancellation observed during the call.
    Cancelled,
    /// Renewal/release rejected: failed_attempts at or above max_failed.
    LockedOut,
}

impl ErrorReason {
    /// Whether a receipt carrying this reason should be pushed to the
    /// retry queue. Only the two upstream-failure-shaped reasons are
    /// retried; everything else is either permanent or already handled
    /// by a different path (breaker, lockout).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorReason::TransientError | ErrorReason::RateLimited)
    }
}

impl std::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorReason::NotConfigured => "not_configured",
            ErrorReason::MockMode => "mock_mode",
            ErrorReason::InvalidArgument => "invalid_argument",
            ErrorReason::CircuitOpen => "circuit_open",
            ErrorReason::Timeout => "timeout",
            ErrorReason::RateLimited => "rate_limited",
            ErrorReason::UpstreamError => "upstream_error",
            ErrorReason::TransientError => "transient_error",
            ErrorReason::AdapterException => "adapter_exception",
            ErrorReason::Cancelled => "cancelled",
            ErrorReason::LockedOut => "locked_out",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_and_rate_limited_are_retryable() {
        assert!(ErrorReason::TransientError.is_retryable());
        assert!(ErrorReason::RateLimited.is_retryable());
        assert!(!ErrorReason::UpstreamError.is_retryable());
        assert!(!ErrorReason::NotConfigured.is_retryable());
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&ErrorReason::CircuitOpen).unwrap();
        assert_eq!(json, "\"circuit_open\"");
    }
}
