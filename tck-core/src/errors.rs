//! Error types for the TCK.
//!
//! One enum covers the whole taxonomy: state machine violations, lookups,
//! validation, waits and networked exchanges. Manager, client, endpoint and
//! pipeline operations all return `Result<T, TckError>`, so negative tests
//! become a match on the error instead of catching a panic.
//!
//! ## Status mapping
//! Every error classifies into a [`FailureKind`], which maps to the
//! HTTP-style status a callback endpoint answers with.

/// Unified error type for all TCK operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TckError {
    /// Edge not in the state table, or attempted from a terminal state.
    #[error("Illegal state transition from {from} to {to}. To state must be one of {allowed}.")]
    IllegalTransition {
        from: String,
        to: String,
        allowed: String,
    },

    /// Correlation id required before entering the given state.
    #[error("Correlation id not set: required before transitioning to {0}")]
    MissingCorrelationId(String),

    /// Lookup by id failed.
    #[error("{kind} not found for id: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Schema, canonical extraction or data-address predicate mismatch.
    #[error("Validation error: {0}")]
    ValidationFailure(String),

    /// A wait predicate or expectation did not complete within the bound.
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Non-success status returned by a networked exchange.
    #[error("Protocol error ({status}): {message}")]
    Protocol { status: u16, message: String },

    /// Network failure before any status was received.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A scenario expectation did not hold (unexpected success, state mismatch,
    /// unexecuted mock actions).
    #[error("Expectation error: {0}")]
    Expectation(String),
}

impl TckError {
    /// Builds an [`TckError::IllegalTransition`] from display-able states.
    pub fn illegal_transition<S: std::fmt::Display>(from: S, to: S, allowed: &[S]) -> Self {
        let allowed = allowed
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        TckError::IllegalTransition {
            from: from.to_string(),
            to: to.to_string(),
            allowed,
        }
    }

    /// Tagged-result classification of this error.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            TckError::IllegalTransition { .. } => FailureKind::Conflict,
            TckError::MissingCorrelationId(_) | TckError::ValidationFailure(_) => {
                FailureKind::BadRequest
            }
            TckError::NotFound { .. } => FailureKind::NotFound,
            TckError::Protocol { status, .. } => FailureKind::from_status(*status),
            TckError::Timeout(_) | TckError::Transport(_) | TckError::Expectation(_) => {
                FailureKind::General
            }
        }
    }

    /// Returns `true` if the counter-party rejected the operation on protocol
    /// grounds, as opposed to the harness failing to reach it or to observe it.
    ///
    /// Only rejections satisfy a step that declared `expect_error`.
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            TckError::Timeout(_) | TckError::Transport(_) | TckError::Expectation(_)
        )
    }
}

// ── Failure classification (status mapping) ─────────────────────────

/// Classification of a failed operation, mirrored onto response status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    BadRequest,
    Unauthorized,
    NotFound,
    Conflict,
    General,
}

impl FailureKind {
    /// HTTP-style status code for this failure.
    pub fn status_code(self) -> u16 {
        match self {
            FailureKind::BadRequest => 400,
            FailureKind::Unauthorized => 401,
            FailureKind::NotFound => 404,
            FailureKind::Conflict => 409,
            FailureKind::General => 500,
        }
    }

    /// Inverse of [`FailureKind::status_code`]. Unknown codes are `General`.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => FailureKind::BadRequest,
            401 => FailureKind::Unauthorized,
            404 => FailureKind::NotFound,
            409 => FailureKind::Conflict,
            _ => FailureKind::General,
        }
    }
}

/// Status code answered for a successfully handled message.
pub const SUCCESS_STATUS: u16 = 200;

/// Every status code a harness endpoint emits: one success and five failures.
pub const EMITTED_STATUS_CODES: [u16; 6] = [SUCCESS_STATUS, 400, 401, 404, 409, 500];

/// Returns `true` if `status` is one of [`EMITTED_STATUS_CODES`].
pub fn is_emitted_status(status: u16) -> bool {
    EMITTED_STATUS_CODES.contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn illegal_transition_display_lists_allowed_states() {
        let err = TckError::illegal_transition("ACCEPTED", "FINALIZED", &["AGREED", "TERMINATED"]);
        assert_eq!(
            err.to_string(),
            "Illegal state transition from ACCEPTED to FINALIZED. To state must be one of AGREED, TERMINATED."
        );
    }

    #[test]
    fn illegal_transition_from_terminal_has_empty_allowed_list() {
        let err = TckError::illegal_transition("FINALIZED", "TERMINATED", &[]);
        assert_eq!(
            err.to_string(),
            "Illegal state transition from FINALIZED to TERMINATED. To state must be one of ."
        );
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TckError>();
    }

    #[test]
    fn failure_kind_classification() {
        assert_eq!(
            TckError::illegal_transition("A", "B", &[]).failure_kind(),
            FailureKind::Conflict
        );
        assert_eq!(
            TckError::MissingCorrelationId("REQUESTED".into()).failure_kind(),
            FailureKind::BadRequest
        );
        assert_eq!(
            TckError::ValidationFailure("bad".into()).failure_kind(),
            FailureKind::BadRequest
        );
        assert_eq!(
            TckError::NotFound { kind: "Negotiation", id: "1".into() }.failure_kind(),
            FailureKind::NotFound
        );
        assert_eq!(
            TckError::Protocol { status: 401, message: String::new() }.failure_kind(),
            FailureKind::Unauthorized
        );
        assert_eq!(TckError::Timeout("t".into()).failure_kind(), FailureKind::General);
    }

    #[test]
    fn status_codes_round_trip_through_failure_kind() {
        for kind in [
            FailureKind::BadRequest,
            FailureKind::Unauthorized,
            FailureKind::NotFound,
            FailureKind::Conflict,
            FailureKind::General,
        ] {
            assert_eq!(FailureKind::from_status(kind.status_code()), kind);
        }
        assert_eq!(FailureKind::from_status(418), FailureKind::General);
    }

    #[test]
    fn only_protocol_rejections_satisfy_expected_errors() {
        assert!(TckError::illegal_transition("A", "B", &[]).is_rejection());
        assert!(TckError::Protocol { status: 400, message: String::new() }.is_rejection());
        assert!(!TckError::Transport("refused".into()).is_rejection());
        assert!(!TckError::Timeout("late".into()).is_rejection());
        assert!(!TckError::Expectation("mismatch".into()).is_rejection());
    }

    #[test]
    fn emitted_status_registry_all_unique() {
        let mut seen = std::collections::HashSet::new();
        for code in &EMITTED_STATUS_CODES {
            assert!(seen.insert(code), "duplicate status code: {code}");
            assert!(is_emitted_status(*code));
        }
        assert!(!is_emitted_status(418));
    }
}
