//! Conformance: Emitted Status Registry
//!
//! Callback endpoints answer with exactly these statuses. Each error
//! class must land on its status.

use tck_core::errors::{is_emitted_status, FailureKind, TckError, EMITTED_STATUS_CODES};

#[test]
fn conformance_status_registry_exact_list() {
    assert_eq!(
        EMITTED_STATUS_CODES,
        [200, 400, 401, 404, 409, 500],
        "EMITTED_STATUS_CODES drift"
    );
}

#[test]
fn conformance_status_registry_unique() {
    let mut seen = std::collections::HashSet::new();
    for status in &EMITTED_STATUS_CODES {
        assert!(seen.insert(status), "duplicate status: {status}");
    }
}

#[test]
fn conformance_every_error_maps_to_an_emitted_status() {
    let errors = [
        TckError::illegal_transition("REQUESTED", "FINALIZED", &["OFFERED", "TERMINATED"]),
        TckError::MissingCorrelationId("REQUESTED".to_string()),
        TckError::NotFound {
            kind: "Negotiation",
            id: "x".to_string(),
        },
        TckError::ValidationFailure("bad".to_string()),
        TckError::Timeout("slow".to_string()),
        TckError::Protocol {
            status: 401,
            message: "no".to_string(),
        },
        TckError::Transport("refused".to_string()),
        TckError::Expectation("mismatch".to_string()),
    ];
    for error in &errors {
        let status = error.failure_kind().status_code();
        assert!(is_emitted_status(status), "{error} maps to {status}");
        assert_ne!(status, 200, "{error} must not map to success");
    }
}

#[test]
fn conformance_rejections_by_class() {
    assert_eq!(
        TckError::illegal_transition("A", "B", &[]).failure_kind(),
        FailureKind::Conflict
    );
    assert_eq!(
        TckError::NotFound {
            kind: "Transfer process",
            id: "1".to_string()
        }
        .failure_kind()
        .status_code(),
        404
    );
    assert_eq!(
        TckError::ValidationFailure(String::new()).failure_kind().status_code(),
        400
    );
    assert_eq!(
        TckError::MissingCorrelationId(String::new())
            .failure_kind()
            .status_code(),
        400
    );
}
