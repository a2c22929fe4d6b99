// Error handling tests

use bqguard::cost::{Pricing, QueryCostEstimate, QueryCostExceeded};
use bqguard::error::{GuardError, RemoteError};

fn refusal() -> GuardError {
    QueryCostExceeded {
        estimate: QueryCostEstimate::from_bytes(12 << 30, &Pricing::default()),
        ceiling_bytes: 10 << 30,
    }
    .into()
}

#[test]
fn test_error_display_messages() {
    let errors = vec![
        GuardError::CostEstimation(RemoteError::new(Some(400), "Syntax error")),
        GuardError::QueryExecution(RemoteError::transport("connection reset")),
        GuardError::InvalidComputeResult {
            type_name: "alloc::vec::Vec<i32>",
            reason: "not a table".to_string(),
        },
        GuardError::RowDecode("bad cell".to_string()),
        GuardError::Auth("no credentials".to_string()),
        GuardError::Config("missing project".to_string()),
        GuardError::InvalidPattern("a/b".to_string()),
        refusal(),
    ];

    for error in errors {
        let display = format!("{}", error);
        assert!(!display.is_empty(), "Error should have display message");
    }
}

#[test]
fn test_refusal_message_carries_figures() {
    let message = refusal().to_string();
    assert!(message.contains("Estimated: 12884901888 bytes"));
    assert!(message.contains("Limit: 10737418240 bytes"));
    assert!(message.contains("USD"));
}

#[test]
fn test_remote_error_includes_status() {
    let error = GuardError::QueryExecution(RemoteError::new(Some(403), "Access Denied"));
    let message = error.to_string();
    assert!(message.contains("HTTP 403"));
    assert!(message.contains("Access Denied"));
}

#[test]
fn test_transient_classification() {
    assert!(GuardError::QueryExecution(RemoteError::new(Some(503), "busy")).is_transient());
    assert!(GuardError::CostEstimation(RemoteError::new(Some(429), "quota")).is_transient());
    assert!(GuardError::QueryExecution(RemoteError::transport("timed out")).is_transient());

    assert!(!GuardError::QueryExecution(RemoteError::new(Some(400), "bad sql")).is_transient());
    assert!(!refusal().is_transient());
    assert!(!GuardError::Config("x".to_string()).is_transient());
}

#[test]
fn test_cost_refusal_detection() {
    assert!(refusal().is_cost_refusal());
    assert!(!GuardError::Auth("x".to_string()).is_cost_refusal());
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let error: GuardError = io.into();
    assert!(matches!(error, GuardError::Io(_)));
}
