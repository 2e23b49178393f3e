//! Unit tests for lifecycle error types.

use std::path::PathBuf;
use std::sync::Arc;

use rstest::rstest;

use super::*;

#[test]
fn install_error_exposes_fetch_cause() {
    let error = InstallError::FetchFailed {
        id: PluginId::new("p1"),
        source: FetchError::SourceUnreachable {
            source_url: "https://example.com/repo".into(),
            message: "connection refused".into(),
        },
    };
    let message = error.to_string();
    assert!(message.contains("p1"), "expected id in message: {message}");
    let cause = std::error::Error::source(&error).expect("install error has a cause");
    assert!(cause.to_string().contains("connection refused"));
}

#[rstest]
#[case::not_enabled(ExecutionError::NotEnabled { id: PluginId::new("p1") }, "not enabled")]
#[case::not_active(ExecutionError::NotActive { id: PluginId::new("p1") }, "not active")]
#[case::invalid_token(ExecutionError::InvalidToken { id: PluginId::new("p1") }, "blank")]
#[case::start_failed(
    ExecutionError::StartFailed { id: PluginId::new("p1"), message: "timed out".into() },
    "timed out"
)]
fn execution_error_messages(#[case] error: ExecutionError, #[case] expected: &str) {
    let message = error.to_string();
    assert!(
        message.contains(expected),
        "expected '{expected}' in message: {message}"
    );
}

#[test]
fn store_error_converts_into_execution_error() {
    let store = StoreError::Io {
        path: PathBuf::from("/data/db/plugins.json"),
        source: Arc::new(std::io::Error::other("disk full")),
    };
    let error = ExecutionError::from(store);
    assert!(error.to_string().contains("disk full"));
}

#[test]
fn errors_are_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<InstallError>();
    assert_send_sync::<ExecutionError>();
    assert_send_sync::<ServiceError>();
}

#[test]
fn resolve_error_names_the_kind() {
    let error = ResolveError::NoProvider {
        kind: ServiceKind::Native,
    };
    assert!(error.to_string().contains("native"));
}
