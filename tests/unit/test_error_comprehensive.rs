use regstrategy::core::error::{AppError, EXIT_CODE_CONTEXT_KEY, STDERR_CONTEXT_KEY};
use regstrategy::core::types::{ErrorCategory, ErrorSeverity};

#[test]
fn test_error_creation_all_categories() {
    let categories = vec![
        ErrorCategory::ParseError,
        ErrorCategory::IoError,
        ErrorCategory::KeyNotFound,
        ErrorCategory::InvalidEdgeState,
        ErrorCategory::RegistrationEngineError,
        ErrorCategory::ValidationError,
        ErrorCategory::TimeoutError,
        ErrorCategory::Cancelled,
        ErrorCategory::InternalError,
    ];

    for category in categories {
        let error = AppError::new(category, "test message");
        assert_eq!(error.category, category);
        assert_eq!(error.message, "test message");
        assert!(error.context.is_empty());
        assert!(error.occurred_at <= chrono::Utc::now());
        assert!(error.source.is_none());
        assert!(error.is(category));
    }
}

#[test]
fn test_error_severity_mapping() {
    let test_cases = vec![
        (ErrorCategory::ParseError, ErrorSeverity::Error),
        (ErrorCategory::RegistrationEngineError, ErrorSeverity::Error),
        (ErrorCategory::TimeoutError, ErrorSeverity::Error),
        (ErrorCategory::Cancelled, ErrorSeverity::Warning),
    ];

    for (category, expected_severity) in test_cases {
        let error = AppError::new(category, "test");
        assert_eq!(error.severity(), expected_severity);
    }
}

#[test]
fn test_error_add_context() {
    let mut error = AppError::new(ErrorCategory::InvalidEdgeState, "edge not ready");
    error.add_context("node", "rigid");
    error.add_context("dataset", "hi-3.mhd");

    assert_eq!(error.context.len(), 2);
    let rendered = error.to_string();
    assert!(rendered.contains("(dataset=hi-3.mhd, node=rigid)"));
}

#[test]
fn test_error_code_in_display() {
    let error = AppError::new(ErrorCategory::KeyNotFound, "no such parameter").with_code("RS-KEY-001");
    assert_eq!(
        error.to_string(),
        "[RS-KEY-001] KeyNotFound: no such parameter"
    );
}

#[test]
fn test_engine_failure_keeps_stderr_out_of_context_list() {
    let error = AppError::new(ErrorCategory::RegistrationEngineError, "engine exited with 1")
        .with_context(EXIT_CODE_CONTEXT_KEY, "1")
        .with_context(STDERR_CONTEXT_KEY, "  Too many samples map outside moving image buffer  ");

    let rendered = error.to_string();
    assert!(rendered.contains("(exit_code=1)"));
    assert!(!rendered.contains("stderr="));
    assert!(rendered.contains("engine stderr:\nToo many samples map outside moving image buffer"));
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let error: AppError = io.into();
    assert_eq!(error.category, ErrorCategory::IoError);
    assert_eq!(error.code, "RS-IO-000");
    assert!(error.source.is_some());
}

#[test]
fn test_anyhow_conversion_is_internal() {
    let error: AppError = anyhow::anyhow!("unexpected").into();
    assert_eq!(error.category, ErrorCategory::InternalError);
    assert_eq!(error.message, "unexpected");
}

#[test]
fn test_with_source_is_rendered() {
    let source: Box<dyn std::error::Error + Send + Sync> =
        Box::new(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
    let error = AppError::with_source(ErrorCategory::IoError, "write failed", source);
    assert!(error.to_string().contains("Caused by: disk full"));
}
