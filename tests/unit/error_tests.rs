//! Unit tests for `AppError` display format and HTTP mapping.

use axum::http::StatusCode;
use cm_controller::AppError;

#[test]
fn display_uses_lowercase_class_prefix() {
    assert_eq!(
        AppError::NotFound("no service named 'a'".into()).to_string(),
        "not found: no service named 'a'"
    );
    assert_eq!(
        AppError::PortExhausted("no free port".into()).to_string(),
        "port exhausted: no free port"
    );
    assert!(AppError::StatusChannel("x".into())
        .to_string()
        .starts_with("status channel:"));
}

#[test]
fn daemon_rejection_carries_body_verbatim() {
    let err = AppError::DaemonRejected {
        status: 503,
        body: r#"{"error":"busy"}"#.into(),
    };
    assert_eq!(err.to_string(), r#"daemon rejected (503): {"error":"busy"}"#);
}

#[test]
fn messages_have_no_trailing_period() {
    let errors = [
        AppError::Config("bad".into()),
        AppError::Runtime("docker run failed".into()),
        AppError::DaemonUnreachable("refused".into()),
    ];
    for err in errors {
        let s = err.to_string();
        assert!(!s.ends_with('.'), "error message must not end with a period: {s}");
    }
}

#[test]
fn io_errors_convert_to_io_variant() {
    let err: AppError = std::io::Error::other("disk on fire").into();
    assert!(matches!(err, AppError::Io(_)));
    assert_eq!(err.to_string(), "io: disk on fire");
}

#[test]
fn toml_errors_convert_to_config_variant() {
    let err: AppError = toml::from_str::<toml::Value>("= nope").unwrap_err().into();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn status_codes_follow_error_class() {
    let cases = [
        (AppError::NotFound(String::new()), StatusCode::NOT_FOUND),
        (AppError::DuplicateService(String::new()), StatusCode::CONFLICT),
        (AppError::AlreadyRunning(String::new()), StatusCode::CONFLICT),
        (AppError::InvalidRequest(String::new()), StatusCode::BAD_REQUEST),
        (AppError::DaemonUnreachable(String::new()), StatusCode::BAD_GATEWAY),
        (AppError::Runtime(String::new()), StatusCode::INTERNAL_SERVER_ERROR),
        (AppError::Directory(String::new()), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (err, expected) in cases {
        assert_eq!(err.status_code(), expected, "{err:?}");
    }
}
