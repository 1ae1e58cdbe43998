//! Unit tests for `AppError` display format and conversions.

use mcp_inspector::AppError;

#[test]
fn display_uses_kind_prefix() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::CommandNotFound("uv".into()), "command not found: uv"),
        (AppError::Spawn("denied".into()), "spawn: denied"),
        (AppError::Write("pipe closed".into()), "write: pipe closed"),
        (AppError::Handshake("timed out".into()), "handshake: timed out"),
        (AppError::Rpc("gave up".into()), "rpc: gave up"),
        (AppError::NotFound("server x".into()), "not found: server x"),
        (AppError::Io("eof".into()), "io: eof"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn error_message_no_trailing_period() {
    let s = AppError::Write("stdin already closed".into()).to_string();
    assert!(!s.ends_with('.'), "error message must not end with a period: {s}");
}

#[test]
fn only_command_not_found_triggers_fallback() {
    assert!(AppError::CommandNotFound("uv".into()).is_command_not_found());
    assert!(!AppError::Spawn("permission denied".into()).is_command_not_found());
}

#[test]
fn json_error_converts_to_config() {
    let err: AppError = serde_json::from_str::<serde_json::Value>("{")
        .expect_err("invalid json")
        .into();
    assert!(err.to_string().starts_with("config: invalid json"));
}

#[test]
fn io_error_converts_to_io() {
    let err: AppError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe").into();
    assert!(matches!(err, AppError::Io(_)));
}

#[test]
fn app_error_is_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    assert_error(&AppError::Rpc("x".into()));
}
