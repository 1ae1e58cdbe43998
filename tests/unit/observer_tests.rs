//! Unit tests for observers: fan-out and the JSONL session log.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};

use mcp_inspector::observer::session_log::SessionLog;
use mcp_inspector::observer::{
    Fanout, NullObserver, Observer, OutcomeKind, OutcomeReport, StreamKind, TracingObserver,
};
use mcp_inspector::rpc::message::{Inbound, Message};

#[derive(Default)]
struct Counting {
    lines: Mutex<Vec<String>>,
}

impl Observer for Counting {
    fn reply_line(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_owned());
    }
}

fn report(kind: OutcomeKind) -> OutcomeReport {
    OutcomeReport {
        id: 3,
        method: "tools/list".into(),
        kind,
        extensions: 1,
        elapsed: Duration::from_millis(1500),
        at: Utc::now(),
        detail: None,
    }
}

fn read_entries(log: &SessionLog) -> Vec<Value> {
    std::fs::read_to_string(log.path())
        .expect("read session log")
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line is JSON"))
        .collect()
}

#[test]
fn outcome_kind_display_is_snake_case() {
    assert_eq!(OutcomeKind::ProtocolError.to_string(), "protocol_error");
    assert_eq!(OutcomeKind::TimedOut.to_string(), "timed_out");
    assert_eq!(
        serde_json::to_value(OutcomeKind::Abandoned).expect("serialise"),
        json!("abandoned")
    );
}

#[test]
fn fanout_forwards_to_every_observer() {
    let first = Arc::new(Counting::default());
    let second = Arc::new(Counting::default());
    let fanout = Fanout::new()
        .with(first.clone())
        .with(Arc::new(NullObserver))
        .with(second.clone());

    fanout.reply_line("{\"id\":1}");

    assert_eq!(first.lines.lock().unwrap().as_slice(), ["{\"id\":1}"]);
    assert_eq!(second.lines.lock().unwrap().as_slice(), ["{\"id\":1}"]);
}

#[test]
fn session_log_file_name_has_timestamp() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = SessionLog::create(dir.path(), "weather").expect("create log");

    let name = log
        .path()
        .file_name()
        .and_then(|n| n.to_str())
        .expect("file name");
    assert!(name.starts_with("session-"), "{name}");
    assert!(
        std::path::Path::new(name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("jsonl")),
        "{name}"
    );
    // session-YYYYMMDD-HHMMSS.jsonl
    assert_eq!(name.len(), "session-20240101-000000.jsonl".len());
}

#[test]
fn session_log_creates_missing_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let nested = dir.path().join("a").join("b");

    let log = SessionLog::create(&nested, "srv").expect("create log");
    assert!(log.path().starts_with(&nested));
}

#[test]
fn session_log_writes_one_entry_per_event() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = SessionLog::create(dir.path(), "weather").expect("create log");

    log.outgoing(&Message::request(1, "initialize", Some(json!({}))));
    log.reply_line("{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}");
    log.diagnostic_line("server starting");
    log.unhandled(&Inbound::Notification {
        method: "notifications/message".into(),
        params: Value::Null,
    });
    log.extension(1, "initialize", Duration::from_secs(30));
    log.outcome(&report(OutcomeKind::Resolved));

    let entries = read_entries(&log);
    let kinds: Vec<&str> = entries
        .iter()
        .map(|e| e["kind"].as_str().expect("kind"))
        .collect();
    assert_eq!(
        kinds,
        vec!["outgoing", "stdout", "stderr", "unhandled", "extension", "outcome"]
    );
    assert!(entries.iter().all(|e| e["server"] == "weather"));
    assert_eq!(entries[0]["payload"]["method"], "initialize");
    assert_eq!(entries[2]["line"], "server starting");
    assert_eq!(entries[3]["payload"]["kind"], "notification");
    assert_eq!(entries[4]["payload"]["window_ms"], 30_000);
    assert_eq!(entries[5]["payload"]["kind"], "resolved");
}

#[test]
fn set_server_retags_later_entries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = SessionLog::create(dir.path(), "first").expect("create log");

    log.diagnostic_line("one");
    log.set_server("second");
    log.diagnostic_line("two");

    let entries = read_entries(&log);
    assert_eq!(entries[0]["server"], "first");
    assert_eq!(entries[1]["server"], "second");
}

#[test]
fn truncated_lines_are_logged_with_stream_and_limit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = SessionLog::create(dir.path(), "weather").expect("create log");

    log.line_truncated(StreamKind::Stdout, 64);

    let entries = read_entries(&log);
    assert_eq!(entries[0]["kind"], "truncated");
    assert_eq!(entries[0]["payload"]["stream"], "stdout");
    assert_eq!(entries[0]["payload"]["limit"], 64);
    assert_eq!(StreamKind::Stderr.to_string(), "stderr");
}

/// A server switch reaching the fan-out retags every observer behind it.
#[test]
fn server_change_retags_through_fanout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = Arc::new(SessionLog::create(dir.path(), "alpha").expect("create log"));
    let tracing = Arc::new(TracingObserver::new("alpha"));
    let fanout = Fanout::new().with(log.clone()).with(tracing.clone());

    fanout.diagnostic_line("before");
    fanout.server_changed("beta");
    fanout.diagnostic_line("after");

    let entries = read_entries(&log);
    assert_eq!(entries[0]["server"], "alpha");
    assert_eq!(entries[1]["server"], "beta");
    assert_eq!(tracing.server(), "beta");
}
