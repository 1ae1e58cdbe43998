//! Unit tests for the bounded history buffers.

use std::sync::Arc;

use mcp_inspector::rpc::history::{
    Histories, HistoryBuffer, HistorySnapshot, DEFAULT_HISTORY_CAPACITY,
};

#[test]
fn default_capacity_is_one_thousand() {
    assert_eq!(DEFAULT_HISTORY_CAPACITY, 1000);
}

/// After N appends into capacity C the buffer holds the last min(N, C)
/// lines in arrival order.
#[test]
fn retains_last_capacity_lines_in_order() {
    let buffer = HistoryBuffer::new(3);
    for i in 0..10 {
        buffer.push(format!("line {i}"));
    }

    assert_eq!(buffer.len(), 3);
    assert_eq!(buffer.snapshot(), vec!["line 7", "line 8", "line 9"]);
}

#[test]
fn below_capacity_keeps_everything() {
    let buffer = HistoryBuffer::new(5);
    buffer.push("a");
    buffer.push("b");

    assert_eq!(buffer.snapshot(), vec!["a", "b"]);
}

#[test]
fn tail_returns_most_recent_lines_oldest_first() {
    let buffer = HistoryBuffer::new(10);
    for line in ["a", "b", "c", "d"] {
        buffer.push(line);
    }

    assert_eq!(buffer.tail(2), vec!["c", "d"]);
    assert!(buffer.tail(0).is_empty());
}

/// Snapshots are copies; later appends do not change them.
#[test]
fn snapshot_is_detached_from_buffer() {
    let buffer = HistoryBuffer::new(4);
    buffer.push("before");
    let snapshot = buffer.snapshot();
    buffer.push("after");

    assert_eq!(snapshot, vec!["before"]);
    assert_eq!(buffer.len(), 2);
}

#[test]
fn histories_share_capacity_but_not_lines() {
    let histories = Histories::new(2);
    histories.replies.push("{\"id\":1}");
    histories.diagnostics.push("warming up");

    let snapshot = HistorySnapshot::from(&histories);
    assert_eq!(snapshot.replies, vec!["{\"id\":1}"]);
    assert_eq!(snapshot.diagnostics, vec!["warming up"]);
    assert_eq!(histories.replies.capacity(), 2);
    assert_eq!(histories.diagnostics.capacity(), 2);
}

/// Appends from several threads never lose the bound.
#[test]
fn concurrent_pushes_respect_capacity() {
    let buffer = Arc::new(HistoryBuffer::new(50));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                for i in 0..100 {
                    buffer.push(format!("{t}-{i}"));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("pusher thread");
    }

    assert_eq!(buffer.len(), 50);
}
