//! Line-delimited JSON-RPC 2.0 transport over a child's standard streams.
//!
//! Layers, leaves first:
//! - `codec`: newline framing for [`FramedRead`](tokio_util::codec::FramedRead)
//!   and [`FramedWrite`](tokio_util::codec::FramedWrite).
//! - `message`: outgoing [`Message`](message::Message) and the
//!   parse-then-classify [`Inbound`](message::Inbound).
//! - `history`: bounded ring buffers of raw stdout and stderr lines.
//! - `writer`: single-writer line sink over stdin.
//! - `correlator`: pending table with per-id wake-up.
//! - `reader`: the stdout and stderr reader tasks.
//! - `policy`: deadline-extension decisions.
//! - `process`: spawning and stopping the server process.
//! - `orchestrator`: send, wait, extend, report.

pub mod codec;
pub mod correlator;
pub mod history;
pub mod message;
pub mod orchestrator;
pub mod policy;
pub mod process;
pub mod reader;
pub mod writer;
