//! Deadline-extension policies.
//!
//! When an extendable call hits its deadline the orchestrator asks a
//! [`DeadlinePolicy`] what to do. The policy runs on the caller's task, so
//! it may take as long as it needs (a human answering a prompt) while the
//! reader tasks keep draining both streams.

use std::future::Future;
use std::io::{BufRead, Write};
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use crate::rpc::message::RequestId;

/// What to do after a deadline passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionDecision {
    /// Keep waiting for another extension window, without resending.
    Extend,
    /// Stop waiting; the call ends as abandoned.
    Decline,
    /// No extension budget left; the call ends as timed out.
    Exhausted,
}

/// Facts handed to a policy when a deadline passes.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutContext<'a> {
    /// Request id.
    pub id: RequestId,
    /// Request method.
    pub method: &'a str,
    /// Time since the request was written.
    pub elapsed: Duration,
    /// Extensions granted so far for this call.
    pub extensions: u32,
    /// Length of the window a new extension would grant.
    pub window: Duration,
}

/// Pluggable "extend or not" decision.
pub trait DeadlinePolicy: Send + Sync {
    /// Decide whether to keep waiting.
    fn decide<'a>(
        &'a self,
        ctx: TimeoutContext<'a>,
    ) -> Pin<Box<dyn Future<Output = ExtensionDecision> + Send + 'a>>;
}

/// Never extends; every extendable call times out at its first deadline.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExtension;

impl DeadlinePolicy for NoExtension {
    fn decide<'a>(
        &'a self,
        _ctx: TimeoutContext<'a>,
    ) -> Pin<Box<dyn Future<Output = ExtensionDecision> + Send + 'a>> {
        Box::pin(async { ExtensionDecision::Exhausted })
    }
}

/// Extends up to a fixed number of times, then reports exhaustion.
#[derive(Debug, Clone, Copy)]
pub struct ExtendUpTo {
    max_extensions: u32,
}

impl ExtendUpTo {
    /// Allow at most `max_extensions` extensions per call.
    #[must_use]
    pub fn new(max_extensions: u32) -> Self {
        Self { max_extensions }
    }
}

impl DeadlinePolicy for ExtendUpTo {
    fn decide<'a>(
        &'a self,
        ctx: TimeoutContext<'a>,
    ) -> Pin<Box<dyn Future<Output = ExtensionDecision> + Send + 'a>> {
        let decision = if ctx.extensions < self.max_extensions {
            ExtensionDecision::Extend
        } else {
            ExtensionDecision::Exhausted
        };
        Box::pin(async move { decision })
    }
}

/// Asks on the terminal: `Wait 30s more? [Y/n]`.
///
/// Empty input, `y` and `yes` extend; any other answer declines. When stdin
/// is closed there is nobody to consent, so the call times out.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl DeadlinePolicy for TerminalPrompt {
    fn decide<'a>(
        &'a self,
        ctx: TimeoutContext<'a>,
    ) -> Pin<Box<dyn Future<Output = ExtensionDecision> + Send + 'a>> {
        let question = format!(
            "Timed out waiting for {} (id={}) after {:.1}s. Wait {}s more? [Y/n]: ",
            ctx.method,
            ctx.id,
            ctx.elapsed.as_secs_f64(),
            ctx.window.as_secs()
        );
        Box::pin(async move {
            let answer = tokio::task::spawn_blocking(move || {
                let mut stderr = std::io::stderr();
                // The prompt is best effort; a closed stderr still lets us read.
                let _ = write!(stderr, "{question}");
                let _ = stderr.flush();

                let mut line = String::new();
                match std::io::stdin().lock().read_line(&mut line) {
                    Ok(0) | Err(_) => None,
                    Ok(_) => Some(line),
                }
            })
            .await
            .ok()
            .flatten();

            match answer {
                Some(line) => parse_answer(&line),
                None => {
                    debug!("terminal prompt: stdin closed, not extending");
                    ExtensionDecision::Exhausted
                }
            }
        })
    }
}

/// Map a `[Y/n]` answer to a decision.
#[must_use]
pub fn parse_answer(answer: &str) -> ExtensionDecision {
    match answer.trim().to_ascii_lowercase().as_str() {
        "" | "y" | "yes" => ExtensionDecision::Extend,
        _ => ExtensionDecision::Decline,
    }
}
