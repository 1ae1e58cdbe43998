//! Unit tests for the deadline-extension policies.

use std::time::Duration;

use mcp_inspector::rpc::policy::{
    parse_answer, DeadlinePolicy, ExtendUpTo, ExtensionDecision, NoExtension, TimeoutContext,
};

fn ctx(extensions: u32) -> TimeoutContext<'static> {
    TimeoutContext {
        id: 1,
        method: "initialize",
        elapsed: Duration::from_secs(15),
        extensions,
        window: Duration::from_secs(30),
    }
}

#[tokio::test]
async fn no_extension_is_always_exhausted() {
    let policy = NoExtension;
    assert_eq!(policy.decide(ctx(0)).await, ExtensionDecision::Exhausted);
}

#[tokio::test]
async fn extend_up_to_grants_exactly_the_budget() {
    let policy = ExtendUpTo::new(2);

    assert_eq!(policy.decide(ctx(0)).await, ExtensionDecision::Extend);
    assert_eq!(policy.decide(ctx(1)).await, ExtensionDecision::Extend);
    assert_eq!(policy.decide(ctx(2)).await, ExtensionDecision::Exhausted);
}

#[tokio::test]
async fn zero_budget_never_extends() {
    let policy = ExtendUpTo::new(0);
    assert_eq!(policy.decide(ctx(0)).await, ExtensionDecision::Exhausted);
}

/// `[Y/n]`: blank means yes.
#[test]
fn blank_answer_extends() {
    assert_eq!(parse_answer("\n"), ExtensionDecision::Extend);
}

#[test]
fn yes_is_case_insensitive() {
    assert_eq!(parse_answer("YES\n"), ExtensionDecision::Extend);
    assert_eq!(parse_answer("y"), ExtensionDecision::Extend);
}

#[test]
fn no_declines() {
    assert_eq!(parse_answer("n\n"), ExtensionDecision::Decline);
    assert_eq!(parse_answer("later"), ExtensionDecision::Decline);
}

/// Policies are usable as trait objects.
#[tokio::test]
async fn policies_work_behind_dyn() {
    let policies: Vec<Box<dyn DeadlinePolicy>> =
        vec![Box::new(NoExtension), Box::new(ExtendUpTo::new(1))];
    let mut decisions = Vec::new();
    for policy in &policies {
        decisions.push(policy.decide(ctx(0)).await);
    }
    assert_eq!(
        decisions,
        vec![ExtensionDecision::Exhausted, ExtensionDecision::Extend]
    );
}
