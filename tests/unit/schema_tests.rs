//! Unit tests for schema-driven tool argument building.

use serde_json::{json, Value};

use mcp_inspector::schema::{build_arguments, coerce_value, infer_default, parse_key_value};

fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
    raw.iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

// ── key=value parsing ───────────────────────────────────────────────────────

#[test]
fn key_value_splits_at_first_equals() {
    assert_eq!(
        parse_key_value("query=a=b"),
        Ok(("query".to_owned(), "a=b".to_owned()))
    );
}

#[test]
fn key_value_allows_empty_value() {
    assert_eq!(parse_key_value("note="), Ok(("note".to_owned(), String::new())));
}

#[test]
fn key_value_rejects_missing_equals_and_empty_key() {
    assert!(parse_key_value("flag").is_err());
    assert!(parse_key_value("=value").is_err());
}

// ── Defaults ────────────────────────────────────────────────────────────────

#[test]
fn explicit_default_wins() {
    assert_eq!(infer_default(&json!({ "type": "integer", "default": 5 })), json!(5));
}

#[test]
fn zero_values_follow_declared_type() {
    assert_eq!(infer_default(&json!({ "type": "integer" })), json!(0));
    assert_eq!(infer_default(&json!({ "type": "number" })), json!(0));
    assert_eq!(infer_default(&json!({ "type": "boolean" })), json!(false));
    assert_eq!(infer_default(&json!({ "type": "array" })), json!([]));
    assert_eq!(infer_default(&json!({ "type": "object" })), json!({}));
    assert_eq!(infer_default(&json!({ "type": "string" })), json!(""));
    assert_eq!(infer_default(&json!({})), json!(""));
}

// ── Coercion ────────────────────────────────────────────────────────────────

#[test]
fn json_literals_are_taken_as_is() {
    let schema = json!({ "type": "string" });
    assert_eq!(coerce_value("[1,2]", &schema), json!([1, 2]));
    assert_eq!(coerce_value("{\"a\":true}", &schema), json!({ "a": true }));
}

#[test]
fn integer_falls_back_to_zero() {
    let schema = json!({ "type": "integer" });
    assert_eq!(coerce_value("12", &schema), json!(12));
    assert_eq!(coerce_value("twelve", &schema), json!(0));
}

#[test]
fn number_falls_back_to_zero_point_zero() {
    let schema = json!({ "type": "number" });
    assert_eq!(coerce_value("2.5", &schema), json!(2.5));
    assert_eq!(coerce_value("n/a", &schema), json!(0.0));
}

#[test]
fn boolean_accepts_yes_words() {
    let schema = json!({ "type": "boolean" });
    assert_eq!(coerce_value("yes", &schema), json!(true));
    assert_eq!(coerce_value("Y", &schema), json!(true));
    assert_eq!(coerce_value("nah", &schema), json!(false));
}

#[test]
fn plain_text_stays_a_string() {
    assert_eq!(coerce_value("hello world", &Value::Null), json!("hello world"));
}

// ── build_arguments ─────────────────────────────────────────────────────────

#[test]
fn required_and_defaulted_optionals_are_filled() {
    let schema = json!({
        "type": "object",
        "properties": {
            "query": { "type": "string" },
            "limit": { "type": "integer", "default": 10 },
            "verbose": { "type": "boolean" },
            "count": { "type": "integer" },
        },
        "required": ["query", "count"],
    });

    let args = build_arguments(&schema, &pairs(&[("query", "rust")]));

    assert_eq!(
        Value::Object(args),
        json!({ "query": "rust", "count": 0, "limit": 10 })
    );
}

#[test]
fn supplied_values_are_coerced_against_their_property() {
    let schema = json!({
        "properties": {
            "limit": { "type": "integer" },
            "ratio": { "type": "number" },
        },
    });

    let args = build_arguments(&schema, &pairs(&[("limit", "3"), ("ratio", "0.5")]));

    assert_eq!(args["limit"], json!(3));
    assert_eq!(args["ratio"], json!(0.5));
}

#[test]
fn unknown_keys_are_passed_through() {
    let args = build_arguments(&json!({}), &pairs(&[("extra", "value")]));
    assert_eq!(Value::Object(args), json!({ "extra": "value" }));
}

#[test]
fn schema_without_properties_yields_empty_arguments() {
    assert!(build_arguments(&Value::Null, &[]).is_empty());
}
