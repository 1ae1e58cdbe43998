//! Tool arguments from `key=value` pairs, guided by a JSON schema.
//!
//! Values are coerced against the property's declared `type`. A value that
//! parses as JSON is taken literally first, so `count=3`, `tags=["a"]` and
//! `opts={"x":1}` all work without quoting rules.

use serde_json::{Map, Value};

/// Split `key=value` at the first `=`.
///
/// # Errors
///
/// Returns a message suitable for a CLI parser when there is no `=` or the
/// key is empty.
pub fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_owned(), value.to_owned()))
        }
        Some(_) => Err(format!("argument `{raw}` has an empty key")),
        None => Err(format!("argument `{raw}` is not in key=value form")),
    }
}

/// Value used for a property the caller did not supply.
///
/// An explicit `default` wins; otherwise the zero value of the declared
/// type, or an empty string when the type is unknown.
#[must_use]
pub fn infer_default(property: &Value) -> Value {
    if let Some(default) = property.get("default") {
        return default.clone();
    }
    match property.get("type").and_then(Value::as_str) {
        Some("integer" | "number") => Value::from(0),
        Some("boolean") => Value::Bool(false),
        Some("array") => Value::Array(Vec::new()),
        Some("object") => Value::Object(Map::new()),
        _ => Value::String(String::new()),
    }
}

/// Convert raw text into a JSON value for `property`.
#[must_use]
pub fn coerce_value(text: &str, property: &Value) -> Value {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return value;
    }
    match property.get("type").and_then(Value::as_str) {
        Some("integer") => text.trim().parse::<i64>().map_or(Value::from(0), Value::from),
        Some("number") => text.trim().parse::<f64>().map_or(Value::from(0.0), Value::from),
        Some("boolean") => Value::Bool(matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "y"
        )),
        _ => Value::String(text.to_owned()),
    }
}

/// Build the `arguments` object for a tool call.
///
/// Supplied pairs are coerced against their property (keys unknown to the
/// schema are kept as plain JSON or strings). Missing required properties
/// get [`infer_default`]; missing optional ones are included only when the
/// schema declares a `default`.
#[must_use]
pub fn build_arguments(schema: &Value, pairs: &[(String, String)]) -> Map<String, Value> {
    let empty = Map::new();
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut arguments = Map::new();
    for (key, text) in pairs {
        let property = properties.get(key).unwrap_or(&Value::Null);
        arguments.insert(key.clone(), coerce_value(text, property));
    }

    for (name, property) in properties {
        if arguments.contains_key(name) {
            continue;
        }
        if required.contains(&name.as_str()) {
            arguments.insert(name.clone(), infer_default(property));
        } else if let Some(default) = property.get("default") {
            arguments.insert(name.clone(), default.clone());
        }
    }

    arguments
}
