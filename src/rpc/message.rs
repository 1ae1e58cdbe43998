//! JSON-RPC 2.0 message model.
//!
//! Outgoing traffic is modelled by [`Message`]; incoming reply-stream lines
//! go through a single parse-then-classify step into [`Inbound`].
//!
//! | Shape on the wire                                 | Classified as               |
//! |---------------------------------------------------|-----------------------------|
//! | integer `id` plus `result` or `error`             | [`Inbound::Response`]       |
//! | `id` plus `method` (server-originated request)    | [`Inbound::Request`]        |
//! | `method` without `id`                             | [`Inbound::Notification`]   |
//! | anything else that is valid JSON                  | [`Inbound::Unrecognized`]   |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;

/// Protocol version string carried in every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Correlation id assigned by the client.
pub type RequestId = u64;

/// The `error` member of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Short human-readable description.
    pub message: String,
    /// Optional server-defined detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Build an error object from a possibly malformed `error` member.
    ///
    /// Servers do not always follow the schema, so missing fields fall back
    /// to `0` / an empty message instead of rejecting the response.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        Self {
            code: value.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            data: value.get("data").cloned().filter(|d| !d.is_null()),
        }
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "code={} message={}", self.code, self.message)?;
        if let Some(data) = &self.data {
            write!(f, " data={data}")?;
        }
        Ok(())
    }
}

/// A response correlated to an earlier request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Id of the request this answers.
    pub id: RequestId,
    /// `Ok(result)` or `Err(error)`.
    pub outcome: std::result::Result<Value, RpcError>,
}

impl Response {
    /// Successful response.
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id,
            outcome: Ok(result),
        }
    }

    /// Failed response.
    #[must_use]
    pub fn failure(id: RequestId, error: RpcError) -> Self {
        Self {
            id,
            outcome: Err(error),
        }
    }
}

/// A message written by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Call expecting a correlated response.
    Request {
        /// Correlation id.
        id: RequestId,
        /// Method name.
        method: String,
        /// Parameters; omitted from the wire when `None`.
        params: Option<Value>,
    },
    /// One-way message, never answered.
    Notification {
        /// Method name.
        method: String,
        /// Parameters; omitted from the wire when `None`.
        params: Option<Value>,
    },
    /// Reply to a server-originated request.
    Response(Response),
}

impl Message {
    /// Build a request.
    #[must_use]
    pub fn request(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Request {
            id,
            method: method.into(),
            params,
        }
    }

    /// Build a notification.
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Notification {
            method: method.into(),
            params,
        }
    }

    /// Correlation id, if this message expects or carries one.
    #[must_use]
    pub fn id(&self) -> Option<RequestId> {
        match self {
            Self::Request { id, .. } => Some(*id),
            Self::Response(response) => Some(response.id),
            Self::Notification { .. } => None,
        }
    }

    /// Method name; responses have none.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request { method, .. } | Self::Notification { method, .. } => Some(method),
            Self::Response(_) => None,
        }
    }

    /// Wire representation as a JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("jsonrpc".into(), Value::from(JSONRPC_VERSION));
        match self {
            Self::Request { id, method, params } => {
                obj.insert("id".into(), Value::from(*id));
                obj.insert("method".into(), Value::from(method.as_str()));
                if let Some(params) = params {
                    obj.insert("params".into(), params.clone());
                }
            }
            Self::Notification { method, params } => {
                obj.insert("method".into(), Value::from(method.as_str()));
                if let Some(params) = params {
                    obj.insert("params".into(), params.clone());
                }
            }
            Self::Response(response) => {
                obj.insert("id".into(), Value::from(response.id));
                match &response.outcome {
                    Ok(result) => {
                        obj.insert("result".into(), result.clone());
                    }
                    Err(error) => {
                        obj.insert(
                            "error".into(),
                            serde_json::to_value(error).unwrap_or(Value::Null),
                        );
                    }
                }
            }
        }
        Value::Object(obj)
    }

    /// Encode as a single compact JSON line without the trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AppError::Config`] if serialisation fails.
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_value())?)
    }
}

/// A classified reply-stream line.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Answer to a client request; goes to the correlator.
    Response(Response),
    /// Server-originated request. Never answered by this client.
    Request {
        /// Server-chosen id, kept verbatim.
        id: Value,
        /// Method name.
        method: String,
        /// Parameters, `Null` when absent.
        params: Value,
    },
    /// Server-originated notification.
    Notification {
        /// Method name.
        method: String,
        /// Parameters, `Null` when absent.
        params: Value,
    },
    /// Valid JSON that is none of the above.
    Unrecognized(Value),
}

impl Inbound {
    /// Parse a raw line and classify it.
    ///
    /// # Errors
    ///
    /// Returns the [`serde_json::Error`] when the line is not valid JSON.
    pub fn parse(line: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str::<Value>(line).map(Self::classify)
    }

    /// Classify an already-parsed JSON value.
    #[must_use]
    pub fn classify(value: Value) -> Self {
        let Value::Object(obj) = &value else {
            return Self::Unrecognized(value);
        };

        let id = obj.get("id").filter(|id| !id.is_null());
        let method = obj.get("method").and_then(Value::as_str);
        let has_result = obj.contains_key("result");
        let has_error = obj.contains_key("error");

        match (id, method) {
            (Some(id), _) if has_result || has_error => {
                let Some(id) = id.as_u64() else {
                    return Self::Unrecognized(value);
                };
                let outcome = match obj.get("error") {
                    Some(error) => Err(RpcError::from_value(error)),
                    None => Ok(obj.get("result").cloned().unwrap_or(Value::Null)),
                };
                Self::Response(Response { id, outcome })
            }
            (Some(id), Some(method)) => Self::Request {
                id: id.clone(),
                method: method.to_owned(),
                params: obj.get("params").cloned().unwrap_or(Value::Null),
            },
            (None, Some(method)) => Self::Notification {
                method: method.to_owned(),
                params: obj.get("params").cloned().unwrap_or(Value::Null),
            },
            _ => Self::Unrecognized(value),
        }
    }

    /// Short label used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Response(_) => "response",
            Self::Request { .. } => "request",
            Self::Notification { .. } => "notification",
            Self::Unrecognized(_) => "unrecognized",
        }
    }
}
