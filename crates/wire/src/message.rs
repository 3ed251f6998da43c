// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! Message model: classification of parsed JSON values into the four
//! JSON-RPC message kinds, and builders for outgoing frames.

use crate::error::RpcError;
use serde_json::{json, Map, Value};

/// A classified JSON-RPC message.
///
/// `id` is kept as a raw JSON value: the protocol allows strings, numbers,
/// and null, and replies must echo the id byte-for-byte.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request { id: Value, method: String, params: Option<Value> },
    Notification { method: String, params: Option<Value> },
    Response { id: Value, result: Value },
    Error { id: Value, error: RpcError },
}

impl Message {
    /// Classify a parsed JSON value per the JSON-RPC 2.0 shape table.
    ///
    /// Returns the offending id (for the error reply) when the value is a
    /// syntactically valid object with none of the required shapes.
    pub fn classify(value: Value) -> Result<Message, Value> {
        let Value::Object(obj) = value else {
            return Err(Value::Null);
        };
        let id_for_error = obj.get("id").cloned().filter(valid_id).unwrap_or(Value::Null);

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            return Err(id_for_error);
        }

        let has_id = obj.contains_key("id");
        let method = obj.get("method").and_then(Value::as_str);
        let has_result = obj.contains_key("result");
        let has_error = obj.contains_key("error");

        match (method, has_id, has_result, has_error) {
            (Some(method), true, false, false) => {
                let id = obj.get("id").cloned().unwrap_or(Value::Null);
                if !valid_id(&id) {
                    return Err(Value::Null);
                }
                Ok(Message::Request {
                    id,
                    method: method.to_string(),
                    params: valid_params(&obj)?,
                })
            }
            (Some(method), false, false, false) => Ok(Message::Notification {
                method: method.to_string(),
                params: valid_params(&obj)?,
            }),
            (None, true, true, false) => Ok(Message::Response {
                id: obj.get("id").cloned().unwrap_or(Value::Null),
                result: obj.get("result").cloned().unwrap_or(Value::Null),
            }),
            (None, true, false, true) => {
                let error = obj
                    .get("error")
                    .cloned()
                    .and_then(|e| serde_json::from_value::<RpcError>(e).ok())
                    .ok_or_else(|| id_for_error.clone())?;
                Ok(Message::Error { id: obj.get("id").cloned().unwrap_or(Value::Null), error })
            }
            _ => Err(id_for_error),
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request { method, .. } | Message::Notification { method, .. } => Some(method),
            _ => None,
        }
    }
}

fn valid_id(id: &Value) -> bool {
    matches!(id, Value::String(_) | Value::Number(_) | Value::Null)
}

/// `params`, when present, must be an object or an array.
fn valid_params(obj: &Map<String, Value>) -> Result<Option<Value>, Value> {
    match obj.get("params") {
        None => Ok(None),
        Some(p @ (Value::Object(_) | Value::Array(_))) => Ok(Some(p.clone())),
        Some(_) => Err(obj.get("id").cloned().filter(valid_id).unwrap_or(Value::Null)),
    }
}

/// Build a result reply frame.
pub fn response_frame(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

/// Build an error reply frame.
pub fn error_frame(id: Value, error: &RpcError) -> Value {
    let mut err = json!({ "code": error.code, "message": error.message });
    if let Some(data) = &error.data {
        if let Some(obj) = err.as_object_mut() {
            obj.insert("data".to_string(), data.clone());
        }
    }
    json!({ "jsonrpc": "2.0", "id": id, "error": err })
}

/// Build an outgoing request frame.
pub fn request_frame(id: Value, method: &str, params: Option<Value>) -> Value {
    let mut frame = json!({ "jsonrpc": "2.0", "id": id, "method": method });
    if let (Some(obj), Some(params)) = (frame.as_object_mut(), params) {
        obj.insert("params".to_string(), params);
    }
    frame
}

/// Build a notification frame (no id, no reply expected).
pub fn notification_frame(method: &str, params: Option<Value>) -> Value {
    let mut frame = json!({ "jsonrpc": "2.0", "method": method });
    if let (Some(obj), Some(params)) = (frame.as_object_mut(), params) {
        obj.insert("params".to_string(), params);
    }
    frame
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
