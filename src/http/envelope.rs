//! JSON response envelopes shared by handlers and the error dispatcher.

use serde_json::{json, Value};

/// Success envelope: code `"OK"` plus a message and carrier data.
pub fn ok(message: &str, data: Option<Value>) -> Value {
    custom("OK", message, data)
}

/// Envelope with an explicit code. Absent data becomes an empty object.
pub fn custom(code: &str, message: &str, data: Option<Value>) -> Value {
    json!({
        "code": code,
        "message": message,
        "data": data.unwrap_or_else(|| json!({})),
    })
}

/// Error envelope: code and message only, no data key.
pub fn error(code: &str, message: &str) -> Value {
    json!({
        "code": code,
        "message": message,
    })
}
