//! Turning an upstream body into what the caller receives.

use serde_json::{Value, json};
use tracing::warn;

use crate::config::ResponseShape;

/// Reply used by the simplified shape when the upstream produced no text.
pub const NO_REPLY_FALLBACK: &str = "Sorry, no reply generated. Try again.";

/// Locations of the reply text, most specific first.
const REPLY_POINTERS: [&str; 3] = [
    "/candidates/0/content/parts/0/text",
    "/candidates/0/content",
    "/text",
];

/// First non-empty reply text found in `body`, if any.
pub fn extract_reply(body: &Value) -> Option<&str> {
    REPLY_POINTERS.iter().find_map(|pointer| {
        body.pointer(pointer)
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
    })
}

/// Shape a successful upstream body for the caller.
pub fn relay_body(body: Value, shape: ResponseShape) -> Value {
    if has_no_candidates(&body) {
        warn!("Upstream returned no candidates");
    }

    match shape {
        ResponseShape::Passthrough => body,
        ResponseShape::Simplified => {
            let reply = extract_reply(&body).unwrap_or(NO_REPLY_FALLBACK);
            json!({ "reply": reply })
        }
    }
}

fn has_no_candidates(body: &Value) -> bool {
    body.get("candidates")
        .and_then(Value::as_array)
        .is_none_or(|candidates| candidates.is_empty())
}
