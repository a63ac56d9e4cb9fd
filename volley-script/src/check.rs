//! Response checks

use crate::extract::resolve_path;
use serde_json::Value as JsonValue;
use volley_config::CheckCondition;
use volley_http::HttpResponse;

/// Evaluate one check. `body` is the decoded response, or `None` when it
/// was not valid JSON, in which case every JSON check fails.
pub fn passes(condition: &CheckCondition, response: &HttpResponse, body: Option<&JsonValue>) -> bool {
    match condition {
        CheckCondition::Status(codes) => codes.contains(&response.status),
        CheckCondition::StatusRange { min, max } => (*min..=*max).contains(&response.status),
        CheckCondition::BodyContains(needle) => response.body.contains(needle.as_str()),
        CheckCondition::JsonPathExists(path) => {
            body.and_then(|b| resolve_path(b, path)).is_some()
        }
        CheckCondition::JsonEquals { path, value } => {
            body.and_then(|b| resolve_path(b, path)) == Some(value)
        }
        CheckCondition::JsonArrayNonEmpty(path) => body
            .and_then(|b| resolve_path(b, path))
            .and_then(JsonValue::as_array)
            .is_some_and(|items| !items.is_empty()),
    }
}
