//! Pulling correlation values out of responses

use serde_json::Value as JsonValue;
use volley_config::ExtractionPaths;
use volley_http::HttpResponse;

const HEADER_PREFIX: &str = "header:";

/// Resolve a dotted path (`data.items.0.id`) inside a JSON document.
/// Numeric segments index arrays; the empty path is the document itself.
pub fn resolve_path<'a>(document: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    if path.is_empty() {
        return Some(document);
    }
    path.split('.').try_fold(document, |current, segment| match current {
        JsonValue::Object(map) => map.get(segment),
        JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// First non-null value found along `paths`, tried in order. `header:<Name>`
/// reads a response header; anything else is a JSON path into the body.
/// `body` is the decoded response, or `None` when it was not valid JSON.
pub fn extract(
    paths: &ExtractionPaths,
    response: &HttpResponse,
    body: Option<&JsonValue>,
) -> Option<JsonValue> {
    paths.paths().into_iter().find_map(|path| {
        if let Some(name) = path.strip_prefix(HEADER_PREFIX) {
            return response
                .header(name.trim())
                .map(|v| JsonValue::String(v.to_string()));
        }
        resolve_path(body?, path)
            .filter(|value| !value.is_null())
            .cloned()
    })
}
