//! Response envelope normalization.
//!
//! The portal API wraps successful payloads as `{ "data": ..., "meta": {...} }`
//! and reports failures as `{ "error": { "message": "..." | ["...", ...] } }`.
//! Older endpoints return bare payloads. The normalizer gives every consumer
//! the bare payload on success and a single string at the top-level
//! `message` key on failure.

use serde_json::Value;

use crate::pipeline::{ApiResponse, ResponseStage};

/// Replace a `{data, meta}` envelope with its `data`.
///
/// Anything that is not an object carrying both keys passes through
/// unchanged, so a body without `meta` is never unwrapped.
pub fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("data") && map.contains_key("meta") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Extract a single message from a structured error body.
///
/// Reads `error.message`; when it is an array the first string element wins.
pub fn flatten_error_message(body: &Value) -> Option<String> {
    match body.get("error")?.get("message")? {
        Value::String(message) => Some(message.clone()),
        Value::Array(messages) => messages.iter().find_map(|m| m.as_str()).map(str::to_string),
        _ => None,
    }
}

/// Response stage that applies [`unwrap_envelope`] to successes and
/// [`flatten_error_message`] to failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeNormalizer;

impl ResponseStage for EnvelopeNormalizer {
    fn on_response(&self, response: &mut ApiResponse) {
        if response.is_success() {
            response.body = unwrap_envelope(std::mem::take(&mut response.body));
            return;
        }

        if let Some(message) = flatten_error_message(&response.body) {
            if let Value::Object(map) = &mut response.body {
                map.insert("message".to_string(), Value::String(message.clone()));
            }
            response.error_message = Some(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use serde_json::json;

    fn normalize(status: StatusCode, body: Value) -> ApiResponse {
        let mut response = ApiResponse::new(status, body);
        EnvelopeNormalizer.on_response(&mut response);
        response
    }

    #[test]
    fn test_unwraps_envelope() {
        let response = normalize(
            StatusCode::OK,
            json!({"data": {"id": "1"}, "meta": {"requestId": "abc"}}),
        );
        assert_eq!(response.body, json!({"id": "1"}));
    }

    #[test]
    fn test_bare_payload_passes_through() {
        let response = normalize(StatusCode::OK, json!({"id": "1"}));
        assert_eq!(response.body, json!({"id": "1"}));
    }

    #[test]
    fn test_data_without_meta_is_not_unwrapped() {
        let body = json!({"data": [1, 2, 3], "total": 3});
        assert_eq!(unwrap_envelope(body.clone()), body);
    }

    #[test]
    fn test_unwrap_is_a_no_op_on_unwrapped_body() {
        let once = unwrap_envelope(json!({"data": {"id": "1"}, "meta": {}}));
        let twice = unwrap_envelope(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_null_data_unwraps_to_null() {
        let response = normalize(StatusCode::OK, json!({"data": null, "meta": {}}));
        assert_eq!(response.body, Value::Null);
    }

    #[test]
    fn test_error_message_string() {
        let response = normalize(
            StatusCode::NOT_FOUND,
            json!({"error": {"code": "NOT_FOUND", "message": "Order not found"}}),
        );
        assert_eq!(response.error_message.as_deref(), Some("Order not found"));
        assert_eq!(response.body["message"], "Order not found");
        assert_eq!(response.body["error"]["code"], "NOT_FOUND");
    }

    #[test]
    fn test_error_message_array_takes_first() {
        let response = normalize(
            StatusCode::BAD_REQUEST,
            json!({"error": {"message": ["cnpj must be valid", "name is required"]}}),
        );
        assert_eq!(response.error_message.as_deref(), Some("cnpj must be valid"));
        assert_eq!(response.body["message"], "cnpj must be valid");
    }

    #[test]
    fn test_error_without_structure_untouched() {
        let response = normalize(StatusCode::BAD_GATEWAY, json!("upstream down"));
        assert!(response.error_message.is_none());
        assert_eq!(response.body, json!("upstream down"));
    }

    #[test]
    fn test_error_bodies_are_never_unwrapped() {
        let body = json!({"data": null, "meta": {}, "error": {"message": "boom"}});
        let response = normalize(StatusCode::INTERNAL_SERVER_ERROR, body);
        assert!(response.body.get("meta").is_some());
        assert_eq!(response.error_message.as_deref(), Some("boom"));
    }
}
