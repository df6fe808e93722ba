//! Interceptor chain applied to every API call.
//!
//! A [`Pipeline`] is an ordered list of request stages, run on each outbound
//! [`reqwest::Request`] just before it is sent, and response stages, run on
//! each [`ApiResponse`] before it reaches calling code. The standard pipeline
//! is:
//!
//! ```text
//! outbound:  AuthDecorator
//! inbound:   EnvelopeNormalizer
//! ```
//!
//! Credential refresh is not a stage: it may re-issue the call, so
//! [`ApiClient`](crate::ApiClient) drives it after the inbound stages ran.

use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;

use crate::credentials::CredentialStore;
use crate::decorator::AuthDecorator;
use crate::envelope::EnvelopeNormalizer;
use crate::impersonation::ImpersonationContext;

/// A received response, after the body has been decoded.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status.
    pub status: StatusCode,

    /// Decoded body. Empty bodies are `Null`; non-JSON bodies are a `String`.
    pub body: Value,

    /// Flattened error message, filled in by the normalizer for error statuses.
    pub error_message: Option<String>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            body,
            error_message: None,
        }
    }

    /// Decode raw response bytes into a response.
    pub fn from_bytes(status: StatusCode, bytes: &[u8]) -> Self {
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
        };
        Self::new(status, body)
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// True for the status that signals an expired or missing access credential.
    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }
}

/// Outbound stage. Runs synchronously, must not fail, and may only touch
/// the request headers.
pub trait RequestStage: Send + Sync {
    fn on_request(&self, request: &mut reqwest::Request);
}

/// Inbound stage.
pub trait ResponseStage: Send + Sync {
    fn on_response(&self, response: &mut ApiResponse);
}

/// Ordered request and response stages.
#[derive(Clone, Default)]
pub struct Pipeline {
    request_stages: Vec<Arc<dyn RequestStage>>,
    response_stages: Vec<Arc<dyn ResponseStage>>,
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// The portal's standard chain: credential decoration out, envelope
    /// normalization in.
    pub fn standard(
        credentials: Arc<CredentialStore>,
        impersonation: Arc<ImpersonationContext>,
    ) -> Self {
        Self::new()
            .with_request_stage(AuthDecorator::new(credentials, impersonation))
            .with_response_stage(EnvelopeNormalizer)
    }

    /// Append an outbound stage.
    pub fn with_request_stage(mut self, stage: impl RequestStage + 'static) -> Self {
        self.request_stages.push(Arc::new(stage));
        self
    }

    /// Append an inbound stage.
    pub fn with_response_stage(mut self, stage: impl ResponseStage + 'static) -> Self {
        self.response_stages.push(Arc::new(stage));
        self
    }

    /// Append an outbound stage that is shared with other pipelines.
    pub fn with_shared_request_stage(mut self, stage: Arc<dyn RequestStage>) -> Self {
        self.request_stages.push(stage);
        self
    }

    /// Append an inbound stage that is shared with other pipelines.
    pub fn with_shared_response_stage(mut self, stage: Arc<dyn ResponseStage>) -> Self {
        self.response_stages.push(stage);
        self
    }

    /// Run every outbound stage in order.
    pub fn apply_request(&self, request: &mut reqwest::Request) {
        for stage in &self.request_stages {
            stage.on_request(request);
        }
    }

    /// Run every inbound stage in order.
    pub fn apply_response(&self, response: &mut ApiResponse) {
        for stage in &self.response_stages {
            stage.on_response(response);
        }
    }

    pub fn len(&self) -> usize {
        self.request_stages.len() + self.response_stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("request_stages", &self.request_stages.len())
            .field("response_stages", &self.response_stages.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    struct Tag(&'static str);

    impl RequestStage for Tag {
        fn on_request(&self, request: &mut reqwest::Request) {
            let previous = request
                .headers()
                .get("x-trail")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            let trail = format!("{}{}", previous, self.0);
            request
                .headers_mut()
                .insert("x-trail", HeaderValue::from_str(&trail).unwrap());
        }
    }

    struct Upper;

    impl ResponseStage for Upper {
        fn on_response(&self, response: &mut ApiResponse) {
            if let Value::String(s) = &response.body {
                response.body = Value::String(s.to_uppercase());
            }
        }
    }

    #[test]
    fn test_request_stages_run_in_order() {
        let pipeline = Pipeline::new()
            .with_request_stage(Tag("a"))
            .with_request_stage(Tag("b"));

        let mut request = reqwest::Client::new()
            .get("http://localhost/orders")
            .build()
            .unwrap();
        pipeline.apply_request(&mut request);

        assert_eq!(request.headers()["x-trail"], "ab");
        assert_eq!(pipeline.len(), 2);
    }

    #[test]
    fn test_response_stages_apply() {
        let pipeline = Pipeline::new().with_response_stage(Upper);
        let mut response = ApiResponse::new(StatusCode::OK, json!("ok"));
        pipeline.apply_response(&mut response);
        assert_eq!(response.body, json!("OK"));
    }

    #[test]
    fn test_response_from_bytes() {
        let empty = ApiResponse::from_bytes(StatusCode::NO_CONTENT, b"");
        assert_eq!(empty.body, Value::Null);

        let text = ApiResponse::from_bytes(StatusCode::BAD_GATEWAY, b"upstream down");
        assert_eq!(text.body, json!("upstream down"));

        let parsed = ApiResponse::from_bytes(StatusCode::OK, br#"{"id":"1"}"#);
        assert_eq!(parsed.body, json!({"id": "1"}));
    }
}
