//! Authenticated portal API client.
//!
//! [`ApiClient`] sends every call through the standard [`Pipeline`]
//! (credential decoration out, envelope normalization in). When a call comes
//! back `401 Unauthorized` it asks the [`RefreshCoordinator`] for a fresh
//! access credential and replays the call once.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use weftgate_core::{ApiClient, ClientConfig};
//!
//! let client = ApiClient::builder(ClientConfig::from_env()?).build()?;
//! client.login("buyer@brand.example", "hunter2").await?;
//!
//! let orders = client.get("/orders").await?;
//! println!("{}", orders);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

use crate::config::ClientConfig;
use crate::credentials::{CredentialPair, CredentialStore};
use crate::error::ApiError;
use crate::impersonation::ImpersonationContext;
use crate::pipeline::{ApiResponse, Pipeline, RequestStage, ResponseStage};
use crate::refresh::{
    CredentialRefresher, LogSessionObserver, RefreshCoordinator, RefreshError, SessionObserver,
};
use crate::secret::Secret;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const LOGOUT_PATH: &str = "/auth/logout";

/// Calls that never trigger a refresh and are never replayed.
const EXEMPT_PATHS: [&str; 4] = [LOGIN_PATH, REGISTER_PATH, REFRESH_PATH, LOGOUT_PATH];

/// One API call, kept in a replayable form.
///
/// The outbound HTTP request is rebuilt from this for every dispatch so a
/// replay carries the headers current at replay time.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PATCH, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Append a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// True once this request has been replayed after a refresh.
    pub fn retried(&self) -> bool {
        self.retried
    }

    /// True for the sign-in/sign-up/refresh/sign-out calls.
    pub fn is_exempt(&self) -> bool {
        let path = self.path.split(['?', '#']).next().unwrap_or_default();
        let path = path.trim_end_matches('/');
        EXEMPT_PATHS.iter().any(|exempt| {
            path == exempt.trim_start_matches('/') || path.ends_with(exempt)
        })
    }

    /// Whether a 401 on this request may start or join a refresh cycle.
    fn is_refreshable(&self) -> bool {
        !self.retried && !self.is_exempt()
    }
}

/// Credentials and user profile returned by sign-in and sign-up.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSession {
    #[serde(flatten)]
    pub credentials: CredentialPair,

    /// The signed-in user as returned by the API.
    #[serde(default)]
    pub user: Value,
}

/// Authenticated client for the portal API.
pub struct ApiClient {
    config: ClientConfig,
    http: reqwest::Client,
    credentials: Arc<CredentialStore>,
    impersonation: Arc<ImpersonationContext>,
    pipeline: Pipeline,
    coordinator: RefreshCoordinator,
}

impl ApiClient {
    /// Start building a client.
    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder::new(config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The credential store this client reads and updates.
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// The impersonation context stamped on outbound calls.
    pub fn impersonation(&self) -> &Arc<ImpersonationContext> {
        &self.impersonation
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.send(ApiRequest::post(path, body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.send(ApiRequest::put(path, body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.send(ApiRequest::patch(path, body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.send(ApiRequest::delete(path)).await
    }

    /// GET and deserialize the unwrapped payload.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(ApiRequest::get(path)).await
    }

    /// Send and deserialize the unwrapped payload.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let value = self.send(request).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Send a call and return its unwrapped payload.
    ///
    /// A `401` on a non-exempt call is absorbed: the credential is refreshed
    /// (or the in-flight refresh awaited) and the call is replayed once. If
    /// the refresh fails the error is [`ApiError::Session`].
    pub async fn send(&self, mut request: ApiRequest) -> Result<Value, ApiError> {
        let sent_at = self.credentials.generation();
        let response = self.dispatch(&request).await?;

        if response.is_unauthorized() && request.is_refreshable() {
            request.retried = true;
            self.recover_since(sent_at).await?;

            debug!(method = %request.method, path = %request.path, "Replaying after refresh");
            let replayed = self.dispatch(&request).await?;
            return into_result(replayed);
        }

        into_result(response)
    }

    /// Sign in and keep the returned credentials.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, ApiError> {
        let body = json!({ "email": email, "password": password });
        self.authenticate(ApiRequest::post(LOGIN_PATH, body)).await
    }

    /// Create an account and keep the returned credentials.
    pub async fn register(&self, payload: Value) -> Result<AuthSession, ApiError> {
        self.authenticate(ApiRequest::post(REGISTER_PATH, payload)).await
    }

    /// Sign out.
    ///
    /// Tells the server to revoke the refresh credential when one is held;
    /// that call is best-effort and not retried. Local credentials are
    /// cleared either way.
    pub async fn logout(&self) {
        if let Some(refresh) = self.credentials.refresh() {
            let body = json!({ "refreshToken": refresh.expose() });
            if let Err(e) = self.send(ApiRequest::post(LOGOUT_PATH, body)).await {
                debug!("Logout call failed, ignoring: {}", e);
            }
        }
        self.credentials.clear();
    }

    /// Refresh the access credential now, joining a cycle already in flight.
    pub async fn refresh_now(&self) -> Result<Secret, ApiError> {
        Ok(self.coordinator.recover(self).await?)
    }

    /// Make sure the store holds something newer than the credentials a
    /// call was sent with at `sent_at`.
    ///
    /// A 401 that arrives after a refresh (or sign-in) already replaced the
    /// credentials is replayed as is; one that arrives after a sign-out is
    /// not replayed at all.
    async fn recover_since(&self, sent_at: u64) -> Result<(), RefreshError> {
        if self.credentials.generation() == sent_at {
            return self.coordinator.recover(self).await.map(drop);
        }
        if self.credentials.is_authenticated() {
            debug!("Credentials replaced since dispatch, replaying without refresh");
            Ok(())
        } else {
            Err(RefreshError::SignedOut)
        }
    }

    async fn authenticate(&self, request: ApiRequest) -> Result<AuthSession, ApiError> {
        let session: AuthSession = self.send_json(request).await?;
        self.credentials.set_pair(session.credentials.clone());
        Ok(session)
    }

    /// Build, decorate, send and normalize one attempt.
    async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = self
            .config
            .endpoint(&request.path)
            .map_err(|source| ApiError::InvalidUrl {
                path: request.path.clone(),
                source,
            })?;

        let mut builder = self.http.request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let mut outbound = builder.build()?;
        self.pipeline.apply_request(&mut outbound);

        debug!(
            method = %request.method,
            path = %request.path,
            retried = request.retried,
            "Dispatching request"
        );
        let response = self.http.execute(outbound).await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        let mut response = ApiResponse::from_bytes(status, &bytes);
        self.pipeline.apply_response(&mut response);
        Ok(response)
    }
}

#[async_trait]
impl CredentialRefresher for ApiClient {
    async fn refresh(&self, refresh: &Secret) -> Result<CredentialPair, RefreshError> {
        let request = ApiRequest::post(REFRESH_PATH, json!({ "refreshToken": refresh.expose() }));

        let response = self
            .dispatch(&request)
            .await
            .map_err(|e| RefreshError::Transport {
                message: e.to_string(),
            })?;

        if !response.is_success() {
            return Err(RefreshError::Rejected {
                status: response.status.as_u16(),
                message: response
                    .error_message
                    .unwrap_or_else(|| response.status.to_string()),
            });
        }

        serde_json::from_value(response.body).map_err(|e| RefreshError::MalformedResponse {
            message: e.to_string(),
        })
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url.as_str())
            .field("credentials", &self.credentials)
            .field("pipeline", &self.pipeline)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

fn into_result(response: ApiResponse) -> Result<Value, ApiError> {
    if response.is_success() {
        Ok(response.body)
    } else {
        Err(ApiError::Status {
            status: response.status,
            message: response.error_message,
            body: response.body,
        })
    }
}

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
    config: ClientConfig,
    credentials: Option<Arc<CredentialStore>>,
    impersonation: Option<Arc<ImpersonationContext>>,
    observer: Option<Arc<dyn SessionObserver>>,
    request_stages: Vec<Arc<dyn RequestStage>>,
    response_stages: Vec<Arc<dyn ResponseStage>>,
}

impl ApiClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            credentials: None,
            impersonation: None,
            observer: None,
            request_stages: Vec::new(),
            response_stages: Vec::new(),
        }
    }

    /// Share an existing credential store.
    pub fn credentials(mut self, store: Arc<CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    /// Share an existing impersonation context.
    pub fn impersonation(mut self, context: Arc<ImpersonationContext>) -> Self {
        self.impersonation = Some(context);
        self
    }

    /// Observer told when a refresh failure ends the session.
    pub fn session_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Extra outbound stage, run after the credential decorator.
    pub fn request_stage(mut self, stage: impl RequestStage + 'static) -> Self {
        self.request_stages.push(Arc::new(stage));
        self
    }

    /// Extra inbound stage, run after the envelope normalizer.
    pub fn response_stage(mut self, stage: impl ResponseStage + 'static) -> Self {
        self.response_stages.push(Arc::new(stage));
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<ApiClient, ApiError> {
        let credentials = self.credentials.unwrap_or_default();
        let impersonation = self.impersonation.unwrap_or_default();
        let observer = self
            .observer
            .unwrap_or_else(|| Arc::new(LogSessionObserver));

        let http = reqwest::Client::builder()
            .timeout(self.config.timeout)
            .build()?;

        let mut pipeline = Pipeline::standard(credentials.clone(), impersonation.clone());
        for stage in self.request_stages {
            pipeline = pipeline.with_shared_request_stage(stage);
        }
        for stage in self.response_stages {
            pipeline = pipeline.with_shared_response_stage(stage);
        }

        Ok(ApiClient {
            config: self.config,
            http,
            coordinator: RefreshCoordinator::new(credentials.clone(), observer),
            credentials,
            impersonation,
            pipeline,
        })
    }
}

impl std::fmt::Debug for ApiClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClientBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
