//! Outbound credential stamping.

use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};
use std::sync::Arc;

use crate::credentials::CredentialStore;
use crate::impersonation::ImpersonationContext;
use crate::pipeline::RequestStage;

/// Header naming the company an operator is impersonating.
pub const VIEW_AS_COMPANY_HEADER: HeaderName = HeaderName::from_static("x-view-as-company");

/// Stamps the current access credential and impersonation target on every
/// outbound request.
///
/// Reads the store at send time, so a replayed request picks up a credential
/// minted after it was first sent.
pub struct AuthDecorator {
    credentials: Arc<CredentialStore>,
    impersonation: Arc<ImpersonationContext>,
}

impl AuthDecorator {
    pub fn new(
        credentials: Arc<CredentialStore>,
        impersonation: Arc<ImpersonationContext>,
    ) -> Self {
        Self {
            credentials,
            impersonation,
        }
    }
}

impl RequestStage for AuthDecorator {
    fn on_request(&self, request: &mut reqwest::Request) {
        if let Some(access) = self.credentials.access() {
            match HeaderValue::from_str(&format!("Bearer {}", access.expose())) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    request.headers_mut().insert(AUTHORIZATION, value);
                }
                Err(_) => tracing::warn!("Access credential is not a valid header value, not sent"),
            }
        }

        if let Some(company_id) = self.impersonation.current() {
            match HeaderValue::from_str(&company_id) {
                Ok(value) => {
                    request.headers_mut().insert(VIEW_AS_COMPANY_HEADER, value);
                }
                Err(_) => tracing::warn!(
                    "Impersonated company id {:?} is not a valid header value, not sent",
                    company_id
                ),
            }
        }
    }
}

impl std::fmt::Debug for AuthDecorator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthDecorator").finish_non_exhaustive()
    }
}
