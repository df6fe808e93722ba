//! Operator impersonation ("view as company").

use parking_lot::RwLock;

/// The company a platform operator is currently acting on behalf of.
///
/// Set and cleared by operator-only control-plane actions; read by
/// [`AuthDecorator`](crate::decorator::AuthDecorator). It never touches the
/// credential store.
#[derive(Debug, Default)]
pub struct ImpersonationContext {
    company_id: RwLock<Option<String>>,
}

impl ImpersonationContext {
    /// Create an inactive context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start acting as `company_id`. A blank id ends impersonation instead.
    pub fn begin(&self, company_id: impl Into<String>) {
        let company_id = company_id.into();
        let company_id = company_id.trim();
        if company_id.is_empty() {
            self.end();
            return;
        }
        tracing::info!("Impersonating company {}", company_id);
        *self.company_id.write() = Some(company_id.to_string());
    }

    /// Stop impersonating. Idempotent.
    pub fn end(&self) {
        if self.company_id.write().take().is_some() {
            tracing::info!("Impersonation ended");
        }
    }

    /// The impersonated company id, if any.
    pub fn current(&self) -> Option<String> {
        self.company_id.read().clone()
    }

    pub fn is_active(&self) -> bool {
        self.company_id.read().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_and_end() {
        let ctx = ImpersonationContext::new();
        assert!(!ctx.is_active());

        ctx.begin("company-42");
        assert_eq!(ctx.current().as_deref(), Some("company-42"));

        ctx.end();
        ctx.end();
        assert!(ctx.current().is_none());
    }

    #[test]
    fn test_blank_id_ends_impersonation() {
        let ctx = ImpersonationContext::new();
        ctx.begin("company-42");
        ctx.begin("   ");
        assert!(!ctx.is_active());
    }
}
