//! Authentication of bearer tokens against the principal store.

use std::sync::Arc;

use tracing::{field, info, instrument};

use crate::auth::{
    hashing,
    models::{AuthContext, AuthError},
    principal_store::PrincipalStore,
};
use crate::observability::metrics;

#[derive(Clone)]
pub struct AuthService {
    principals: Arc<dyn PrincipalStore>,
}

impl AuthService {
    pub fn new(principals: Arc<dyn PrincipalStore>) -> Self {
        Self { principals }
    }

    /// Resolve an `Authorization` header value into a fresh [`AuthContext`].
    #[instrument(skip(self, header), fields(principal_id = field::Empty))]
    pub async fn authenticate(&self, header: &str) -> Result<AuthContext, AuthError> {
        let header = header.trim();
        if header.is_empty() {
            metrics::record_authentication("missing_bearer");
            return Err(AuthError::MissingBearer);
        }

        let Some(token) = header.strip_prefix("Bearer ").map(str::trim) else {
            metrics::record_authentication("malformed");
            return Err(AuthError::MalformedBearer);
        };

        if !token.starts_with(hashing::TOKEN_PREFIX) || token.len() <= hashing::TOKEN_PREFIX.len()
        {
            metrics::record_authentication("malformed");
            return Err(AuthError::MalformedBearer);
        }

        let principal = match self.principals.find_by_token_digest(&hashing::token_digest(token)).await
        {
            Ok(Some(principal)) => principal,
            Ok(None) => {
                metrics::record_authentication("not_found");
                return Err(AuthError::TokenNotFound);
            }
            Err(err) => {
                metrics::record_authentication("error");
                return Err(AuthError::from(err));
            }
        };

        tracing::Span::current().record("principal_id", principal.id.as_str());
        metrics::record_authentication("success");
        info!(principal_id = %principal.id, "bearer token authenticated");

        Ok(AuthContext::from_principal(&principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::principal_store::{MemoryPrincipalStore, NewPrincipal};
    use crate::domain::GlobalRole;

    async fn service_with_user() -> (AuthService, String) {
        let store = Arc::new(MemoryPrincipalStore::new());
        let issued = store
            .create_user(NewPrincipal::new("alice").with_role(GlobalRole::TemplatesCreate))
            .await
            .unwrap();
        (AuthService::new(store), issued.token)
    }

    #[tokio::test]
    async fn authenticates_valid_bearer() {
        let (service, token) = service_with_user().await;
        let ctx = service.authenticate(&format!("Bearer {}", token)).await.unwrap();
        assert_eq!(ctx.username, "alice");
        assert!(ctx.has_role(GlobalRole::TemplatesCreate));
    }

    #[tokio::test]
    async fn rejects_missing_malformed_and_unknown() {
        let (service, _) = service_with_user().await;

        assert!(matches!(service.authenticate("").await, Err(AuthError::MissingBearer)));
        assert!(matches!(
            service.authenticate("Basic dXNlcjpwYXNz").await,
            Err(AuthError::MalformedBearer)
        ));
        assert!(matches!(
            service.authenticate("Bearer not-a-keelson-token").await,
            Err(AuthError::MalformedBearer)
        ));
        assert!(matches!(
            service.authenticate("Bearer kls_deadbeef").await,
            Err(AuthError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn role_changes_apply_to_next_request() {
        let store = Arc::new(MemoryPrincipalStore::new());
        let issued = store.create_user(NewPrincipal::new("bob")).await.unwrap();
        let service = AuthService::new(store.clone());
        let header = format!("Bearer {}", issued.token);

        assert!(!service.authenticate(&header).await.unwrap().is_admin());
        store.add_role_binding(&issued.principal.id, GlobalRole::Admin).await.unwrap();
        assert!(service.authenticate(&header).await.unwrap().is_admin());
    }
}
