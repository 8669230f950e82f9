//! Request-scoped authentication models.

use std::collections::HashSet;
use thiserror::Error;

use crate::domain::{GlobalRole, Principal, PrincipalId};
use crate::errors::Error;

/// Request-scoped authentication context derived from a valid token.
///
/// Built fresh from the principal store on every request so that role and
/// group changes take effect immediately.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub principal_id: PrincipalId,
    pub username: String,
    principal_ids: HashSet<String>,
    roles: HashSet<GlobalRole>,
}

impl AuthContext {
    pub fn new(
        principal_id: PrincipalId,
        username: String,
        principal_ids: Vec<String>,
        roles: Vec<GlobalRole>,
    ) -> Self {
        Self {
            principal_id,
            username,
            principal_ids: principal_ids.into_iter().collect(),
            roles: roles.into_iter().collect(),
        }
    }

    /// Context for a principal, answering to its user and group principal ids.
    pub fn from_principal(principal: &Principal) -> Self {
        let principal_ids = principal
            .principal_ids
            .iter()
            .chain(principal.group_principal_ids.iter())
            .cloned()
            .collect();

        Self {
            principal_id: principal.id.clone(),
            username: principal.username.clone(),
            principal_ids,
            roles: principal.global_roles.iter().copied().collect(),
        }
    }

    pub fn has_role(&self, role: GlobalRole) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(GlobalRole::Admin)
    }

    /// Whether an ACL entry naming `principal_id` applies to this caller.
    pub fn answers_to(&self, principal_id: &str) -> bool {
        self.principal_ids.contains(principal_id)
    }
}

/// Errors returned by authentication middleware/services.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unauthorized: bearer token missing")]
    MissingBearer,
    #[error("unauthorized: malformed bearer token")]
    MalformedBearer,
    #[error("unauthorized: token not found")]
    TokenNotFound,
    #[error(transparent)]
    Persistence(#[from] Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn context_answers_to_user_and_group_ids() {
        let principal = Principal {
            id: PrincipalId::from_str_unchecked("u-1"),
            username: "alice".into(),
            display_name: None,
            principal_ids: vec!["local://u-1".into()],
            group_principal_ids: vec!["local://g-platform".into()],
            global_roles: vec![GlobalRole::User],
            created_at: Utc::now(),
        };

        let ctx = AuthContext::from_principal(&principal);
        assert!(ctx.answers_to("local://u-1"));
        assert!(ctx.answers_to("local://g-platform"));
        assert!(!ctx.answers_to("local://u-2"));
        assert!(!ctx.is_admin());
        assert!(ctx.has_role(GlobalRole::User));
    }
}
