//! Principal and membership store.
//!
//! Users, their bearer tokens, global role bindings and group memberships.
//! The store is injected wherever roles are resolved; there is no global
//! registry.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::hashing;
use crate::domain::{GlobalRole, Principal, PrincipalId};
use crate::errors::{KeelsonError, Result};

/// Request to provision a user account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewPrincipal {
    #[validate(length(min = 1, max = 64, message = "username must be 1-64 characters"))]
    pub username: String,
    #[validate(length(max = 255, message = "displayName must be at most 255 characters"))]
    pub display_name: Option<String>,
    /// Global roles beyond the baseline `user` role.
    #[serde(default)]
    pub global_roles: Vec<GlobalRole>,
}

impl NewPrincipal {
    pub fn new(username: impl Into<String>) -> Self {
        Self { username: username.into(), display_name: None, global_roles: Vec::new() }
    }

    pub fn with_role(mut self, role: GlobalRole) -> Self {
        self.global_roles.push(role);
        self
    }
}

/// A newly provisioned principal together with its plaintext token.
///
/// The token is only ever returned here; the store keeps its digest.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssuedPrincipal {
    pub principal: Principal,
    pub token: String,
}

#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Provision a user holding the `user` role plus any requested roles.
    async fn create_user(&self, request: NewPrincipal) -> Result<IssuedPrincipal>;

    /// Register a caller-chosen token for a principal.
    async fn register_token(&self, id: &PrincipalId, token: &str) -> Result<()>;

    async fn get(&self, id: &PrincipalId) -> Result<Principal>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Principal>>;

    async fn find_by_token_digest(&self, digest: &str) -> Result<Option<Principal>>;

    async fn add_role_binding(&self, id: &PrincipalId, role: GlobalRole) -> Result<Principal>;

    async fn add_group_member(&self, group_principal_id: &str, id: &PrincipalId)
        -> Result<Principal>;

    /// Idempotently provision an admin that authenticates with `token`.
    async fn ensure_admin(&self, username: &str, token: &str) -> Result<Principal>;
}

/// Roles a new principal starts with: `user` plus the requested ones, in
/// request order and without duplicates.
pub(crate) fn initial_roles(requested: Vec<GlobalRole>) -> Vec<GlobalRole> {
    let mut roles = vec![GlobalRole::User];
    for role in requested {
        if !roles.contains(&role) {
            roles.push(role);
        }
    }
    roles
}

pub(crate) fn validate_group_principal_id(group_principal_id: &str) -> Result<()> {
    if group_principal_id.trim().is_empty() {
        return Err(KeelsonError::validation_field(
            "group principal id cannot be empty",
            "groupPrincipalId",
        ));
    }
    Ok(())
}

pub(crate) fn username_taken(username: &str) -> KeelsonError {
    KeelsonError::conflict(format!("username '{}' is already taken", username), "User")
}

/// In-process principal store backed by concurrent maps.
#[derive(Debug, Default)]
pub struct MemoryPrincipalStore {
    principals: DashMap<PrincipalId, Principal>,
    usernames: DashMap<String, PrincipalId>,
    tokens: DashMap<String, PrincipalId>,
}

impl MemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_principal(&self, request: NewPrincipal) -> Result<Principal> {
        let id = PrincipalId::new();

        // Entry API holds the shard lock so concurrent creates cannot both win.
        match self.usernames.entry(request.username.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(username_taken(&request.username));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(id.clone());
            }
        }

        let roles = initial_roles(request.global_roles);
        let principal = Principal {
            principal_ids: vec![Principal::local_principal_id(&id)],
            id: id.clone(),
            username: request.username,
            display_name: request.display_name,
            group_principal_ids: Vec::new(),
            global_roles: roles,
            created_at: Utc::now(),
        };

        self.principals.insert(id, principal.clone());
        Ok(principal)
    }

    fn update<F>(&self, id: &PrincipalId, apply: F) -> Result<Principal>
    where
        F: FnOnce(&mut Principal),
    {
        let mut entry = self
            .principals
            .get_mut(id)
            .ok_or_else(|| KeelsonError::not_found("User", id.as_str()))?;
        apply(entry.value_mut());
        Ok(entry.value().clone())
    }
}

#[async_trait]
impl PrincipalStore for MemoryPrincipalStore {
    #[instrument(skip(self, request), fields(username = %request.username), name = "principals_create_user")]
    async fn create_user(&self, request: NewPrincipal) -> Result<IssuedPrincipal> {
        request.validate()?;

        let principal = self.insert_principal(request)?;
        let token = hashing::generate_token();
        self.tokens.insert(hashing::token_digest(&token), principal.id.clone());

        info!(principal_id = %principal.id, roles = ?principal.global_roles, "user provisioned");
        Ok(IssuedPrincipal { principal, token })
    }

    async fn register_token(&self, id: &PrincipalId, token: &str) -> Result<()> {
        if !self.principals.contains_key(id) {
            return Err(KeelsonError::not_found("User", id.as_str()));
        }
        self.tokens.insert(hashing::token_digest(token), id.clone());
        Ok(())
    }

    async fn get(&self, id: &PrincipalId) -> Result<Principal> {
        self.principals
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| KeelsonError::not_found("User", id.as_str()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Principal>> {
        let Some(id) = self.usernames.get(username).map(|entry| entry.value().clone()) else {
            return Ok(None);
        };
        Ok(self.principals.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_token_digest(&self, digest: &str) -> Result<Option<Principal>> {
        let Some(id) = self.tokens.get(digest).map(|entry| entry.value().clone()) else {
            return Ok(None);
        };
        Ok(self.principals.get(&id).map(|entry| entry.value().clone()))
    }

    #[instrument(skip_all, fields(principal_id = %id, role = %role), name = "principals_add_role")]
    async fn add_role_binding(&self, id: &PrincipalId, role: GlobalRole) -> Result<Principal> {
        let principal = self.update(id, |p| {
            if !p.global_roles.contains(&role) {
                p.global_roles.push(role);
            }
        })?;
        info!(principal_id = %id, role = %role, "global role bound");
        Ok(principal)
    }

    #[instrument(
        skip_all,
        fields(principal_id = %id, group_principal_id = %group_principal_id),
        name = "principals_add_group_member"
    )]
    async fn add_group_member(
        &self,
        group_principal_id: &str,
        id: &PrincipalId,
    ) -> Result<Principal> {
        validate_group_principal_id(group_principal_id)?;

        self.update(id, |p| {
            if !p.group_principal_ids.iter().any(|g| g == group_principal_id) {
                p.group_principal_ids.push(group_principal_id.to_string());
            }
        })
    }

    #[instrument(skip(self, token), name = "principals_ensure_admin")]
    async fn ensure_admin(&self, username: &str, token: &str) -> Result<Principal> {
        let principal = match self.find_by_username(username).await? {
            Some(existing) => self.add_role_binding(&existing.id, GlobalRole::Admin).await?,
            None => {
                let request = NewPrincipal::new(username).with_role(GlobalRole::Admin);
                request.validate()?;
                self.insert_principal(request)?
            }
        };

        self.register_token(&principal.id, token).await?;
        info!(principal_id = %principal.id, username = %username, "bootstrap admin ready");
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_user_issues_token_resolvable_by_digest() {
        let store = MemoryPrincipalStore::new();
        let issued = store.create_user(NewPrincipal::new("alice")).await.unwrap();

        assert!(issued.principal.has_role(GlobalRole::User));
        assert_eq!(
            issued.principal.principal_ids,
            vec![Principal::local_principal_id(&issued.principal.id)]
        );

        let found = store
            .find_by_token_digest(&hashing::token_digest(&issued.token))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, issued.principal.id);
        assert!(store.find_by_token_digest("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let store = MemoryPrincipalStore::new();
        store.create_user(NewPrincipal::new("alice")).await.unwrap();
        let err = store.create_user(NewPrincipal::new("alice")).await.unwrap_err();
        assert!(matches!(err, KeelsonError::Conflict { .. }));
    }

    #[tokio::test]
    async fn role_and_group_bindings_are_idempotent() {
        let store = MemoryPrincipalStore::new();
        let issued = store.create_user(NewPrincipal::new("bob")).await.unwrap();
        let id = issued.principal.id;

        store.add_role_binding(&id, GlobalRole::TemplatesCreate).await.unwrap();
        let p = store.add_role_binding(&id, GlobalRole::TemplatesCreate).await.unwrap();
        assert_eq!(p.global_roles, vec![GlobalRole::User, GlobalRole::TemplatesCreate]);

        store.add_group_member("local://g-ops", &id).await.unwrap();
        let p = store.add_group_member("local://g-ops", &id).await.unwrap();
        assert_eq!(p.group_principal_ids, vec!["local://g-ops".to_string()]);

        let missing = PrincipalId::new();
        assert!(matches!(
            store.add_role_binding(&missing, GlobalRole::Admin).await,
            Err(KeelsonError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn ensure_admin_is_idempotent() {
        let store = MemoryPrincipalStore::new();
        let token = "kls_bootstrap_token_0123456789abcdef";

        let first = store.ensure_admin("admin", token).await.unwrap();
        let second = store.ensure_admin("admin", token).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(second.has_role(GlobalRole::Admin));

        let found =
            store.find_by_token_digest(&hashing::token_digest(token)).await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
    }
}
