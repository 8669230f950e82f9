//! PostgreSQL principal store.
//!
//! Users, token digests, global role bindings and group memberships live in
//! their own tables. Principal ids are generated once and persisted, so the
//! `local://u-…` entries in template ACLs and the `creator_id` of templates
//! keep resolving to the same user across restarts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgExecutor};
use tracing::{error, info, instrument};
use validator::Validate;

use crate::auth::{generate_token, token_digest};
use crate::auth::principal_store::{
    initial_roles, username_taken, validate_group_principal_id, IssuedPrincipal, NewPrincipal,
    PrincipalStore,
};
use crate::domain::{GlobalRole, Principal, PrincipalId};
use crate::errors::{KeelsonError, Result};
use crate::storage::DbPool;

const USER_RESOURCE: &str = "User";

const PRINCIPAL_SELECT: &str = "SELECT p.id, p.username, p.display_name, p.created_at, \
     ARRAY(SELECT r.role FROM global_role_bindings r WHERE r.principal_id = p.id ORDER BY r.seq) \
     AS global_roles, \
     ARRAY(SELECT g.group_principal_id FROM group_memberships g WHERE g.principal_id = p.id \
     ORDER BY g.seq) AS group_principal_ids \
     FROM principals p";

#[derive(Debug, Clone, FromRow)]
struct PrincipalRow {
    id: String,
    username: String,
    display_name: Option<String>,
    created_at: DateTime<Utc>,
    global_roles: Vec<String>,
    group_principal_ids: Vec<String>,
}

impl TryFrom<PrincipalRow> for Principal {
    type Error = KeelsonError;

    fn try_from(row: PrincipalRow) -> Result<Self> {
        let global_roles = row
            .global_roles
            .iter()
            .map(|role| role.parse::<GlobalRole>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| {
                KeelsonError::internal(format!("user '{}' has corrupt role binding: {}", row.id, e))
            })?;

        let id = PrincipalId::from_string(row.id);
        Ok(Self {
            principal_ids: vec![Principal::local_principal_id(&id)],
            id,
            username: row.username,
            display_name: row.display_name,
            group_principal_ids: row.group_principal_ids,
            global_roles,
            created_at: row.created_at,
        })
    }
}

/// Lookup key for [`fetch_principal`].
#[derive(Debug, Clone, Copy)]
enum PrincipalKey<'a> {
    Id(&'a PrincipalId),
    Username(&'a str),
    TokenDigest(&'a str),
}

fn db_error(e: sqlx::Error, context: impl Into<String>) -> KeelsonError {
    let context = context.into();
    error!(error = %e, context = %context, "principal store query failed");
    KeelsonError::database(e, context)
}

async fn fetch_principal<'e, E: PgExecutor<'e>>(
    executor: E,
    key: PrincipalKey<'_>,
) -> Result<Option<Principal>> {
    let (sql, value) = match key {
        PrincipalKey::Id(id) => (format!("{} WHERE p.id = $1", PRINCIPAL_SELECT), id.as_str()),
        PrincipalKey::Username(username) => {
            (format!("{} WHERE p.username = $1", PRINCIPAL_SELECT), username)
        }
        PrincipalKey::TokenDigest(digest) => (
            format!(
                "{} JOIN principal_tokens t ON t.principal_id = p.id WHERE t.token_digest = $1",
                PRINCIPAL_SELECT
            ),
            digest,
        ),
    };

    let row = sqlx::query_as::<sqlx::Postgres, PrincipalRow>(&sql)
        .bind(value)
        .fetch_optional(executor)
        .await
        .map_err(|e| db_error(e, "Failed to load user"))?;
    row.map(Principal::try_from).transpose()
}

async fn require_principal(conn: &mut PgConnection, id: &PrincipalId) -> Result<Principal> {
    fetch_principal(conn, PrincipalKey::Id(id))
        .await?
        .ok_or_else(|| KeelsonError::not_found(USER_RESOURCE, id.as_str()))
}

/// Insert a principal row with its initial role bindings.
async fn insert_principal(conn: &mut PgConnection, request: NewPrincipal) -> Result<PrincipalId> {
    let id = PrincipalId::new();
    let inserted = sqlx::query(
        "INSERT INTO principals (id, username, display_name, created_at) VALUES ($1, $2, $3, $4) \
         ON CONFLICT (username) DO NOTHING",
    )
    .bind(&id)
    .bind(&request.username)
    .bind(&request.display_name)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .map_err(|e| db_error(e, format!("Failed to insert user '{}'", request.username)))?;

    if inserted.rows_affected() == 0 {
        return Err(username_taken(&request.username));
    }

    for role in initial_roles(request.global_roles) {
        bind_role(&mut *conn, &id, role).await?;
    }
    Ok(id)
}

async fn bind_role(conn: &mut PgConnection, id: &PrincipalId, role: GlobalRole) -> Result<()> {
    sqlx::query(
        "INSERT INTO global_role_bindings (principal_id, role) VALUES ($1, $2) \
         ON CONFLICT (principal_id, role) DO NOTHING",
    )
    .bind(id)
    .bind(role.as_str())
    .execute(conn)
    .await
    .map_err(|e| db_error(e, format!("Failed to bind role '{}' to user '{}'", role, id)))?;
    Ok(())
}

async fn store_token(conn: &mut PgConnection, id: &PrincipalId, token: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO principal_tokens (token_digest, principal_id) VALUES ($1, $2) \
         ON CONFLICT (token_digest) DO UPDATE SET principal_id = EXCLUDED.principal_id",
    )
    .bind(token_digest(token))
    .bind(id)
    .execute(conn)
    .await
    .map_err(|e| db_error(e, format!("Failed to store token for user '{}'", id)))?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgPrincipalStore {
    pool: DbPool,
}

impl PgPrincipalStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::Postgres>> {
        self.pool.begin().await.map_err(|e| db_error(e, "Failed to begin transaction"))
    }
}

async fn commit(tx: sqlx::Transaction<'static, sqlx::Postgres>) -> Result<()> {
    tx.commit().await.map_err(|e| db_error(e, "Failed to commit transaction"))
}

#[async_trait]
impl PrincipalStore for PgPrincipalStore {
    #[instrument(skip(self, request), fields(username = %request.username), name = "db_create_user")]
    async fn create_user(&self, request: NewPrincipal) -> Result<IssuedPrincipal> {
        request.validate()?;

        let mut tx = self.begin().await?;
        let id = insert_principal(&mut tx, request).await?;
        let token = generate_token();
        store_token(&mut tx, &id, &token).await?;
        let principal = require_principal(&mut tx, &id).await?;
        commit(tx).await?;

        info!(principal_id = %principal.id, roles = ?principal.global_roles, "user provisioned");
        Ok(IssuedPrincipal { principal, token })
    }

    async fn register_token(&self, id: &PrincipalId, token: &str) -> Result<()> {
        let mut tx = self.begin().await?;
        require_principal(&mut tx, id).await?;
        store_token(&mut tx, id, token).await?;
        commit(tx).await
    }

    async fn get(&self, id: &PrincipalId) -> Result<Principal> {
        fetch_principal(&self.pool, PrincipalKey::Id(id))
            .await?
            .ok_or_else(|| KeelsonError::not_found(USER_RESOURCE, id.as_str()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Principal>> {
        fetch_principal(&self.pool, PrincipalKey::Username(username)).await
    }

    async fn find_by_token_digest(&self, digest: &str) -> Result<Option<Principal>> {
        fetch_principal(&self.pool, PrincipalKey::TokenDigest(digest)).await
    }

    #[instrument(skip_all, fields(principal_id = %id, role = %role), name = "db_add_role")]
    async fn add_role_binding(&self, id: &PrincipalId, role: GlobalRole) -> Result<Principal> {
        let mut tx = self.begin().await?;
        require_principal(&mut tx, id).await?;
        bind_role(&mut tx, id, role).await?;
        let principal = require_principal(&mut tx, id).await?;
        commit(tx).await?;

        info!(principal_id = %id, role = %role, "global role bound");
        Ok(principal)
    }

    #[instrument(
        skip_all,
        fields(principal_id = %id, group_principal_id = %group_principal_id),
        name = "db_add_group_member"
    )]
    async fn add_group_member(
        &self,
        group_principal_id: &str,
        id: &PrincipalId,
    ) -> Result<Principal> {
        validate_group_principal_id(group_principal_id)?;

        let mut tx = self.begin().await?;
        require_principal(&mut tx, id).await?;
        sqlx::query(
            "INSERT INTO group_memberships (group_principal_id, principal_id) VALUES ($1, $2) \
             ON CONFLICT (principal_id, group_principal_id) DO NOTHING",
        )
        .bind(group_principal_id)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error(e, format!("Failed to add user '{}' to group", id)))?;
        let principal = require_principal(&mut tx, id).await?;
        commit(tx).await?;
        Ok(principal)
    }

    #[instrument(skip(self, token), name = "db_ensure_admin")]
    async fn ensure_admin(&self, username: &str, token: &str) -> Result<Principal> {
        let mut tx = self.begin().await?;
        let id = match fetch_principal(&mut *tx, PrincipalKey::Username(username)).await? {
            Some(existing) => {
                bind_role(&mut tx, &existing.id, GlobalRole::Admin).await?;
                existing.id
            }
            None => {
                let request = NewPrincipal::new(username).with_role(GlobalRole::Admin);
                request.validate()?;
                insert_principal(&mut tx, request).await?
            }
        };
        store_token(&mut tx, &id, token).await?;
        let principal = require_principal(&mut tx, &id).await?;
        commit(tx).await?;

        info!(principal_id = %principal.id, username = %username, "bootstrap admin ready");
        Ok(principal)
    }
}
