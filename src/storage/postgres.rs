//! PostgreSQL template store.
//!
//! Every mutation runs in one transaction. The parent template row is locked
//! (`FOR UPDATE` for template and revision mutations, `FOR SHARE` when binding
//! clusters) before the gate check, so the ACL the decision was made against
//! cannot change until commit. Cluster rows are locked `FOR UPDATE` before a
//! revision switch or delete.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgExecutor};
use tracing::{error, info, instrument};

use crate::auth::authorization::{authorize, effective_access, TemplateAction};
use crate::auth::AuthContext;
use crate::domain::{
    Answers, Cluster, ClusterId, ClusterState, Member, NewCluster, NewRevision, NewTemplate,
    PrincipalId, Question, Revision, RevisionId, Template, TemplateId, TemplateUpdate,
};
use crate::errors::{KeelsonError, Result};
use crate::storage::store::{
    apply_reconcile, apply_revision_switch, apply_template_update, authorize_cluster,
    authorize_revision, prepare_cluster, prepare_revision, prepare_template, revision_in_use,
    template_in_use, update_action, ReconcileOutcome, TemplateStore, REVISION_RESOURCE,
    TEMPLATE_RESOURCE,
};
use crate::storage::DbPool;

const TEMPLATE_COLUMNS: &str =
    "id, name, description, creator_id, members, default_revision_id, created_at, updated_at";

const REVISION_COLUMNS: &str = "id, template_id, name, cluster_config, questions, enabled, \
     creator_id, created_at, updated_at";

const CLUSTER_COLUMNS: &str = "id, name, owner_id, template_id, revision_id, answers, \
     desired_spec, applied_spec, state, generation, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
struct TemplateRow {
    id: String,
    name: String,
    description: Option<String>,
    creator_id: String,
    members: Json<Vec<Member>>,
    default_revision_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TemplateRow> for Template {
    fn from(row: TemplateRow) -> Self {
        Self {
            id: TemplateId::from_string(row.id),
            name: row.name,
            description: row.description,
            creator_id: PrincipalId::from_string(row.creator_id),
            members: row.members.0,
            default_revision_id: row.default_revision_id.map(RevisionId::from_string),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct RevisionRow {
    id: String,
    template_id: String,
    name: String,
    cluster_config: Value,
    questions: Json<Vec<Question>>,
    enabled: bool,
    creator_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RevisionRow> for Revision {
    fn from(row: RevisionRow) -> Self {
        Self {
            id: RevisionId::from_string(row.id),
            template_id: TemplateId::from_string(row.template_id),
            name: row.name,
            cluster_config: row.cluster_config,
            questions: row.questions.0,
            enabled: row.enabled,
            creator_id: PrincipalId::from_string(row.creator_id),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct ClusterRow {
    id: String,
    name: String,
    owner_id: String,
    template_id: String,
    revision_id: String,
    answers: Json<Answers>,
    desired_spec: Value,
    applied_spec: Option<Value>,
    state: String,
    generation: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ClusterRow> for Cluster {
    type Error = KeelsonError;

    fn try_from(row: ClusterRow) -> Result<Self> {
        let state = row.state.parse::<ClusterState>().map_err(|e| {
            KeelsonError::internal(format!("cluster '{}' has corrupt state: {}", row.id, e))
        })?;

        Ok(Self {
            id: ClusterId::from_string(row.id),
            name: row.name,
            owner_id: PrincipalId::from_string(row.owner_id),
            template_id: TemplateId::from_string(row.template_id),
            revision_id: RevisionId::from_string(row.revision_id),
            answers: row.answers.0,
            desired_spec: row.desired_spec,
            applied_spec: row.applied_spec,
            state,
            generation: row.generation,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Row lock taken while reading a row inside a transaction.
#[derive(Debug, Clone, Copy)]
enum RowLock {
    None,
    Share,
    Update,
}

impl RowLock {
    fn clause(&self) -> &'static str {
        match self {
            RowLock::None => "",
            RowLock::Share => " FOR SHARE",
            RowLock::Update => " FOR UPDATE",
        }
    }
}

/// Wrap a sqlx error, reporting foreign-key violations as conflicts.
fn db_error(e: sqlx::Error, context: impl Into<String>) -> KeelsonError {
    let context = context.into();
    if e.as_database_error().is_some_and(|db| db.is_foreign_key_violation()) {
        return KeelsonError::conflict(context, REVISION_RESOURCE);
    }
    error!(error = %e, context = %context, "template store query failed");
    KeelsonError::database(e, context)
}

async fn fetch_template<'e, E: PgExecutor<'e>>(
    executor: E,
    id: &TemplateId,
    lock: RowLock,
) -> Result<Option<Template>> {
    let sql =
        format!("SELECT {} FROM cluster_templates WHERE id = $1{}", TEMPLATE_COLUMNS, lock.clause());
    let row = sqlx::query_as::<sqlx::Postgres, TemplateRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(|e| db_error(e, format!("Failed to load template '{}'", id)))?;
    Ok(row.map(Template::from))
}

async fn fetch_revision<'e, E: PgExecutor<'e>>(
    executor: E,
    id: &RevisionId,
) -> Result<Option<Revision>> {
    let sql = format!("SELECT {} FROM cluster_template_revisions WHERE id = $1", REVISION_COLUMNS);
    let row = sqlx::query_as::<sqlx::Postgres, RevisionRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(|e| db_error(e, format!("Failed to load revision '{}'", id)))?;
    Ok(row.map(Revision::from))
}

async fn fetch_cluster<'e, E: PgExecutor<'e>>(
    executor: E,
    id: &ClusterId,
    lock: RowLock,
) -> Result<Option<Cluster>> {
    let sql = format!("SELECT {} FROM clusters WHERE id = $1{}", CLUSTER_COLUMNS, lock.clause());
    let row = sqlx::query_as::<sqlx::Postgres, ClusterRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(|e| db_error(e, format!("Failed to load cluster '{}'", id)))?;
    row.map(Cluster::try_from).transpose()
}

#[derive(Debug, Clone)]
pub struct PgTemplateStore {
    pool: DbPool,
}

impl PgTemplateStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Load a revision together with its parent template.
    async fn revision_with_template(
        &self,
        conn: &mut sqlx::PgConnection,
        id: &RevisionId,
        lock: RowLock,
    ) -> Result<(Option<Revision>, Option<Template>)> {
        let Some(revision) = fetch_revision(&mut *conn, id).await? else {
            return Ok((None, None));
        };
        let template = fetch_template(&mut *conn, &revision.template_id, lock).await?;
        Ok((Some(revision), template))
    }

    async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::Postgres>> {
        self.pool.begin().await.map_err(|e| db_error(e, "Failed to begin transaction"))
    }
}

async fn commit(tx: sqlx::Transaction<'static, sqlx::Postgres>) -> Result<()> {
    tx.commit().await.map_err(|e| db_error(e, "Failed to commit transaction"))
}

#[async_trait]
impl TemplateStore for PgTemplateStore {
    #[instrument(skip_all, fields(principal_id = %ctx.principal_id), name = "db_create_template")]
    async fn create_template(&self, ctx: &AuthContext, request: NewTemplate) -> Result<Template> {
        let template = prepare_template(ctx, request)?;

        let sql = format!(
            "INSERT INTO cluster_templates ({cols}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {cols}",
            cols = TEMPLATE_COLUMNS
        );
        let row = sqlx::query_as::<sqlx::Postgres, TemplateRow>(&sql)
            .bind(&template.id)
            .bind(&template.name)
            .bind(&template.description)
            .bind(&template.creator_id)
            .bind(Json(&template.members))
            .bind(&template.default_revision_id)
            .bind(template.created_at)
            .bind(template.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error(e, format!("Failed to create template '{}'", template.name)))?;

        info!(template_id = %template.id, "template created");
        Ok(row.into())
    }

    #[instrument(skip(self, ctx), fields(principal_id = %ctx.principal_id), name = "db_get_template")]
    async fn get_template(&self, ctx: &AuthContext, id: &TemplateId) -> Result<Template> {
        let template = fetch_template(&self.pool, id, RowLock::None).await?;
        authorize(ctx, template.as_ref(), TemplateAction::View, TEMPLATE_RESOURCE, id.as_str())?;
        template.ok_or_else(|| KeelsonError::not_found(TEMPLATE_RESOURCE, id.as_str()))
    }

    #[instrument(skip_all, fields(principal_id = %ctx.principal_id), name = "db_list_templates")]
    async fn list_templates(&self, ctx: &AuthContext) -> Result<Vec<Template>> {
        let sql =
            format!("SELECT {} FROM cluster_templates ORDER BY created_at, id", TEMPLATE_COLUMNS);
        let rows = sqlx::query_as::<sqlx::Postgres, TemplateRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error(e, "Failed to list templates"))?;

        Ok(rows
            .into_iter()
            .map(Template::from)
            .filter(|t| effective_access(ctx, t).is_some())
            .collect())
    }

    #[instrument(skip(self, ctx, update), fields(principal_id = %ctx.principal_id), name = "db_update_template")]
    async fn update_template(
        &self,
        ctx: &AuthContext,
        id: &TemplateId,
        update: TemplateUpdate,
    ) -> Result<Template> {
        let mut tx = self.begin().await?;

        let template = fetch_template(&mut *tx, id, RowLock::Update).await?;
        authorize(ctx, template.as_ref(), update_action(&update), TEMPLATE_RESOURCE, id.as_str())?;
        let mut template =
            template.ok_or_else(|| KeelsonError::not_found(TEMPLATE_RESOURCE, id.as_str()))?;

        let new_default_owner = match &update.default_revision_id {
            Some(Some(revision_id)) => {
                fetch_revision(&mut *tx, revision_id).await?.map(|r| r.template_id)
            }
            _ => None,
        };
        apply_template_update(&mut template, update, |_| new_default_owner.as_ref() == Some(id))?;

        let sql = format!(
            "UPDATE cluster_templates SET name = $2, description = $3, members = $4, \
             default_revision_id = $5, updated_at = $6 WHERE id = $1 RETURNING {}",
            TEMPLATE_COLUMNS
        );
        let row = sqlx::query_as::<sqlx::Postgres, TemplateRow>(&sql)
            .bind(id)
            .bind(&template.name)
            .bind(&template.description)
            .bind(Json(&template.members))
            .bind(&template.default_revision_id)
            .bind(template.updated_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_error(e, format!("Failed to update template '{}'", id)))?;

        commit(tx).await?;
        info!(template_id = %id, "template updated");
        Ok(row.into())
    }

    #[instrument(skip(self, ctx), fields(principal_id = %ctx.principal_id), name = "db_delete_template")]
    async fn delete_template(&self, ctx: &AuthContext, id: &TemplateId) -> Result<()> {
        let mut tx = self.begin().await?;

        let template = fetch_template(&mut *tx, id, RowLock::Update).await?;
        authorize(ctx, template.as_ref(), TemplateAction::DeleteTemplate, TEMPLATE_RESOURCE, id.as_str())?;

        let referenced: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM clusters WHERE template_id = $1)")
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| db_error(e, format!("Failed to check references to template '{}'", id)))?;
        if referenced {
            return Err(template_in_use(id));
        }

        sqlx::query("DELETE FROM cluster_templates WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| match db_error(e, format!("Failed to delete template '{}'", id)) {
                KeelsonError::Conflict { .. } => template_in_use(id),
                other => other,
            })?;

        commit(tx).await?;
        info!(template_id = %id, "template deleted");
        Ok(())
    }

    #[instrument(skip(self, ctx, request), fields(principal_id = %ctx.principal_id), name = "db_create_revision")]
    async fn create_revision(
        &self,
        ctx: &AuthContext,
        template_id: &TemplateId,
        request: NewRevision,
    ) -> Result<Revision> {
        let mut tx = self.begin().await?;

        let template = fetch_template(&mut *tx, template_id, RowLock::Update).await?;
        let revision = prepare_revision(ctx, template.as_ref(), template_id, request)?;

        let sql = format!(
            "INSERT INTO cluster_template_revisions ({cols}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {cols}",
            cols = REVISION_COLUMNS
        );
        let row = sqlx::query_as::<sqlx::Postgres, RevisionRow>(&sql)
            .bind(&revision.id)
            .bind(&revision.template_id)
            .bind(&revision.name)
            .bind(&revision.cluster_config)
            .bind(Json(&revision.questions))
            .bind(revision.enabled)
            .bind(&revision.creator_id)
            .bind(revision.created_at)
            .bind(revision.updated_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_error(e, format!("Failed to create revision '{}'", revision.name)))?;

        commit(tx).await?;
        info!(template_id = %template_id, revision_id = %revision.id, "revision created");
        Ok(row.into())
    }

    #[instrument(skip(self, ctx), fields(principal_id = %ctx.principal_id), name = "db_get_revision")]
    async fn get_revision(&self, ctx: &AuthContext, id: &RevisionId) -> Result<Revision> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| db_error(e, "Failed to acquire connection"))?;
        let (revision, template) = self.revision_with_template(&mut conn, id, RowLock::None).await?;
        authorize_revision(ctx, revision.as_ref(), template.as_ref(), TemplateAction::View, id)?;
        revision.ok_or_else(|| KeelsonError::not_found(REVISION_RESOURCE, id.as_str()))
    }

    #[instrument(skip(self, ctx), fields(principal_id = %ctx.principal_id), name = "db_list_revisions")]
    async fn list_revisions(
        &self,
        ctx: &AuthContext,
        template_id: &TemplateId,
    ) -> Result<Vec<Revision>> {
        let template = fetch_template(&self.pool, template_id, RowLock::None).await?;
        authorize(
            ctx,
            template.as_ref(),
            TemplateAction::View,
            TEMPLATE_RESOURCE,
            template_id.as_str(),
        )?;

        let sql = format!(
            "SELECT {} FROM cluster_template_revisions WHERE template_id = $1 ORDER BY created_at, id",
            REVISION_COLUMNS
        );
        let rows = sqlx::query_as::<sqlx::Postgres, RevisionRow>(&sql)
            .bind(template_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error(e, format!("Failed to list revisions of '{}'", template_id)))?;

        Ok(rows.into_iter().map(Revision::from).collect())
    }

    #[instrument(skip(self, ctx), fields(principal_id = %ctx.principal_id), name = "db_set_revision_enabled")]
    async fn set_revision_enabled(
        &self,
        ctx: &AuthContext,
        id: &RevisionId,
        enabled: bool,
    ) -> Result<Revision> {
        let mut tx = self.begin().await?;

        let (revision, template) = self.revision_with_template(&mut tx, id, RowLock::Update).await?;
        authorize_revision(
            ctx,
            revision.as_ref(),
            template.as_ref(),
            TemplateAction::SetRevisionEnabled,
            id,
        )?;

        let sql = format!(
            "UPDATE cluster_template_revisions SET enabled = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            REVISION_COLUMNS
        );
        let row = sqlx::query_as::<sqlx::Postgres, RevisionRow>(&sql)
            .bind(id)
            .bind(enabled)
            .bind(Utc::now())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error(e, format!("Failed to update revision '{}'", id)))?
            .ok_or_else(|| KeelsonError::not_found(REVISION_RESOURCE, id.as_str()))?;

        commit(tx).await?;
        info!(revision_id = %id, enabled, "revision enabled flag set");
        Ok(row.into())
    }

    #[instrument(skip(self, ctx), fields(principal_id = %ctx.principal_id), name = "db_delete_revision")]
    async fn delete_revision(&self, ctx: &AuthContext, id: &RevisionId) -> Result<()> {
        let mut tx = self.begin().await?;

        let (revision, template) = self.revision_with_template(&mut tx, id, RowLock::Update).await?;
        authorize_revision(
            ctx,
            revision.as_ref(),
            template.as_ref(),
            TemplateAction::DeleteRevision,
            id,
        )?;
        let revision =
            revision.ok_or_else(|| KeelsonError::not_found(REVISION_RESOURCE, id.as_str()))?;

        let referenced: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM clusters WHERE revision_id = $1)")
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| db_error(e, format!("Failed to check references to revision '{}'", id)))?;
        if referenced {
            return Err(revision_in_use(id));
        }

        sqlx::query(
            "UPDATE cluster_templates SET default_revision_id = NULL, updated_at = $3 \
             WHERE id = $1 AND default_revision_id = $2",
        )
        .bind(&revision.template_id)
        .bind(id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error(e, format!("Failed to clear default revision '{}'", id)))?;

        sqlx::query("DELETE FROM cluster_template_revisions WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| match db_error(e, format!("Failed to delete revision '{}'", id)) {
                KeelsonError::Conflict { .. } => revision_in_use(id),
                other => other,
            })?;

        commit(tx).await?;
        info!(revision_id = %id, "revision deleted");
        Ok(())
    }

    #[instrument(skip_all, fields(principal_id = %ctx.principal_id), name = "db_create_cluster")]
    async fn create_cluster(&self, ctx: &AuthContext, request: NewCluster) -> Result<Cluster> {
        let mut tx = self.begin().await?;

        let (revision, template) = self
            .revision_with_template(&mut tx, &request.cluster_template_revision_id, RowLock::Share)
            .await?;
        let cluster = prepare_cluster(ctx, revision.as_ref(), template.as_ref(), request)?;

        let sql = format!(
            "INSERT INTO clusters ({cols}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING {cols}",
            cols = CLUSTER_COLUMNS
        );
        let row = sqlx::query_as::<sqlx::Postgres, ClusterRow>(&sql)
            .bind(&cluster.id)
            .bind(&cluster.name)
            .bind(&cluster.owner_id)
            .bind(&cluster.template_id)
            .bind(&cluster.revision_id)
            .bind(Json(&cluster.answers))
            .bind(&cluster.desired_spec)
            .bind(&cluster.applied_spec)
            .bind(cluster.state.as_str())
            .bind(cluster.generation)
            .bind(cluster.created_at)
            .bind(cluster.updated_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_error(e, format!("Failed to create cluster '{}'", cluster.name)))?;

        commit(tx).await?;
        info!(cluster_id = %cluster.id, revision_id = %cluster.revision_id, "cluster created");
        Cluster::try_from(row)
    }

    #[instrument(skip(self, ctx), fields(principal_id = %ctx.principal_id), name = "db_get_cluster")]
    async fn get_cluster(&self, ctx: &AuthContext, id: &ClusterId) -> Result<Cluster> {
        let cluster = fetch_cluster(&self.pool, id, RowLock::None).await?;
        authorize_cluster(ctx, cluster.as_ref(), id).cloned()
    }

    #[instrument(skip_all, fields(principal_id = %ctx.principal_id), name = "db_list_clusters")]
    async fn list_clusters(&self, ctx: &AuthContext) -> Result<Vec<Cluster>> {
        let rows = if ctx.is_admin() {
            let sql = format!("SELECT {} FROM clusters ORDER BY created_at, id", CLUSTER_COLUMNS);
            sqlx::query_as::<sqlx::Postgres, ClusterRow>(&sql).fetch_all(&self.pool).await
        } else {
            let sql = format!(
                "SELECT {} FROM clusters WHERE owner_id = $1 ORDER BY created_at, id",
                CLUSTER_COLUMNS
            );
            sqlx::query_as::<sqlx::Postgres, ClusterRow>(&sql)
                .bind(&ctx.principal_id)
                .fetch_all(&self.pool)
                .await
        }
        .map_err(|e| db_error(e, "Failed to list clusters"))?;

        rows.into_iter().map(Cluster::try_from).collect()
    }

    #[instrument(skip(self, ctx, answers), fields(principal_id = %ctx.principal_id), name = "db_set_cluster_revision")]
    async fn set_cluster_revision(
        &self,
        ctx: &AuthContext,
        id: &ClusterId,
        revision_id: &RevisionId,
        answers: Option<Answers>,
    ) -> Result<Cluster> {
        let mut tx = self.begin().await?;

        let cluster = fetch_cluster(&mut *tx, id, RowLock::Update).await?;
        let mut cluster = authorize_cluster(ctx, cluster.as_ref(), id)?.clone();

        let (revision, template) =
            self.revision_with_template(&mut tx, revision_id, RowLock::Share).await?;
        apply_revision_switch(
            ctx,
            &mut cluster,
            revision.as_ref(),
            template.as_ref(),
            revision_id,
            answers,
        )?;

        let sql = format!(
            "UPDATE clusters SET revision_id = $2, answers = $3, desired_spec = $4, state = $5, \
             generation = $6, updated_at = $7 WHERE id = $1 RETURNING {}",
            CLUSTER_COLUMNS
        );
        let row = sqlx::query_as::<sqlx::Postgres, ClusterRow>(&sql)
            .bind(id)
            .bind(&cluster.revision_id)
            .bind(Json(&cluster.answers))
            .bind(&cluster.desired_spec)
            .bind(cluster.state.as_str())
            .bind(cluster.generation)
            .bind(cluster.updated_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_error(e, format!("Failed to switch revision of cluster '{}'", id)))?;

        commit(tx).await?;
        info!(
            cluster_id = %id,
            revision_id = %revision_id,
            generation = cluster.generation,
            "cluster revision switched"
        );
        Cluster::try_from(row)
    }

    #[instrument(skip(self, ctx), fields(principal_id = %ctx.principal_id), name = "db_delete_cluster")]
    async fn delete_cluster(&self, ctx: &AuthContext, id: &ClusterId) -> Result<()> {
        let mut tx = self.begin().await?;

        let cluster = fetch_cluster(&mut *tx, id, RowLock::Update).await?;
        authorize_cluster(ctx, cluster.as_ref(), id)?;

        sqlx::query("DELETE FROM clusters WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(e, format!("Failed to delete cluster '{}'", id)))?;

        commit(tx).await?;
        info!(cluster_id = %id, "cluster deleted");
        Ok(())
    }

    #[instrument(skip(self), name = "db_list_pending_clusters")]
    async fn list_pending_clusters(&self) -> Result<Vec<Cluster>> {
        let sql = format!(
            "SELECT {} FROM clusters WHERE state <> $1 ORDER BY created_at, id",
            CLUSTER_COLUMNS
        );
        let rows = sqlx::query_as::<sqlx::Postgres, ClusterRow>(&sql)
            .bind(ClusterState::Active.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error(e, "Failed to list pending clusters"))?;

        rows.into_iter().map(Cluster::try_from).collect()
    }

    #[instrument(skip(self), name = "db_complete_reconcile")]
    async fn complete_reconcile(&self, id: &ClusterId, generation: i64) -> Result<ReconcileOutcome> {
        let mut tx = self.begin().await?;

        let Some(mut cluster) = fetch_cluster(&mut *tx, id, RowLock::Update).await? else {
            return Ok(ReconcileOutcome::Gone);
        };
        if !apply_reconcile(&mut cluster, generation) {
            return Ok(ReconcileOutcome::Stale { current_generation: cluster.generation });
        }

        let sql = format!(
            "UPDATE clusters SET applied_spec = $2, state = $3, updated_at = $4 \
             WHERE id = $1 AND generation = $5 RETURNING {}",
            CLUSTER_COLUMNS
        );
        let row = sqlx::query_as::<sqlx::Postgres, ClusterRow>(&sql)
            .bind(id)
            .bind(&cluster.applied_spec)
            .bind(cluster.state.as_str())
            .bind(cluster.updated_at)
            .bind(generation)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_error(e, format!("Failed to publish reconcile of cluster '{}'", id)))?;

        commit(tx).await?;
        Ok(ReconcileOutcome::Applied(Cluster::try_from(row)?))
    }
}
