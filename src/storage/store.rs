//! The template store contract and the rules every backend applies.
//!
//! A single trait covers templates, revisions and clusters so that each
//! mutation can run the gate check, the reference checks and the write as
//! one atomic unit inside whatever isolation the backend offers. The pure
//! `prepare_*` / `apply_*` functions here hold the rules themselves; backends
//! only load rows, call them, and persist the result.

use async_trait::async_trait;
use chrono::Utc;
use validator::Validate;

use crate::auth::authorization::{authorize, cluster_visible, require_global_role, TemplateAction};
use crate::auth::AuthContext;
use crate::binder;
use crate::domain::{
    validate_members, AccessType, Answers, Cluster, ClusterId, ClusterState, GlobalRole,
    NewCluster, NewRevision, NewTemplate, Revision, RevisionId, Template, TemplateId,
    TemplateUpdate,
};
use crate::errors::{KeelsonError, Result};

pub const TEMPLATE_RESOURCE: &str = "ClusterTemplate";
pub const REVISION_RESOURCE: &str = "ClusterTemplateRevision";
pub const CLUSTER_RESOURCE: &str = "Cluster";

/// Result of publishing a reconcile for a given generation.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// The desired spec for this generation is now the applied spec.
    Applied(Cluster),
    /// A newer spec change superseded this reconcile.
    Stale { current_generation: i64 },
    /// The cluster was deleted before the reconcile ran.
    Gone,
}

impl ReconcileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied(_) => "applied",
            ReconcileOutcome::Stale { .. } => "stale",
            ReconcileOutcome::Gone => "gone",
        }
    }
}

#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn create_template(&self, ctx: &AuthContext, request: NewTemplate) -> Result<Template>;

    async fn get_template(&self, ctx: &AuthContext, id: &TemplateId) -> Result<Template>;

    /// Templates the caller holds any access on.
    async fn list_templates(&self, ctx: &AuthContext) -> Result<Vec<Template>>;

    async fn update_template(
        &self,
        ctx: &AuthContext,
        id: &TemplateId,
        update: TemplateUpdate,
    ) -> Result<Template>;

    /// Delete a template and, by cascade, all of its revisions.
    async fn delete_template(&self, ctx: &AuthContext, id: &TemplateId) -> Result<()>;

    async fn create_revision(
        &self,
        ctx: &AuthContext,
        template_id: &TemplateId,
        request: NewRevision,
    ) -> Result<Revision>;

    async fn get_revision(&self, ctx: &AuthContext, id: &RevisionId) -> Result<Revision>;

    async fn list_revisions(
        &self,
        ctx: &AuthContext,
        template_id: &TemplateId,
    ) -> Result<Vec<Revision>>;

    async fn set_revision_enabled(
        &self,
        ctx: &AuthContext,
        id: &RevisionId,
        enabled: bool,
    ) -> Result<Revision>;

    async fn delete_revision(&self, ctx: &AuthContext, id: &RevisionId) -> Result<()>;

    async fn create_cluster(&self, ctx: &AuthContext, request: NewCluster) -> Result<Cluster>;

    async fn get_cluster(&self, ctx: &AuthContext, id: &ClusterId) -> Result<Cluster>;

    async fn list_clusters(&self, ctx: &AuthContext) -> Result<Vec<Cluster>>;

    /// Re-bind a cluster onto another revision of the same template.
    async fn set_cluster_revision(
        &self,
        ctx: &AuthContext,
        id: &ClusterId,
        revision_id: &RevisionId,
        answers: Option<Answers>,
    ) -> Result<Cluster>;

    async fn delete_cluster(&self, ctx: &AuthContext, id: &ClusterId) -> Result<()>;

    /// Clusters still converging, across all owners, oldest first.
    ///
    /// Used at startup to re-drive reconciles that were pending when the
    /// previous process stopped.
    async fn list_pending_clusters(&self) -> Result<Vec<Cluster>>;

    /// Publish the desired spec of `generation` as applied, unless superseded.
    async fn complete_reconcile(&self, id: &ClusterId, generation: i64) -> Result<ReconcileOutcome>;
}

/// Authorize and build a new template owned by the caller.
pub(crate) fn prepare_template(ctx: &AuthContext, request: NewTemplate) -> Result<Template> {
    require_global_role(ctx, GlobalRole::TemplatesCreate)?;
    request.validate()?;
    validate_members(&request.members)?;

    let now = Utc::now();
    Ok(Template {
        id: TemplateId::new(),
        name: request.name,
        description: request.description,
        creator_id: ctx.principal_id.clone(),
        members: request.members,
        default_revision_id: None,
        created_at: now,
        updated_at: now,
    })
}

/// The gate action an update maps to. Pure member replacement is its own action.
pub(crate) fn update_action(update: &TemplateUpdate) -> TemplateAction {
    let members_only = update.touches_members()
        && update.name.is_none()
        && update.description.is_none()
        && update.default_revision_id.is_none();

    if members_only {
        TemplateAction::ManageMembers
    } else {
        TemplateAction::Update
    }
}

/// Validate and apply an update in place.
///
/// `owns_revision` answers whether a revision id belongs to this template.
pub(crate) fn apply_template_update<F>(
    template: &mut Template,
    update: TemplateUpdate,
    owns_revision: F,
) -> Result<()>
where
    F: Fn(&RevisionId) -> bool,
{
    update.validate()?;

    if let Some(members) = &update.members {
        validate_members(members)?;
    }

    if let Some(Some(revision_id)) = &update.default_revision_id {
        if !owns_revision(revision_id) {
            return Err(KeelsonError::validation_field(
                format!(
                    "revision '{}' does not belong to template '{}'",
                    revision_id, template.id
                ),
                "defaultRevisionId",
            ));
        }
    }

    if let Some(name) = update.name {
        template.name = name;
    }
    if let Some(description) = update.description {
        template.description = Some(description);
    }
    if let Some(members) = update.members {
        template.members = members;
    }
    if let Some(default_revision_id) = update.default_revision_id {
        template.default_revision_id = default_revision_id;
    }
    template.updated_at = Utc::now();

    Ok(())
}

/// Authorize and build a revision under a loaded (or absent) template.
pub(crate) fn prepare_revision(
    ctx: &AuthContext,
    template: Option<&Template>,
    template_id: &TemplateId,
    request: NewRevision,
) -> Result<Revision> {
    authorize(ctx, template, TemplateAction::CreateRevision, TEMPLATE_RESOURCE, template_id.as_str())?;
    request.validate_payload()?;

    let now = Utc::now();
    Ok(Revision {
        id: RevisionId::new(),
        template_id: template_id.clone(),
        name: request.name,
        cluster_config: request.cluster_config,
        questions: request.questions,
        enabled: request.enabled.unwrap_or(true),
        creator_id: ctx.principal_id.clone(),
        created_at: now,
        updated_at: now,
    })
}

/// Gate an action on a revision through its parent template.
///
/// A missing revision and an invisible one are indistinguishable to the caller.
pub(crate) fn authorize_revision(
    ctx: &AuthContext,
    revision: Option<&Revision>,
    template: Option<&Template>,
    action: TemplateAction,
    revision_id: &RevisionId,
) -> Result<AccessType> {
    let template = revision.and(template);
    authorize(ctx, template, action, REVISION_RESOURCE, revision_id.as_str())
}

fn require_enabled(revision: &Revision) -> Result<()> {
    if !revision.enabled {
        return Err(KeelsonError::validation_field(
            format!("revision '{}' is disabled", revision.id),
            "clusterTemplateRevisionId",
        ));
    }
    Ok(())
}

/// Authorize, bind and build a new cluster.
pub(crate) fn prepare_cluster(
    ctx: &AuthContext,
    revision: Option<&Revision>,
    template: Option<&Template>,
    request: NewCluster,
) -> Result<Cluster> {
    request.validate()?;
    authorize_revision(
        ctx,
        revision,
        template,
        TemplateAction::UseRevision,
        &request.cluster_template_revision_id,
    )?;
    let revision = revision.ok_or_else(|| {
        KeelsonError::not_found(REVISION_RESOURCE, request.cluster_template_revision_id.as_str())
    })?;
    require_enabled(revision)?;

    let answers = request.answers.unwrap_or_default();
    let desired_spec = binder::bind(revision, &answers)?;

    let now = Utc::now();
    Ok(Cluster {
        id: ClusterId::new(),
        name: request.name,
        owner_id: ctx.principal_id.clone(),
        template_id: revision.template_id.clone(),
        revision_id: revision.id.clone(),
        answers,
        desired_spec,
        applied_spec: None,
        state: ClusterState::Provisioning,
        generation: 1,
        created_at: now,
        updated_at: now,
    })
}

/// Clusters are gated on ownership rather than on the template ACL.
pub(crate) fn authorize_cluster<'a>(
    ctx: &AuthContext,
    cluster: Option<&'a Cluster>,
    id: &ClusterId,
) -> Result<&'a Cluster> {
    match cluster {
        Some(cluster) if cluster_visible(ctx, cluster) => Ok(cluster),
        _ => Err(KeelsonError::not_found(CLUSTER_RESOURCE, id.as_str())),
    }
}

/// Re-bind `cluster` onto `revision` in place, moving it to `updating`.
///
/// Without explicit answers, previous answers are carried over for the
/// variables the new revision still declares.
pub(crate) fn apply_revision_switch(
    ctx: &AuthContext,
    cluster: &mut Cluster,
    revision: Option<&Revision>,
    template: Option<&Template>,
    revision_id: &RevisionId,
    answers: Option<Answers>,
) -> Result<()> {
    authorize_revision(ctx, revision, template, TemplateAction::UseRevision, revision_id)?;
    let revision =
        revision.ok_or_else(|| KeelsonError::not_found(REVISION_RESOURCE, revision_id.as_str()))?;

    if revision.template_id != cluster.template_id {
        return Err(KeelsonError::validation_field(
            format!(
                "revision '{}' belongs to template '{}', cluster uses template '{}'",
                revision.id, revision.template_id, cluster.template_id
            ),
            "clusterTemplateRevisionId",
        ));
    }
    require_enabled(revision)?;

    let answers = answers.unwrap_or_else(|| Answers {
        values: cluster
            .answers
            .values
            .iter()
            .filter(|(variable, _)| revision.question(variable).is_some())
            .map(|(variable, value)| (variable.clone(), value.clone()))
            .collect(),
    });

    cluster.desired_spec = binder::bind(revision, &answers)?;
    cluster.revision_id = revision.id.clone();
    cluster.answers = answers;
    cluster.state = ClusterState::Updating;
    cluster.generation += 1;
    cluster.updated_at = Utc::now();
    Ok(())
}

/// Publish a reconcile in place if `generation` is still current.
pub(crate) fn apply_reconcile(cluster: &mut Cluster, generation: i64) -> bool {
    if cluster.generation != generation {
        return false;
    }
    cluster.applied_spec = Some(cluster.desired_spec.clone());
    cluster.state = ClusterState::Active;
    cluster.updated_at = Utc::now();
    true
}

pub(crate) fn revision_in_use(revision_id: &RevisionId) -> KeelsonError {
    KeelsonError::conflict(
        format!("revision '{}' is referenced by one or more clusters", revision_id),
        REVISION_RESOURCE,
    )
}

pub(crate) fn template_in_use(template_id: &TemplateId) -> KeelsonError {
    KeelsonError::conflict(
        format!("template '{}' has revisions referenced by one or more clusters", template_id),
        TEMPLATE_RESOURCE,
    )
}

/// Stable listing order: oldest first, id as tie-breaker.
pub(crate) fn sort_by_creation<T, F>(items: &mut [T], key: F)
where
    F: Fn(&T) -> (chrono::DateTime<Utc>, String),
{
    items.sort_by_key(key);
}
