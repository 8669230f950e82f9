//! In-process template store.
//!
//! All state sits behind one `RwLock`; every mutation holds the write guard
//! across its gate check, reference checks and write.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::auth::authorization::{authorize, cluster_visible, effective_access, TemplateAction};
use crate::auth::AuthContext;
use crate::domain::{
    Answers, Cluster, ClusterId, NewCluster, NewRevision, NewTemplate, Revision, RevisionId,
    Template, TemplateId, TemplateUpdate,
};
use crate::errors::{KeelsonError, Result};
use crate::storage::store::{
    apply_reconcile, apply_revision_switch, apply_template_update, authorize_cluster,
    authorize_revision, prepare_cluster, prepare_revision, prepare_template, revision_in_use,
    sort_by_creation, template_in_use, update_action, ReconcileOutcome, TemplateStore,
    CLUSTER_RESOURCE, REVISION_RESOURCE, TEMPLATE_RESOURCE,
};

#[derive(Debug, Default)]
struct State {
    templates: HashMap<TemplateId, Template>,
    revisions: HashMap<RevisionId, Revision>,
    clusters: HashMap<ClusterId, Cluster>,
}

impl State {
    /// A revision together with its parent template.
    fn revision_with_template(&self, id: &RevisionId) -> (Option<&Revision>, Option<&Template>) {
        let revision = self.revisions.get(id);
        let template = revision.and_then(|r| self.templates.get(&r.template_id));
        (revision, template)
    }

    fn revision_referenced(&self, id: &RevisionId) -> bool {
        self.clusters.values().any(|c| &c.revision_id == id)
    }

    fn template_referenced(&self, id: &TemplateId) -> bool {
        self.clusters.values().any(|c| &c.template_id == id)
    }
}

#[derive(Debug, Default)]
pub struct MemoryTemplateStore {
    state: RwLock<State>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateStore for MemoryTemplateStore {
    #[instrument(skip_all, fields(principal_id = %ctx.principal_id), name = "mem_create_template")]
    async fn create_template(&self, ctx: &AuthContext, request: NewTemplate) -> Result<Template> {
        let template = prepare_template(ctx, request)?;

        let mut state = self.state.write().await;
        state.templates.insert(template.id.clone(), template.clone());

        info!(template_id = %template.id, "template created");
        Ok(template)
    }

    #[instrument(skip(self, ctx), fields(principal_id = %ctx.principal_id), name = "mem_get_template")]
    async fn get_template(&self, ctx: &AuthContext, id: &TemplateId) -> Result<Template> {
        let state = self.state.read().await;
        let template = state.templates.get(id);
        authorize(ctx, template, TemplateAction::View, TEMPLATE_RESOURCE, id.as_str())?;
        template.cloned().ok_or_else(|| KeelsonError::not_found(TEMPLATE_RESOURCE, id.as_str()))
    }

    #[instrument(skip_all, fields(principal_id = %ctx.principal_id), name = "mem_list_templates")]
    async fn list_templates(&self, ctx: &AuthContext) -> Result<Vec<Template>> {
        let state = self.state.read().await;
        let mut templates: Vec<Template> = state
            .templates
            .values()
            .filter(|t| effective_access(ctx, t).is_some())
            .cloned()
            .collect();
        sort_by_creation(&mut templates, |t| (t.created_at, t.id.to_string()));
        Ok(templates)
    }

    #[instrument(skip(self, ctx, update), fields(principal_id = %ctx.principal_id), name = "mem_update_template")]
    async fn update_template(
        &self,
        ctx: &AuthContext,
        id: &TemplateId,
        update: TemplateUpdate,
    ) -> Result<Template> {
        let mut state = self.state.write().await;
        authorize(ctx, state.templates.get(id), update_action(&update), TEMPLATE_RESOURCE, id.as_str())?;

        let State { templates, revisions, .. } = &mut *state;
        let template = templates
            .get_mut(id)
            .ok_or_else(|| KeelsonError::not_found(TEMPLATE_RESOURCE, id.as_str()))?;

        apply_template_update(template, update, |revision_id| {
            revisions.get(revision_id).is_some_and(|r| &r.template_id == id)
        })?;

        info!(template_id = %id, "template updated");
        Ok(template.clone())
    }

    #[instrument(skip(self, ctx), fields(principal_id = %ctx.principal_id), name = "mem_delete_template")]
    async fn delete_template(&self, ctx: &AuthContext, id: &TemplateId) -> Result<()> {
        let mut state = self.state.write().await;
        authorize(
            ctx,
            state.templates.get(id),
            TemplateAction::DeleteTemplate,
            TEMPLATE_RESOURCE,
            id.as_str(),
        )?;

        if state.template_referenced(id) {
            return Err(template_in_use(id));
        }

        state.templates.remove(id);
        let before = state.revisions.len();
        state.revisions.retain(|_, r| &r.template_id != id);

        info!(template_id = %id, revisions_removed = before - state.revisions.len(), "template deleted");
        Ok(())
    }

    #[instrument(skip(self, ctx, request), fields(principal_id = %ctx.principal_id), name = "mem_create_revision")]
    async fn create_revision(
        &self,
        ctx: &AuthContext,
        template_id: &TemplateId,
        request: NewRevision,
    ) -> Result<Revision> {
        let mut state = self.state.write().await;
        let revision = prepare_revision(ctx, state.templates.get(template_id), template_id, request)?;
        state.revisions.insert(revision.id.clone(), revision.clone());

        info!(template_id = %template_id, revision_id = %revision.id, "revision created");
        Ok(revision)
    }

    #[instrument(skip(self, ctx), fields(principal_id = %ctx.principal_id), name = "mem_get_revision")]
    async fn get_revision(&self, ctx: &AuthContext, id: &RevisionId) -> Result<Revision> {
        let state = self.state.read().await;
        let (revision, template) = state.revision_with_template(id);
        authorize_revision(ctx, revision, template, TemplateAction::View, id)?;
        revision.cloned().ok_or_else(|| KeelsonError::not_found(REVISION_RESOURCE, id.as_str()))
    }

    #[instrument(skip(self, ctx), fields(principal_id = %ctx.principal_id), name = "mem_list_revisions")]
    async fn list_revisions(
        &self,
        ctx: &AuthContext,
        template_id: &TemplateId,
    ) -> Result<Vec<Revision>> {
        let state = self.state.read().await;
        authorize(
            ctx,
            state.templates.get(template_id),
            TemplateAction::View,
            TEMPLATE_RESOURCE,
            template_id.as_str(),
        )?;

        let mut revisions: Vec<Revision> =
            state.revisions.values().filter(|r| &r.template_id == template_id).cloned().collect();
        sort_by_creation(&mut revisions, |r| (r.created_at, r.id.to_string()));
        Ok(revisions)
    }

    #[instrument(skip(self, ctx), fields(principal_id = %ctx.principal_id), name = "mem_set_revision_enabled")]
    async fn set_revision_enabled(
        &self,
        ctx: &AuthContext,
        id: &RevisionId,
        enabled: bool,
    ) -> Result<Revision> {
        let mut state = self.state.write().await;
        let (revision, template) = state.revision_with_template(id);
        authorize_revision(ctx, revision, template, TemplateAction::SetRevisionEnabled, id)?;

        let revision = state
            .revisions
            .get_mut(id)
            .ok_or_else(|| KeelsonError::not_found(REVISION_RESOURCE, id.as_str()))?;
        revision.enabled = enabled;
        revision.updated_at = Utc::now();

        info!(revision_id = %id, enabled, "revision enabled flag set");
        Ok(revision.clone())
    }

    #[instrument(skip(self, ctx), fields(principal_id = %ctx.principal_id), name = "mem_delete_revision")]
    async fn delete_revision(&self, ctx: &AuthContext, id: &RevisionId) -> Result<()> {
        let mut state = self.state.write().await;
        let (revision, template) = state.revision_with_template(id);
        authorize_revision(ctx, revision, template, TemplateAction::DeleteRevision, id)?;

        if state.revision_referenced(id) {
            return Err(revision_in_use(id));
        }

        if let Some(revision) = state.revisions.remove(id) {
            if let Some(template) = state.templates.get_mut(&revision.template_id) {
                if template.default_revision_id.as_ref() == Some(id) {
                    template.default_revision_id = None;
                    template.updated_at = Utc::now();
                }
            }
        }

        info!(revision_id = %id, "revision deleted");
        Ok(())
    }

    #[instrument(skip_all, fields(principal_id = %ctx.principal_id), name = "mem_create_cluster")]
    async fn create_cluster(&self, ctx: &AuthContext, request: NewCluster) -> Result<Cluster> {
        let mut state = self.state.write().await;
        let (revision, template) = state.revision_with_template(&request.cluster_template_revision_id);
        let cluster = prepare_cluster(ctx, revision, template, request)?;
        state.clusters.insert(cluster.id.clone(), cluster.clone());

        info!(cluster_id = %cluster.id, revision_id = %cluster.revision_id, "cluster created");
        Ok(cluster)
    }

    #[instrument(skip(self, ctx), fields(principal_id = %ctx.principal_id), name = "mem_get_cluster")]
    async fn get_cluster(&self, ctx: &AuthContext, id: &ClusterId) -> Result<Cluster> {
        let state = self.state.read().await;
        authorize_cluster(ctx, state.clusters.get(id), id).cloned()
    }

    #[instrument(skip_all, fields(principal_id = %ctx.principal_id), name = "mem_list_clusters")]
    async fn list_clusters(&self, ctx: &AuthContext) -> Result<Vec<Cluster>> {
        let state = self.state.read().await;
        let mut clusters: Vec<Cluster> = state
            .clusters
            .values()
            .filter(|c| cluster_visible(ctx, c))
            .cloned()
            .collect();
        sort_by_creation(&mut clusters, |c| (c.created_at, c.id.to_string()));
        Ok(clusters)
    }

    #[instrument(skip(self, ctx, answers), fields(principal_id = %ctx.principal_id), name = "mem_set_cluster_revision")]
    async fn set_cluster_revision(
        &self,
        ctx: &AuthContext,
        id: &ClusterId,
        revision_id: &RevisionId,
        answers: Option<Answers>,
    ) -> Result<Cluster> {
        let mut state = self.state.write().await;
        let mut cluster = authorize_cluster(ctx, state.clusters.get(id), id)?.clone();

        let (revision, template) = state.revision_with_template(revision_id);
        apply_revision_switch(ctx, &mut cluster, revision, template, revision_id, answers)?;
        state.clusters.insert(id.clone(), cluster.clone());

        info!(
            cluster_id = %id,
            revision_id = %revision_id,
            generation = cluster.generation,
            "cluster revision switched"
        );
        Ok(cluster)
    }

    #[instrument(skip(self, ctx), fields(principal_id = %ctx.principal_id), name = "mem_delete_cluster")]
    async fn delete_cluster(&self, ctx: &AuthContext, id: &ClusterId) -> Result<()> {
        let mut state = self.state.write().await;
        authorize_cluster(ctx, state.clusters.get(id), id)?;
        state.clusters.remove(id);

        info!(cluster_id = %id, "cluster deleted");
        Ok(())
    }

    #[instrument(skip(self), name = "mem_list_pending_clusters")]
    async fn list_pending_clusters(&self) -> Result<Vec<Cluster>> {
        let state = self.state.read().await;
        let mut pending: Vec<Cluster> =
            state.clusters.values().filter(|c| c.state.is_transitioning()).cloned().collect();
        sort_by_creation(&mut pending, |c| (c.created_at, c.id.to_string()));
        Ok(pending)
    }

    #[instrument(skip(self), name = "mem_complete_reconcile")]
    async fn complete_reconcile(&self, id: &ClusterId, generation: i64) -> Result<ReconcileOutcome> {
        let mut state = self.state.write().await;
        let Some(cluster) = state.clusters.get_mut(id) else {
            return Ok(ReconcileOutcome::Gone);
        };

        if apply_reconcile(cluster, generation) {
            Ok(ReconcileOutcome::Applied(cluster.clone()))
        } else {
            Ok(ReconcileOutcome::Stale { current_generation: cluster.generation })
        }
    }
}
