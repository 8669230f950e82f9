//! Revision business logic service

use std::sync::Arc;

use tracing::Instrument;

use crate::auth::AuthContext;
use crate::domain::{NewRevision, Revision, RevisionId, TemplateId};
use crate::errors::Result;
use crate::services::template_service::recorded;
use crate::storage::TemplateStore;
use crate::store_span;

/// Service for managing revisions under a template
#[derive(Clone)]
pub struct RevisionService {
    store: Arc<dyn TemplateStore>,
}

impl RevisionService {
    pub fn new(store: Arc<dyn TemplateStore>) -> Self {
        Self { store }
    }

    pub async fn create_revision(
        &self,
        ctx: &AuthContext,
        template_id: &TemplateId,
        request: NewRevision,
    ) -> Result<Revision> {
        let span = store_span!("create_revision", template_id = %template_id);
        let result = self.store.create_revision(ctx, template_id, request).instrument(span).await;
        recorded("create_revision", result)
    }

    pub async fn get_revision(&self, ctx: &AuthContext, id: &RevisionId) -> Result<Revision> {
        recorded("get_revision", self.store.get_revision(ctx, id).await)
    }

    pub async fn list_revisions(
        &self,
        ctx: &AuthContext,
        template_id: &TemplateId,
    ) -> Result<Vec<Revision>> {
        recorded("list_revisions", self.store.list_revisions(ctx, template_id).await)
    }

    pub async fn set_enabled(
        &self,
        ctx: &AuthContext,
        id: &RevisionId,
        enabled: bool,
    ) -> Result<Revision> {
        let span = store_span!("set_revision_enabled", revision_id = %id);
        let result = self.store.set_revision_enabled(ctx, id, enabled).instrument(span).await;
        recorded("set_revision_enabled", result)
    }

    pub async fn delete_revision(&self, ctx: &AuthContext, id: &RevisionId) -> Result<()> {
        let span = store_span!("delete_revision", revision_id = %id);
        let result = self.store.delete_revision(ctx, id).instrument(span).await;
        recorded("delete_revision", result)
    }
}
