//! Template business logic service
//!
//! Thin layer over the [`TemplateStore`] that records operation metrics and
//! exposes member replacement as its own operation.

use std::sync::Arc;

use tracing::{info, Instrument};

use crate::auth::AuthContext;
use crate::domain::{Member, NewTemplate, Template, TemplateId, TemplateUpdate};
use crate::errors::Result;
use crate::observability::metrics::{outcome_label, record_template_operation};
use crate::storage::TemplateStore;
use crate::store_span;

/// Record the outcome of a store call under `operation` and pass it through.
pub(crate) fn recorded<T>(operation: &str, result: Result<T>) -> Result<T> {
    record_template_operation(operation, outcome_label(&result));
    result
}

/// Service for managing cluster templates
#[derive(Clone)]
pub struct TemplateService {
    store: Arc<dyn TemplateStore>,
}

impl TemplateService {
    pub fn new(store: Arc<dyn TemplateStore>) -> Self {
        Self { store }
    }

    pub async fn create_template(&self, ctx: &AuthContext, request: NewTemplate) -> Result<Template> {
        let span = store_span!("create_template", principal_id = %ctx.principal_id);
        let result = self.store.create_template(ctx, request).instrument(span).await;
        recorded("create_template", result)
    }

    pub async fn get_template(&self, ctx: &AuthContext, id: &TemplateId) -> Result<Template> {
        recorded("get_template", self.store.get_template(ctx, id).await)
    }

    pub async fn list_templates(&self, ctx: &AuthContext) -> Result<Vec<Template>> {
        recorded("list_templates", self.store.list_templates(ctx).await)
    }

    pub async fn update_template(
        &self,
        ctx: &AuthContext,
        id: &TemplateId,
        update: TemplateUpdate,
    ) -> Result<Template> {
        let span = store_span!("update_template", template_id = %id);
        let result = self.store.update_template(ctx, id, update).instrument(span).await;
        recorded("update_template", result)
    }

    /// Replace the template's ACL. Applying the same list twice is a no-op.
    pub async fn set_members(
        &self,
        ctx: &AuthContext,
        id: &TemplateId,
        members: Vec<Member>,
    ) -> Result<Template> {
        let count = members.len();
        let update = TemplateUpdate { members: Some(members), ..Default::default() };

        let span = store_span!("set_members", template_id = %id);
        let result = self.store.update_template(ctx, id, update).instrument(span).await;
        if result.is_ok() {
            info!(template_id = %id, members = count, "template members replaced");
        }
        recorded("set_members", result)
    }

    pub async fn delete_template(&self, ctx: &AuthContext, id: &TemplateId) -> Result<()> {
        let span = store_span!("delete_template", template_id = %id);
        let result = self.store.delete_template(ctx, id).instrument(span).await;
        recorded("delete_template", result)
    }
}
