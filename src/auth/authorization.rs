//! Authorization gate for templates, revisions and clusters.
//!
//! Every operation on a template or one of its revisions is mediated by
//! [`evaluate`], which resolves the caller's effective access from the
//! template ACL and returns a tagged [`GateDecision`]:
//!
//! - the template is absent, or the caller holds no access → `NotFound`
//!   (existence is never leaked to non-members)
//! - visible but the action needs more access → `PermissionDenied`
//! - otherwise `Allowed` with the access actually held
//!
//! Decisions are computed fresh from the ACL passed in; nothing is cached.

use std::fmt::{Display, Formatter};
use tracing::{debug, warn};

use crate::auth::models::AuthContext;
use crate::domain::{AccessType, Cluster, GlobalRole, Template};
use crate::errors::{KeelsonError, Result};
use crate::observability::metrics;

/// Operations the gate mediates on a template and its revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateAction {
    View,
    UseRevision,
    CreateRevision,
    SetRevisionEnabled,
    Update,
    ManageMembers,
    DeleteTemplate,
    DeleteRevision,
}

impl TemplateAction {
    pub const ALL: [TemplateAction; 8] = [
        TemplateAction::View,
        TemplateAction::UseRevision,
        TemplateAction::CreateRevision,
        TemplateAction::SetRevisionEnabled,
        TemplateAction::Update,
        TemplateAction::ManageMembers,
        TemplateAction::DeleteTemplate,
        TemplateAction::DeleteRevision,
    ];

    /// Minimum access a caller must hold to perform the action.
    pub fn required_access(&self) -> AccessType {
        match self {
            TemplateAction::View | TemplateAction::UseRevision => AccessType::ReadOnly,
            TemplateAction::CreateRevision | TemplateAction::SetRevisionEnabled => {
                AccessType::Member
            }
            TemplateAction::Update
            | TemplateAction::ManageMembers
            | TemplateAction::DeleteTemplate
            | TemplateAction::DeleteRevision => AccessType::Owner,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateAction::View => "view",
            TemplateAction::UseRevision => "use_revision",
            TemplateAction::CreateRevision => "create_revision",
            TemplateAction::SetRevisionEnabled => "set_revision_enabled",
            TemplateAction::Update => "update",
            TemplateAction::ManageMembers => "manage_members",
            TemplateAction::DeleteTemplate => "delete_template",
            TemplateAction::DeleteRevision => "delete_revision",
        }
    }
}

impl Display for TemplateAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allowed(AccessType),
    NotFound,
    PermissionDenied { held: AccessType, required: AccessType },
}

impl GateDecision {
    pub fn label(&self) -> &'static str {
        match self {
            GateDecision::Allowed(_) => "allowed",
            GateDecision::NotFound => "not_found",
            GateDecision::PermissionDenied { .. } => "permission_denied",
        }
    }
}

/// Strongest access the caller holds on the template, if any.
///
/// Admins and the template creator are implicit owners; everyone else gets
/// the maximum over ACL entries naming one of their user or group principals.
pub fn effective_access(context: &AuthContext, template: &Template) -> Option<AccessType> {
    if context.is_admin() || template.creator_id == context.principal_id {
        return Some(AccessType::Owner);
    }

    template
        .members
        .iter()
        .filter(|member| member.principal().is_some_and(|p| context.answers_to(p)))
        .map(|member| member.access_type)
        .max()
}

/// Evaluate an action against a template that may not exist.
pub fn evaluate(
    context: &AuthContext,
    template: Option<&Template>,
    action: TemplateAction,
) -> GateDecision {
    let Some(template) = template else {
        return GateDecision::NotFound;
    };

    let Some(held) = effective_access(context, template) else {
        return GateDecision::NotFound;
    };

    let required = action.required_access();
    if held >= required {
        GateDecision::Allowed(held)
    } else {
        GateDecision::PermissionDenied { held, required }
    }
}

/// Evaluate and convert the decision into a typed error.
///
/// `resource_type` and `resource_id` name what the caller asked for, which
/// may be a revision under the template rather than the template itself.
pub fn authorize(
    context: &AuthContext,
    template: Option<&Template>,
    action: TemplateAction,
    resource_type: &str,
    resource_id: &str,
) -> Result<AccessType> {
    let decision = evaluate(context, template, action);
    metrics::record_authorization_decision(action.as_str(), decision.label());

    match decision {
        GateDecision::Allowed(held) => {
            debug!(
                principal_id = %context.principal_id,
                action = %action,
                resource_id = %resource_id,
                access = %held,
                "authorization allowed"
            );
            Ok(held)
        }
        GateDecision::NotFound => {
            warn!(
                principal_id = %context.principal_id,
                action = %action,
                resource_type = %resource_type,
                resource_id = %resource_id,
                decision = "not_found",
                "authorization denied"
            );
            Err(KeelsonError::not_found(resource_type, resource_id))
        }
        GateDecision::PermissionDenied { held, required } => {
            warn!(
                principal_id = %context.principal_id,
                action = %action,
                resource_type = %resource_type,
                resource_id = %resource_id,
                held = %held,
                required = %required,
                decision = "permission_denied",
                "authorization denied"
            );
            Err(KeelsonError::permission_denied(format!(
                "{} access on {} '{}' cannot {}; {} access required",
                held, resource_type, resource_id, action, required
            )))
        }
    }
}

/// Require a global role. Admins satisfy every role requirement.
pub fn require_global_role(context: &AuthContext, role: GlobalRole) -> Result<()> {
    if context.is_admin() || context.has_role(role) {
        return Ok(());
    }

    warn!(
        principal_id = %context.principal_id,
        required_role = %role,
        "global role check failed"
    );
    Err(KeelsonError::forbidden(format!("global role '{}' required", role)))
}

/// Clusters are visible to their owner and to admins only.
pub fn cluster_visible(context: &AuthContext, cluster: &Cluster) -> bool {
    context.is_admin() || cluster.owner_id == context.principal_id
}
