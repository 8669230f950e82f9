use axum::Router;
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::dto::{
    AddGroupMemberBody, CreateTemplateBody, GlobalRoleBindingBody, SetEnabledBody, SetMembersBody,
    SwitchRevisionBody, UpdateTemplateBody,
};
use crate::api::error::ErrorBody;
use crate::api::handlers::health::HealthResponse;
use crate::auth::{IssuedPrincipal, NewPrincipal};
use crate::domain::{
    AccessType, Answers, Cluster, ClusterId, ClusterState, GlobalRole, Member, MemberInput,
    NewCluster, NewRevision, Principal, PrincipalId, Question, QuestionType, Revision, RevisionId,
    Template, TemplateId,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Keelson API",
        description = "Access-controlled, versioned cluster templates and the clusters bound from them"
    ),
    paths(
        crate::api::handlers::health::health_handler,
        crate::api::handlers::admin::create_user_handler,
        crate::api::handlers::admin::bind_global_role_handler,
        crate::api::handlers::admin::add_group_member_handler,
        crate::api::handlers::templates::create_template_handler,
        crate::api::handlers::templates::list_templates_handler,
        crate::api::handlers::templates::get_template_handler,
        crate::api::handlers::templates::update_template_handler,
        crate::api::handlers::templates::set_members_handler,
        crate::api::handlers::templates::delete_template_handler,
        crate::api::handlers::revisions::create_revision_handler,
        crate::api::handlers::revisions::list_revisions_handler,
        crate::api::handlers::revisions::get_revision_handler,
        crate::api::handlers::revisions::set_revision_enabled_handler,
        crate::api::handlers::revisions::delete_revision_handler,
        crate::api::handlers::clusters::create_cluster_handler,
        crate::api::handlers::clusters::list_clusters_handler,
        crate::api::handlers::clusters::get_cluster_handler,
        crate::api::handlers::clusters::switch_cluster_revision_handler,
        crate::api::handlers::clusters::delete_cluster_handler
    ),
    components(
        schemas(
            HealthResponse,
            ErrorBody,
            NewPrincipal,
            IssuedPrincipal,
            Principal,
            PrincipalId,
            GlobalRole,
            GlobalRoleBindingBody,
            AddGroupMemberBody,
            Template,
            TemplateId,
            Member,
            MemberInput,
            AccessType,
            CreateTemplateBody,
            UpdateTemplateBody,
            SetMembersBody,
            Revision,
            RevisionId,
            NewRevision,
            Question,
            QuestionType,
            SetEnabledBody,
            Cluster,
            ClusterId,
            ClusterState,
            NewCluster,
            Answers,
            SwitchRevisionBody
        )
    ),
    tags(
        (name = "health", description = "Liveness"),
        (name = "Principals", description = "Users, global role bindings and groups (admin only)"),
        (name = "Cluster Templates", description = "Templates and their member ACLs"),
        (name = "Revisions", description = "Immutable configuration snapshots under a template"),
        (name = "Clusters", description = "Clusters bound from a revision and caller answers")
    ),
    security(
        ("bearerAuth" = [])
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

pub fn docs_router() -> Router {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use utoipa::openapi::{schema::Schema, RefOr};

    #[test]
    fn template_contract_is_documented() {
        let openapi = ApiDoc::openapi();
        let schemas = openapi.components.as_ref().expect("components").schemas.clone();

        let body = match schemas.get("CreateTemplateBody").expect("CreateTemplateBody schema") {
            RefOr::T(Schema::Object(obj)) => obj.clone(),
            _ => panic!("expected inline object schema"),
        };
        assert!(body.required.contains(&"name".to_string()));
        assert!(!body.required.contains(&"members".to_string()));

        assert!(schemas.contains_key("ErrorBody"));
        assert!(schemas.contains_key("AccessType"));
    }

    #[test]
    fn every_route_is_documented() {
        let openapi = ApiDoc::openapi();
        let paths = &openapi.paths.paths;

        for path in [
            "/health",
            "/api/v1/users",
            "/api/v1/global-role-bindings",
            "/api/v1/groups/{groupPrincipalId}/members",
            "/api/v1/cluster-templates",
            "/api/v1/cluster-templates/{id}",
            "/api/v1/cluster-templates/{id}/members",
            "/api/v1/cluster-templates/{id}/revisions",
            "/api/v1/cluster-template-revisions/{id}",
            "/api/v1/clusters",
            "/api/v1/clusters/{id}",
        ] {
            assert!(paths.contains_key(path), "missing path {}", path);
        }
        assert_eq!(paths.len(), 11);
    }

    #[test]
    fn bearer_scheme_is_registered() {
        let openapi = ApiDoc::openapi();
        let components = openapi.components.expect("components");
        assert!(components.security_schemes.contains_key("bearerAuth"));
    }
}
