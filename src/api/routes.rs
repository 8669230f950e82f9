use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::auth::{middleware::authenticate, AuthService, PrincipalStore};
use crate::config::{ConvergenceConfig, ServerConfig};
use crate::request_span;
use crate::services::{ClusterService, RevisionService, TemplateService};
use crate::storage::TemplateStore;

use super::{docs, handlers};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ApiState {
    pub templates: TemplateService,
    pub revisions: RevisionService,
    pub clusters: ClusterService,
    pub principals: Arc<dyn PrincipalStore>,
}

impl ApiState {
    pub fn new(
        store: Arc<dyn TemplateStore>,
        principals: Arc<dyn PrincipalStore>,
        convergence: &ConvergenceConfig,
    ) -> Self {
        Self {
            templates: TemplateService::new(store.clone()),
            revisions: RevisionService::new(store.clone()),
            clusters: ClusterService::new(store, convergence.reconcile_delay()),
            principals,
        }
    }
}

pub fn build_router(state: ApiState, server: &ServerConfig) -> Router {
    let auth_service = Arc::new(AuthService::new(state.principals.clone()));
    let auth_layer = middleware::from_fn_with_state(auth_service, authenticate);

    let secured_api = Router::new()
        .route("/api/v1/users", post(handlers::create_user_handler))
        .route("/api/v1/global-role-bindings", post(handlers::bind_global_role_handler))
        .route(
            "/api/v1/groups/{groupPrincipalId}/members",
            post(handlers::add_group_member_handler),
        )
        .route(
            "/api/v1/cluster-templates",
            post(handlers::create_template_handler).get(handlers::list_templates_handler),
        )
        .route(
            "/api/v1/cluster-templates/{id}",
            get(handlers::get_template_handler)
                .put(handlers::update_template_handler)
                .delete(handlers::delete_template_handler),
        )
        .route("/api/v1/cluster-templates/{id}/members", put(handlers::set_members_handler))
        .route(
            "/api/v1/cluster-templates/{id}/revisions",
            post(handlers::create_revision_handler).get(handlers::list_revisions_handler),
        )
        .route(
            "/api/v1/cluster-template-revisions/{id}",
            get(handlers::get_revision_handler)
                .patch(handlers::set_revision_enabled_handler)
                .delete(handlers::delete_revision_handler),
        )
        .route(
            "/api/v1/clusters",
            post(handlers::create_cluster_handler).get(handlers::list_clusters_handler),
        )
        .route(
            "/api/v1/clusters/{id}",
            get(handlers::get_cluster_handler)
                .put(handlers::switch_cluster_revision_handler)
                .delete(handlers::delete_cluster_handler),
        )
        .with_state(state)
        .layer(auth_layer);

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .merge(secured_api)
        .merge(docs::docs_router())
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, server.timeout()))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            request_span!(request.method(), request.uri().path())
        }));

    if server.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router
}
