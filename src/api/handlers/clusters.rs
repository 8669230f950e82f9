//! Cluster handlers.
//!
//! Create and revision switch answer as soon as the desired spec is stored;
//! the cluster reports `provisioning` or `updating` until the background
//! reconcile publishes `appliedSpec`.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::instrument;

use crate::api::dto::SwitchRevisionBody;
use crate::api::error::{ApiError, ErrorBody};
use crate::api::routes::ApiState;
use crate::auth::AuthContext;
use crate::domain::{Cluster, ClusterId, NewCluster};

#[utoipa::path(
    post,
    path = "/api/v1/clusters",
    request_body = NewCluster,
    responses(
        (status = 201, description = "Cluster accepted and provisioning", body = Cluster),
        (status = 404, description = "Revision absent or not visible", body = ErrorBody),
        (status = 422, description = "Disabled revision or unbindable answers", body = ErrorBody)
    ),
    tag = "Clusters"
)]
#[instrument(skip(state, context, payload), fields(principal_id = %context.principal_id))]
pub async fn create_cluster_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    payload: Result<Json<NewCluster>, JsonRejection>,
) -> Result<(StatusCode, Json<Cluster>), ApiError> {
    let Json(body) = payload?;
    let cluster = state.clusters.create_cluster(&context, body).await?;
    Ok((StatusCode::CREATED, Json(cluster)))
}

#[utoipa::path(
    get,
    path = "/api/v1/clusters",
    responses(
        (status = 200, description = "Clusters owned by the caller, or all for admins", body = [Cluster])
    ),
    tag = "Clusters"
)]
#[instrument(skip(state, context), fields(principal_id = %context.principal_id))]
pub async fn list_clusters_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
) -> Result<Json<Vec<Cluster>>, ApiError> {
    Ok(Json(state.clusters.list_clusters(&context).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/clusters/{id}",
    params(("id" = String, Path, description = "Cluster id")),
    responses(
        (status = 200, description = "Cluster", body = Cluster),
        (status = 404, description = "Absent or not owned by the caller", body = ErrorBody)
    ),
    tag = "Clusters"
)]
#[instrument(skip(state, context), fields(cluster_id = %id, principal_id = %context.principal_id))]
pub async fn get_cluster_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Path(id): Path<ClusterId>,
) -> Result<Json<Cluster>, ApiError> {
    Ok(Json(state.clusters.get_cluster(&context, &id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/clusters/{id}",
    params(("id" = String, Path, description = "Cluster id")),
    request_body = SwitchRevisionBody,
    responses(
        (status = 200, description = "Switch accepted; cluster is updating", body = Cluster),
        (status = 404, description = "Cluster or revision not visible", body = ErrorBody),
        (status = 422, description = "Revision belongs to another template or is disabled", body = ErrorBody)
    ),
    tag = "Clusters"
)]
#[instrument(skip(state, context, payload), fields(cluster_id = %id, principal_id = %context.principal_id))]
pub async fn switch_cluster_revision_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Path(id): Path<ClusterId>,
    payload: Result<Json<SwitchRevisionBody>, JsonRejection>,
) -> Result<Json<Cluster>, ApiError> {
    let Json(body) = payload?;
    let cluster = state
        .clusters
        .switch_revision(&context, &id, &body.cluster_template_revision_id, body.answers)
        .await?;
    Ok(Json(cluster))
}

#[utoipa::path(
    delete,
    path = "/api/v1/clusters/{id}",
    params(("id" = String, Path, description = "Cluster id")),
    responses(
        (status = 204, description = "Cluster deleted"),
        (status = 404, description = "Absent or not owned by the caller", body = ErrorBody)
    ),
    tag = "Clusters"
)]
#[instrument(skip(state, context), fields(cluster_id = %id, principal_id = %context.principal_id))]
pub async fn delete_cluster_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Path(id): Path<ClusterId>,
) -> Result<StatusCode, ApiError> {
    state.clusters.delete_cluster(&context, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
