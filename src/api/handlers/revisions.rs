//! Cluster template revision handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::instrument;

use crate::api::dto::SetEnabledBody;
use crate::api::error::{ApiError, ErrorBody};
use crate::api::routes::ApiState;
use crate::auth::AuthContext;
use crate::domain::{NewRevision, Revision, RevisionId, TemplateId};

#[utoipa::path(
    post,
    path = "/api/v1/cluster-templates/{id}/revisions",
    params(("id" = String, Path, description = "Template id")),
    request_body = NewRevision,
    responses(
        (status = 201, description = "Revision created", body = Revision),
        (status = 403, description = "Caller is a read-only member", body = ErrorBody),
        (status = 404, description = "Template absent or not visible", body = ErrorBody),
        (status = 422, description = "Invalid clusterConfig or questions", body = ErrorBody)
    ),
    tag = "Revisions"
)]
#[instrument(skip(state, context, payload), fields(template_id = %template_id, principal_id = %context.principal_id))]
pub async fn create_revision_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Path(template_id): Path<TemplateId>,
    payload: Result<Json<NewRevision>, JsonRejection>,
) -> Result<(StatusCode, Json<Revision>), ApiError> {
    let Json(body) = payload?;
    let revision = state.revisions.create_revision(&context, &template_id, body).await?;
    Ok((StatusCode::CREATED, Json(revision)))
}

#[utoipa::path(
    get,
    path = "/api/v1/cluster-templates/{id}/revisions",
    params(("id" = String, Path, description = "Template id")),
    responses(
        (status = 200, description = "Revisions of the template", body = [Revision]),
        (status = 404, description = "Template absent or not visible", body = ErrorBody)
    ),
    tag = "Revisions"
)]
#[instrument(skip(state, context), fields(template_id = %template_id, principal_id = %context.principal_id))]
pub async fn list_revisions_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Path(template_id): Path<TemplateId>,
) -> Result<Json<Vec<Revision>>, ApiError> {
    Ok(Json(state.revisions.list_revisions(&context, &template_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/cluster-template-revisions/{id}",
    params(("id" = String, Path, description = "Revision id")),
    responses(
        (status = 200, description = "Revision", body = Revision),
        (status = 404, description = "Absent or not visible", body = ErrorBody)
    ),
    tag = "Revisions"
)]
#[instrument(skip(state, context), fields(revision_id = %id, principal_id = %context.principal_id))]
pub async fn get_revision_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Path(id): Path<RevisionId>,
) -> Result<Json<Revision>, ApiError> {
    Ok(Json(state.revisions.get_revision(&context, &id).await?))
}

#[utoipa::path(
    patch,
    path = "/api/v1/cluster-template-revisions/{id}",
    params(("id" = String, Path, description = "Revision id")),
    request_body = SetEnabledBody,
    responses(
        (status = 200, description = "Revision updated", body = Revision),
        (status = 403, description = "Caller is a read-only member", body = ErrorBody),
        (status = 404, description = "Absent or not visible", body = ErrorBody)
    ),
    tag = "Revisions"
)]
#[instrument(skip(state, context, payload), fields(revision_id = %id, principal_id = %context.principal_id))]
pub async fn set_revision_enabled_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Path(id): Path<RevisionId>,
    payload: Result<Json<SetEnabledBody>, JsonRejection>,
) -> Result<Json<Revision>, ApiError> {
    let Json(body) = payload?;
    Ok(Json(state.revisions.set_enabled(&context, &id, body.enabled).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cluster-template-revisions/{id}",
    params(("id" = String, Path, description = "Revision id")),
    responses(
        (status = 204, description = "Revision deleted"),
        (status = 403, description = "Visible but caller is not an owner", body = ErrorBody),
        (status = 404, description = "Absent or not visible", body = ErrorBody),
        (status = 409, description = "Still referenced by a cluster", body = ErrorBody)
    ),
    tag = "Revisions"
)]
#[instrument(skip(state, context), fields(revision_id = %id, principal_id = %context.principal_id))]
pub async fn delete_revision_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Path(id): Path<RevisionId>,
) -> Result<StatusCode, ApiError> {
    state.revisions.delete_revision(&context, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
