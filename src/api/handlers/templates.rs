//! Cluster template handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::instrument;

use crate::api::dto::{CreateTemplateBody, SetMembersBody, UpdateTemplateBody};
use crate::api::error::{ApiError, ErrorBody};
use crate::api::routes::ApiState;
use crate::auth::AuthContext;
use crate::domain::{parse_members, Template, TemplateId};

#[utoipa::path(
    post,
    path = "/api/v1/cluster-templates",
    request_body = CreateTemplateBody,
    responses(
        (status = 201, description = "Template created", body = Template),
        (status = 403, description = "Caller lacks the clustertemplates-create role", body = ErrorBody),
        (status = 422, description = "Invalid members or fields", body = ErrorBody)
    ),
    tag = "Cluster Templates"
)]
#[instrument(skip(state, context, payload), fields(principal_id = %context.principal_id))]
pub async fn create_template_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    payload: Result<Json<CreateTemplateBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Template>), ApiError> {
    let Json(body) = payload?;
    let template = state.templates.create_template(&context, body.into_request()?).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

#[utoipa::path(
    get,
    path = "/api/v1/cluster-templates",
    responses(
        (status = 200, description = "Templates visible to the caller", body = [Template])
    ),
    tag = "Cluster Templates"
)]
#[instrument(skip(state, context), fields(principal_id = %context.principal_id))]
pub async fn list_templates_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
) -> Result<Json<Vec<Template>>, ApiError> {
    Ok(Json(state.templates.list_templates(&context).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/cluster-templates/{id}",
    params(("id" = String, Path, description = "Template id")),
    responses(
        (status = 200, description = "Template", body = Template),
        (status = 404, description = "Absent or not visible to the caller", body = ErrorBody)
    ),
    tag = "Cluster Templates"
)]
#[instrument(skip(state, context), fields(template_id = %id, principal_id = %context.principal_id))]
pub async fn get_template_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Path(id): Path<TemplateId>,
) -> Result<Json<Template>, ApiError> {
    Ok(Json(state.templates.get_template(&context, &id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/cluster-templates/{id}",
    params(("id" = String, Path, description = "Template id")),
    request_body = UpdateTemplateBody,
    responses(
        (status = 200, description = "Template updated", body = Template),
        (status = 403, description = "Visible but caller is not an owner", body = ErrorBody),
        (status = 404, description = "Absent or not visible to the caller", body = ErrorBody),
        (status = 422, description = "Invalid fields", body = ErrorBody)
    ),
    tag = "Cluster Templates"
)]
#[instrument(skip(state, context, payload), fields(template_id = %id, principal_id = %context.principal_id))]
pub async fn update_template_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Path(id): Path<TemplateId>,
    payload: Result<Json<UpdateTemplateBody>, JsonRejection>,
) -> Result<Json<Template>, ApiError> {
    let Json(body) = payload?;
    let template = state.templates.update_template(&context, &id, body.into_update()?).await?;
    Ok(Json(template))
}

#[utoipa::path(
    put,
    path = "/api/v1/cluster-templates/{id}/members",
    params(("id" = String, Path, description = "Template id")),
    request_body = SetMembersBody,
    responses(
        (status = 200, description = "Members replaced", body = Template),
        (status = 403, description = "Visible but caller is not an owner", body = ErrorBody),
        (status = 404, description = "Absent or not visible to the caller", body = ErrorBody),
        (status = 422, description = "Invalid member entry", body = ErrorBody)
    ),
    tag = "Cluster Templates"
)]
#[instrument(skip(state, context, payload), fields(template_id = %id, principal_id = %context.principal_id))]
pub async fn set_members_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Path(id): Path<TemplateId>,
    payload: Result<Json<SetMembersBody>, JsonRejection>,
) -> Result<Json<Template>, ApiError> {
    let Json(body) = payload?;
    let members = parse_members(body.members)?;
    Ok(Json(state.templates.set_members(&context, &id, members).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cluster-templates/{id}",
    params(("id" = String, Path, description = "Template id")),
    responses(
        (status = 204, description = "Template and its revisions deleted"),
        (status = 403, description = "Visible but caller is not an owner", body = ErrorBody),
        (status = 404, description = "Absent or not visible to the caller", body = ErrorBody),
        (status = 409, description = "A cluster still uses one of its revisions", body = ErrorBody)
    ),
    tag = "Cluster Templates"
)]
#[instrument(skip(state, context), fields(template_id = %id, principal_id = %context.principal_id))]
pub async fn delete_template_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Path(id): Path<TemplateId>,
) -> Result<StatusCode, ApiError> {
    state.templates.delete_template(&context, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
