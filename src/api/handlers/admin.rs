//! Principal administration: users, global role bindings and groups.
//!
//! All three endpoints require the `admin` global role.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::{info, instrument};
use validator::Validate;

use crate::api::dto::{AddGroupMemberBody, CreateUserBody, GlobalRoleBindingBody};
use crate::api::error::ApiError;
use crate::api::routes::ApiState;
use crate::auth::authorization::require_global_role;
use crate::auth::{AuthContext, IssuedPrincipal};
use crate::domain::{GlobalRole, Principal, PrincipalId};

#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserBody,
    responses(
        (status = 201, description = "User created; the token is only returned once", body = IssuedPrincipal),
        (status = 403, description = "Caller is not an admin", body = crate::api::error::ErrorBody),
        (status = 409, description = "Username taken", body = crate::api::error::ErrorBody)
    ),
    tag = "Principals"
)]
#[instrument(skip(state, context, payload), fields(principal_id = %context.principal_id))]
pub async fn create_user_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    payload: Result<Json<CreateUserBody>, JsonRejection>,
) -> Result<(StatusCode, Json<IssuedPrincipal>), ApiError> {
    require_global_role(&context, GlobalRole::Admin)?;
    let Json(body) = payload?;
    body.validate()?;

    let issued = state.principals.create_user(body).await?;
    info!(user_id = %issued.principal.id, username = %issued.principal.username, "user created");
    Ok((StatusCode::CREATED, Json(issued)))
}

#[utoipa::path(
    post,
    path = "/api/v1/global-role-bindings",
    request_body = GlobalRoleBindingBody,
    responses(
        (status = 201, description = "Role bound", body = Principal),
        (status = 403, description = "Caller is not an admin", body = crate::api::error::ErrorBody),
        (status = 404, description = "User not found", body = crate::api::error::ErrorBody)
    ),
    tag = "Principals"
)]
#[instrument(skip(state, context, payload), fields(principal_id = %context.principal_id))]
pub async fn bind_global_role_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    payload: Result<Json<GlobalRoleBindingBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Principal>), ApiError> {
    require_global_role(&context, GlobalRole::Admin)?;
    let Json(body) = payload?;

    let principal = state.principals.add_role_binding(&body.user_id, body.global_role_name).await?;
    info!(user_id = %principal.id, role = %body.global_role_name, "global role bound");
    Ok((StatusCode::CREATED, Json(principal)))
}

#[utoipa::path(
    post,
    path = "/api/v1/groups/{groupPrincipalId}/members",
    params(("groupPrincipalId" = String, Path, description = "Group principal id, URL-encoded")),
    request_body = AddGroupMemberBody,
    responses(
        (status = 200, description = "User added to the group", body = Principal),
        (status = 403, description = "Caller is not an admin", body = crate::api::error::ErrorBody),
        (status = 404, description = "User not found", body = crate::api::error::ErrorBody)
    ),
    tag = "Principals"
)]
#[instrument(skip(state, context, payload), fields(principal_id = %context.principal_id, group = %group_principal_id))]
pub async fn add_group_member_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Path(group_principal_id): Path<String>,
    payload: Result<Json<AddGroupMemberBody>, JsonRejection>,
) -> Result<Json<Principal>, ApiError> {
    require_global_role(&context, GlobalRole::Admin)?;
    let Json(body) = payload?;
    body.validate()?;

    let user_id = PrincipalId::from_string(body.user_id);
    let principal = state.principals.add_group_member(&group_principal_id, &user_id).await?;
    Ok(Json(principal))
}
