use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::domain::{GlobalRole, PrincipalId};

pub use crate::auth::NewPrincipal as CreateUserBody;

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({"userId": "u-b4qkhsnliz", "globalRoleName": "clustertemplates-create"}))]
pub struct GlobalRoleBindingBody {
    pub user_id: PrincipalId,
    pub global_role_name: GlobalRole,
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddGroupMemberBody {
    #[validate(length(min = 1, message = "userId must not be empty"))]
    #[schema(value_type = String)]
    pub user_id: String,
}
