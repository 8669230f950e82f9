//! Principal domain models: users, the principal ids they answer to, and
//! their global role bindings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

use crate::domain::PrincipalId;

/// Global roles bound to a principal independently of any template ACL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum GlobalRole {
    /// Implicit owner of every template and cluster.
    #[serde(rename = "admin")]
    Admin,
    /// May create new cluster templates.
    #[serde(rename = "clustertemplates-create")]
    TemplatesCreate,
    /// Baseline role every provisioned user holds.
    #[serde(rename = "user")]
    User,
}

impl GlobalRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlobalRole::Admin => "admin",
            GlobalRole::TemplatesCreate => "clustertemplates-create",
            GlobalRole::User => "user",
        }
    }
}

impl Display for GlobalRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GlobalRole {
    type Err = GlobalRoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(GlobalRole::Admin),
            "clustertemplates-create" => Ok(GlobalRole::TemplatesCreate),
            "user" => Ok(GlobalRole::User),
            other => Err(GlobalRoleParseError(other.to_string())),
        }
    }
}

/// Error returned when global role parsing fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid global role: {0}")]
pub struct GlobalRoleParseError(pub String);

/// A provisioned user account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: PrincipalId,
    pub username: String,
    pub display_name: Option<String>,
    /// Principal ids this user answers to in template ACLs.
    pub principal_ids: Vec<String>,
    /// Group principals this user belongs to.
    pub group_principal_ids: Vec<String>,
    pub global_roles: Vec<GlobalRole>,
    pub created_at: DateTime<Utc>,
}

impl Principal {
    /// The canonical user principal id derived from the account id.
    pub fn local_principal_id(id: &PrincipalId) -> String {
        format!("local://{}", id)
    }

    pub fn has_role(&self, role: GlobalRole) -> bool {
        self.global_roles.contains(&role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_role_round_trip() {
        for (input, expected) in [
            ("admin", GlobalRole::Admin),
            ("clustertemplates-create", GlobalRole::TemplatesCreate),
            ("user", GlobalRole::User),
        ] {
            let parsed = input.parse::<GlobalRole>().unwrap();
            assert_eq!(parsed, expected);
            assert_eq!(parsed.to_string(), input);
        }

        let err = "root".parse::<GlobalRole>().unwrap_err();
        assert_eq!(err.0, "root");
    }

    #[test]
    fn global_role_serde_matches_display() {
        let json = serde_json::to_string(&GlobalRole::TemplatesCreate).unwrap();
        assert_eq!(json, "\"clustertemplates-create\"");
    }

    #[test]
    fn local_principal_id_uses_account_id() {
        let id = PrincipalId::from_str_unchecked("u-abc");
        assert_eq!(Principal::local_principal_id(&id), "local://u-abc");
    }
}
