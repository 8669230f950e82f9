//! Cluster template domain models and their access-control list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;
use validator::Validate;

use crate::domain::{PrincipalId, RevisionId, TemplateId};
use crate::errors::{KeelsonError, Result};

/// Access level a member holds on a template.
///
/// Variants are ordered from weakest to strongest so that effective access
/// can be computed with `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum AccessType {
    ReadOnly,
    Member,
    Owner,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::ReadOnly => "read-only",
            AccessType::Member => "member",
            AccessType::Owner => "owner",
        }
    }
}

impl Display for AccessType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AccessType {
    type Err = AccessTypeParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "read-only" => Ok(AccessType::ReadOnly),
            "member" => Ok(AccessType::Member),
            "owner" => Ok(AccessType::Owner),
            other => Err(AccessTypeParseError(other.to_string())),
        }
    }
}

/// Error returned when access type parsing fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid access type: {0} (expected owner, member or read-only)")]
pub struct AccessTypeParseError(pub String);

/// One ACL entry on a template. Exactly one of the principal fields is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_principal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_principal_id: Option<String>,
    pub access_type: AccessType,
}

impl Member {
    pub fn user(principal_id: impl Into<String>, access_type: AccessType) -> Self {
        Self { user_principal_id: Some(principal_id.into()), group_principal_id: None, access_type }
    }

    pub fn group(principal_id: impl Into<String>, access_type: AccessType) -> Self {
        Self { user_principal_id: None, group_principal_id: Some(principal_id.into()), access_type }
    }

    /// The principal this entry grants access to, whichever kind it is.
    pub fn principal(&self) -> Option<&str> {
        self.user_principal_id.as_deref().or(self.group_principal_id.as_deref())
    }
}

/// Untyped member entry as it arrives over the wire.
///
/// `accessType` stays a string here so an unknown value becomes a
/// validation error naming the offending entry instead of a body rejection.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberInput {
    #[serde(default)]
    pub user_principal_id: Option<String>,
    #[serde(default)]
    pub group_principal_id: Option<String>,
    pub access_type: String,
}

impl MemberInput {
    pub fn into_member(self, index: usize) -> Result<Member> {
        let access_type = self.access_type.parse::<AccessType>().map_err(|e| {
            KeelsonError::validation_field(e.to_string(), format!("members[{}].accessType", index))
        })?;

        Ok(Member {
            user_principal_id: self.user_principal_id,
            group_principal_id: self.group_principal_id,
            access_type,
        })
    }
}

/// Parse a wire-level member list into typed members.
pub fn parse_members(inputs: Vec<MemberInput>) -> Result<Vec<Member>> {
    inputs.into_iter().enumerate().map(|(index, input)| input.into_member(index)).collect()
}

/// Structural checks on a member list that the type system cannot express.
pub fn validate_members(members: &[Member]) -> Result<()> {
    let mut seen = HashSet::new();

    for (index, member) in members.iter().enumerate() {
        let field = format!("members[{}]", index);
        let principal = match (&member.user_principal_id, &member.group_principal_id) {
            (Some(user), None) => user,
            (None, Some(group)) => group,
            (Some(_), Some(_)) => {
                return Err(KeelsonError::validation_field(
                    "member must set only one of userPrincipalId or groupPrincipalId",
                    field,
                ))
            }
            (None, None) => {
                return Err(KeelsonError::validation_field(
                    "member must set userPrincipalId or groupPrincipalId",
                    field,
                ))
            }
        };

        if principal.trim().is_empty() {
            return Err(KeelsonError::validation_field("principal id cannot be empty", field));
        }

        if !seen.insert(principal.as_str()) {
            return Err(KeelsonError::validation_field(
                format!("principal '{}' appears more than once", principal),
                field,
            ));
        }
    }

    Ok(())
}

/// A named, access-controlled container for configuration revisions.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    pub description: Option<String>,
    /// Creating principal; always an implicit owner.
    pub creator_id: PrincipalId,
    pub members: Vec<Member>,
    pub default_revision_id: Option<RevisionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a new template.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewTemplate {
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: String,
    #[validate(length(max = 1000, message = "description must be at most 1000 characters"))]
    pub description: Option<String>,
    #[serde(default)]
    pub members: Vec<Member>,
}

/// Partial update of a template. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Validate)]
pub struct TemplateUpdate {
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 1000, message = "description must be at most 1000 characters"))]
    pub description: Option<String>,
    pub members: Option<Vec<Member>>,
    /// `Some(None)` clears the default revision.
    pub default_revision_id: Option<Option<RevisionId>>,
}

impl TemplateUpdate {
    pub fn touches_members(&self) -> bool {
        self.members.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_type_round_trip() {
        for (input, expected) in [
            ("read-only", AccessType::ReadOnly),
            ("member", AccessType::Member),
            ("owner", AccessType::Owner),
        ] {
            let parsed = input.parse::<AccessType>().unwrap();
            assert_eq!(parsed, expected);
            assert_eq!(parsed.to_string(), input);
        }

        assert!("readonly".parse::<AccessType>().is_err());
    }

    #[test]
    fn access_type_orders_weakest_to_strongest() {
        assert!(AccessType::ReadOnly < AccessType::Member);
        assert!(AccessType::Member < AccessType::Owner);
        assert_eq!(
            [AccessType::Member, AccessType::Owner, AccessType::ReadOnly].into_iter().max(),
            Some(AccessType::Owner)
        );
    }

    #[test]
    fn member_input_rejects_unknown_access_type() {
        let inputs = vec![
            MemberInput {
                user_principal_id: Some("local://u-1".into()),
                group_principal_id: None,
                access_type: "owner".into(),
            },
            MemberInput {
                user_principal_id: Some("local://u-2".into()),
                group_principal_id: None,
                access_type: "superuser".into(),
            },
        ];

        let err = parse_members(inputs).unwrap_err();
        match err {
            KeelsonError::Validation { field, message } => {
                assert_eq!(field.as_deref(), Some("members[1].accessType"));
                assert!(message.contains("superuser"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn validate_members_requires_exactly_one_principal() {
        let both = Member {
            user_principal_id: Some("local://u-1".into()),
            group_principal_id: Some("github_team://1".into()),
            access_type: AccessType::Member,
        };
        assert!(validate_members(&[both]).is_err());

        let neither =
            Member { user_principal_id: None, group_principal_id: None, access_type: AccessType::Member };
        assert!(validate_members(&[neither]).is_err());
    }

    #[test]
    fn validate_members_rejects_duplicates() {
        let members = vec![
            Member::user("local://u-1", AccessType::Owner),
            Member::user("local://u-1", AccessType::ReadOnly),
        ];
        assert!(validate_members(&members).is_err());

        let members = vec![
            Member::user("local://u-1", AccessType::Owner),
            Member::group("local://g-1", AccessType::ReadOnly),
        ];
        assert!(validate_members(&members).is_ok());
    }

    #[test]
    fn member_serializes_camel_case() {
        let member = Member::user("local://u-1", AccessType::ReadOnly);
        let json = serde_json::to_value(&member).unwrap();
        assert_eq!(json["userPrincipalId"], "local://u-1");
        assert_eq!(json["accessType"], "read-only");
        assert!(json.get("groupPrincipalId").is_none());
    }
}
