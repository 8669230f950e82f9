use serde::{Deserialize, Deserializer};
use utoipa::ToSchema;

use crate::domain::{parse_members, MemberInput, NewTemplate, RevisionId, TemplateUpdate};
use crate::errors::Result;
use crate::utils::lenient_bool;

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "name": "new_template",
    "description": "RKE template for production clusters",
    "members": [
        {"userPrincipalId": "local://u-b4qkhsnliz", "accessType": "read-only"}
    ]
}))]
pub struct CreateTemplateBody {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub members: Vec<MemberInput>,
}

impl CreateTemplateBody {
    pub fn into_request(self) -> Result<NewTemplate> {
        Ok(NewTemplate {
            name: self.name,
            description: self.description,
            members: parse_members(self.members)?,
        })
    }
}

/// Partial template update. Absent fields are left untouched; an explicit
/// `"defaultRevisionId": null` clears the default.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTemplateBody {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub members: Option<Vec<MemberInput>>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub default_revision_id: Option<Option<RevisionId>>,
}

impl UpdateTemplateBody {
    pub fn into_update(self) -> Result<TemplateUpdate> {
        let members = self.members.map(parse_members).transpose()?;
        Ok(TemplateUpdate {
            name: self.name,
            description: self.description,
            members,
            default_revision_id: self.default_revision_id,
        })
    }
}

/// Distinguish an explicit `null` from an absent field.
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "members": [
        {"userPrincipalId": "local://u-b4qkhsnliz", "accessType": "member"},
        {"groupPrincipalId": "local://g-platform", "accessType": "read-only"}
    ]
}))]
pub struct SetMembersBody {
    pub members: Vec<MemberInput>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SetEnabledBody {
    #[serde(deserialize_with = "lenient_bool")]
    #[schema(value_type = bool)]
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccessType;
    use serde_json::json;

    #[test]
    fn update_distinguishes_null_from_absent() {
        let absent: UpdateTemplateBody = serde_json::from_value(json!({"name": "x"})).unwrap();
        assert!(absent.default_revision_id.is_none());

        let cleared: UpdateTemplateBody =
            serde_json::from_value(json!({"defaultRevisionId": null})).unwrap();
        assert_eq!(cleared.default_revision_id, Some(None));

        let set: UpdateTemplateBody =
            serde_json::from_value(json!({"defaultRevisionId": "ctr-1"})).unwrap();
        assert_eq!(set.default_revision_id, Some(Some(RevisionId::from_str_unchecked("ctr-1"))));
    }

    #[test]
    fn unknown_access_type_names_the_entry() {
        let body: SetMembersBody = serde_json::from_value(json!({
            "members": [
                {"userPrincipalId": "local://u-1", "accessType": "owner"},
                {"userPrincipalId": "local://u-2", "accessType": "superuser"}
            ]
        }))
        .unwrap();

        let err = parse_members(body.members).unwrap_err();
        assert_eq!(err.code(), "InvalidBodyContent");
        assert!(err.to_string().contains("superuser"));
    }

    #[test]
    fn create_body_parses_members() {
        let body: CreateTemplateBody = serde_json::from_value(json!({
            "name": "new_template",
            "members": [{"groupPrincipalId": "local://g-ops", "accessType": "read-only"}]
        }))
        .unwrap();
        let request = body.into_request().unwrap();
        assert_eq!(request.members[0].access_type, AccessType::ReadOnly);
    }

    #[test]
    fn enabled_accepts_string_booleans() {
        let body: SetEnabledBody = serde_json::from_value(json!({"enabled": "false"})).unwrap();
        assert!(!body.enabled);
    }
}
