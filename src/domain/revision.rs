//! Cluster template revisions and their parameterized questions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use utoipa::ToSchema;
use validator::Validate;

use crate::domain::{PrincipalId, RevisionId, TemplateId};
use crate::errors::{KeelsonError, Result};
use crate::utils::{lenient_bool, lenient_bool_opt, VARIABLE_PATH_REGEX};

/// Declared type of a question's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    String,
    Int,
    Boolean,
    Password,
    Enum,
    Multiline,
}

/// A variable exposed for override when a revision is bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Dot-separated path into the revision's cluster config.
    pub variable: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub required: bool,
    #[serde(rename = "type", default = "default_question_type")]
    pub question_type: QuestionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Allowed values for `enum` questions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_question_type() -> QuestionType {
    QuestionType::String
}

impl Question {
    pub fn new(variable: impl Into<String>, question_type: QuestionType) -> Self {
        Self {
            variable: variable.into(),
            required: false,
            question_type,
            default: None,
            options: Vec::new(),
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    /// The default, if it is usable as a value. Empty strings are placeholders.
    pub fn usable_default(&self) -> Option<&str> {
        self.default.as_deref().filter(|d| !d.is_empty())
    }

    /// Convert a raw answer or default into a value of the declared type.
    pub fn coerce(&self, value: &Value) -> Result<Value> {
        let invalid = |expected: &str| {
            KeelsonError::validation_field(
                format!("value {} is not a valid {}", value, expected),
                self.variable.clone(),
            )
        };

        match self.question_type {
            QuestionType::String | QuestionType::Password | QuestionType::Multiline => {
                match value {
                    Value::String(_) => Ok(value.clone()),
                    Value::Number(n) => Ok(Value::String(n.to_string())),
                    Value::Bool(b) => Ok(Value::String(b.to_string())),
                    _ => Err(invalid("string")),
                }
            }
            QuestionType::Int => match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
                Value::String(s) => {
                    s.trim().parse::<i64>().map(Value::from).map_err(|_| invalid("int"))
                }
                _ => Err(invalid("int")),
            },
            QuestionType::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    _ => Err(invalid("boolean")),
                },
                _ => Err(invalid("boolean")),
            },
            QuestionType::Enum => match value {
                Value::String(s) if self.options.iter().any(|o| o == s) => Ok(value.clone()),
                _ => Err(KeelsonError::validation_field(
                    format!("value {} is not one of [{}]", value, self.options.join(", ")),
                    self.variable.clone(),
                )),
            },
        }
    }
}

/// Schema checks on a question list.
pub fn validate_questions(questions: &[Question]) -> Result<()> {
    let mut seen = HashSet::new();

    for (index, question) in questions.iter().enumerate() {
        let field = format!("questions[{}].variable", index);

        if !VARIABLE_PATH_REGEX.is_match(&question.variable) {
            return Err(KeelsonError::validation_field(
                format!("invalid variable path '{}'", question.variable),
                field,
            ));
        }

        if !seen.insert(question.variable.as_str()) {
            return Err(KeelsonError::validation_field(
                format!("variable '{}' is declared more than once", question.variable),
                field,
            ));
        }

        if question.question_type == QuestionType::Enum && question.options.is_empty() {
            return Err(KeelsonError::validation_field(
                format!("enum question '{}' must declare options", question.variable),
                format!("questions[{}].options", index),
            ));
        }

        if let Some(default) = question.usable_default() {
            question.coerce(&Value::String(default.to_string()))?;
        }
    }

    // A variable may not be both a leaf and a parent of another variable.
    for question in questions {
        let prefix = format!("{}.", question.variable);
        if let Some(nested) = questions.iter().find(|q| q.variable.starts_with(&prefix)) {
            return Err(KeelsonError::validation(format!(
                "variable '{}' overlaps with '{}'",
                question.variable, nested.variable
            )));
        }
    }

    Ok(())
}

/// An immutable configuration snapshot under a template.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    pub id: RevisionId,
    pub template_id: TemplateId,
    pub name: String,
    #[schema(value_type = Object)]
    pub cluster_config: Value,
    pub questions: Vec<Question>,
    pub enabled: bool,
    pub creator_id: PrincipalId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Revision {
    pub fn question(&self, variable: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.variable == variable)
    }
}

/// Request to create a revision under a template.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewRevision {
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: String,
    #[schema(value_type = Object)]
    pub cluster_config: Value,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default, deserialize_with = "lenient_bool_opt")]
    pub enabled: Option<bool>,
}

impl NewRevision {
    pub fn new(name: impl Into<String>, cluster_config: Value) -> Self {
        Self { name: name.into(), cluster_config, questions: Vec::new(), enabled: None }
    }

    pub fn with_questions(mut self, questions: Vec<Question>) -> Self {
        self.questions = questions;
        self
    }

    /// Full payload validation: field lengths, config shape and question schema.
    pub fn validate_payload(&self) -> Result<()> {
        Validate::validate(self).map_err(KeelsonError::from)?;

        if !self.cluster_config.is_object() {
            return Err(KeelsonError::validation_field(
                "clusterConfig must be a JSON object",
                "clusterConfig",
            ));
        }

        validate_questions(&self.questions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn question_deserializes_string_flags() {
        let question: Question = serde_json::from_value(json!({
            "variable": "rancherKubernetesEngineConfig.network.plugin",
            "required": "true",
            "type": "string",
            "default": "canal"
        }))
        .unwrap();

        assert!(question.required);
        assert_eq!(question.question_type, QuestionType::String);
        assert_eq!(question.usable_default(), Some("canal"));
    }

    #[test]
    fn empty_default_is_not_usable() {
        let question = Question::new("a.b", QuestionType::String).with_default("");
        assert_eq!(question.usable_default(), None);
    }

    #[test]
    fn coerce_int_and_boolean() {
        let q = Question::new("addonJobTimeout", QuestionType::Int);
        assert_eq!(q.coerce(&json!("30")).unwrap(), json!(30));
        assert_eq!(q.coerce(&json!(45)).unwrap(), json!(45));
        assert!(q.coerce(&json!("thirty")).is_err());
        assert!(q.coerce(&json!(1.5)).is_err());

        let q = Question::new("enableNetworkPolicy", QuestionType::Boolean);
        assert_eq!(q.coerce(&json!("true")).unwrap(), json!(true));
        assert_eq!(q.coerce(&json!(false)).unwrap(), json!(false));
        assert!(q.coerce(&json!("maybe")).is_err());
    }

    #[test]
    fn coerce_enum_checks_options() {
        let q = Question::new("network.plugin", QuestionType::Enum)
            .with_options(["canal", "flannel", "calico"]);
        assert_eq!(q.coerce(&json!("flannel")).unwrap(), json!("flannel"));
        assert!(q.coerce(&json!("weave")).is_err());
    }

    #[test]
    fn coerce_string_stringifies_scalars() {
        let q = Question::new("dockerRootDir", QuestionType::String);
        assert_eq!(q.coerce(&json!(12)).unwrap(), json!("12"));
        assert!(q.coerce(&json!({"nested": true})).is_err());
    }

    #[test]
    fn validate_questions_rejects_bad_schema() {
        let bad_path = vec![Question::new("a..b", QuestionType::String)];
        assert!(validate_questions(&bad_path).is_err());

        let duplicate =
            vec![Question::new("a.b", QuestionType::String), Question::new("a.b", QuestionType::Int)];
        assert!(validate_questions(&duplicate).is_err());

        let enum_without_options = vec![Question::new("a", QuestionType::Enum)];
        assert!(validate_questions(&enum_without_options).is_err());

        let bad_default = vec![Question::new("a", QuestionType::Int).with_default("ten")];
        assert!(validate_questions(&bad_default).is_err());

        let overlapping =
            vec![Question::new("a", QuestionType::String), Question::new("a.b", QuestionType::String)];
        assert!(validate_questions(&overlapping).is_err());
    }

    #[test]
    fn validate_questions_accepts_placeholder_defaults() {
        let questions = vec![
            Question::new("services.etcd.backupConfig.s3BackupConfig.bucketName", QuestionType::String)
                .required()
                .with_default(""),
            Question::new("kubernetesVersion", QuestionType::String).required().with_default("v1.28"),
        ];
        assert!(validate_questions(&questions).is_ok());
    }

    #[test]
    fn new_revision_requires_object_config() {
        let revision = NewRevision::new("r1", json!(["not", "an", "object"]));
        assert!(revision.validate_payload().is_err());

        let revision = NewRevision::new("r1", json!({"dockerRootDir": "/var/lib/docker"}));
        assert!(revision.validate_payload().is_ok());

        let revision = NewRevision::new("", json!({}));
        assert!(revision.validate_payload().is_err());
    }
}
