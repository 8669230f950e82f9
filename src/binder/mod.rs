//! Cluster binder: resolves a revision plus caller answers into the spec a
//! cluster is reconciled towards.
//!
//! Binding starts from a copy of the revision's `clusterConfig`. Each
//! question contributes its answer, or failing that its default, coerced to
//! the question type and written at the question's dot path. Config keys no
//! question mentions pass through untouched. Binding is pure and fails fast
//! on the first problem.

use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::{Answers, Question, Revision};
use crate::errors::{KeelsonError, Result};

/// Bind `answers` onto `revision`, producing the materialized cluster spec.
pub fn bind(revision: &Revision, answers: &Answers) -> Result<Value> {
    let mut spec = revision.cluster_config.clone();
    if !spec.is_object() {
        return Err(KeelsonError::validation_field(
            "clusterConfig must be a JSON object",
            "clusterConfig",
        ));
    }

    if let Some(undeclared) = answers.values.keys().find(|path| revision.question(path).is_none()) {
        return Err(KeelsonError::validation_field(
            format!("answer '{}' does not match any question of revision '{}'", undeclared, revision.id),
            format!("answers.values.{}", undeclared),
        ));
    }

    for question in &revision.questions {
        let Some(raw) = resolve_value(question, answers)? else {
            continue;
        };

        let value = question.coerce(&raw)?;
        set_path(&mut spec, &question.variable, value)?;
    }

    debug!(
        revision_id = %revision.id,
        questions = revision.questions.len(),
        answers = answers.values.len(),
        "revision bound"
    );

    Ok(spec)
}

/// Answer if present, else a usable default. `None` means leave the config as is.
fn resolve_value(question: &Question, answers: &Answers) -> Result<Option<Value>> {
    match answers.get(&question.variable) {
        Some(Value::Null) | None => {}
        Some(answer) => return Ok(Some(answer.clone())),
    }

    if let Some(default) = question.usable_default() {
        return Ok(Some(Value::String(default.to_string())));
    }

    if question.required {
        return Err(KeelsonError::validation_field(
            format!("question '{}' is required and has no answer or default", question.variable),
            format!("answers.values.{}", question.variable),
        ));
    }

    Ok(None)
}

/// Write `value` at a dot-separated path, creating intermediate objects.
pub fn set_path(root: &mut Value, path: &str, value: Value) -> Result<()> {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((leaf, parents)) = segments.split_last() else {
        return Err(KeelsonError::validation(format!("empty variable path '{}'", path)));
    };

    let mut current = root;
    for (depth, segment) in parents.iter().enumerate() {
        let object = as_object(current, path, &segments[..depth])?;
        current = object.entry(segment.to_string()).or_insert_with(|| Value::Object(Map::new()));
    }

    let object = as_object(current, path, parents)?;
    object.insert(leaf.to_string(), value);
    Ok(())
}

fn as_object<'a>(
    value: &'a mut Value,
    path: &str,
    walked: &[&str],
) -> Result<&'a mut Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => {
            let at = if walked.is_empty() { "<root>".to_string() } else { walked.join(".") };
            Err(KeelsonError::validation_field(
                format!(
                    "cannot write '{}': '{}' holds a {} rather than an object",
                    path,
                    at,
                    json_kind(other)
                ),
                path.to_string(),
            ))
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PrincipalId, QuestionType, RevisionId, TemplateId};
    use chrono::Utc;
    use serde_json::json;

    fn revision(config: Value, questions: Vec<Question>) -> Revision {
        Revision {
            id: RevisionId::from_str_unchecked("ctr-test"),
            template_id: TemplateId::from_str_unchecked("ct-test"),
            name: "v1".into(),
            cluster_config: config,
            questions,
            enabled: true,
            creator_id: PrincipalId::from_str_unchecked("u-owner"),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn default_applies_without_answer() {
        let rev = revision(json!({}), vec![Question::new("a.b", QuestionType::String).with_default("x")]);
        let spec = bind(&rev, &Answers::new()).unwrap();
        assert_eq!(spec, json!({"a": {"b": "x"}}));
    }

    #[test]
    fn answer_overrides_default() {
        let rev = revision(json!({}), vec![Question::new("a.b", QuestionType::String).with_default("x")]);
        let spec = bind(&rev, &Answers::new().with("a.b", "y")).unwrap();
        assert_eq!(spec["a"]["b"], "y");
    }

    #[test]
    fn unlisted_config_passes_through() {
        let config = json!({
            "dockerRootDir": "/var/lib/docker",
            "rancherKubernetesEngineConfig": {
                "kubernetesVersion": "v1.27",
                "services": {"etcd": {"backupConfig": {"enabled": true, "intervalHours": 12}}}
            }
        });
        let rev = revision(
            config,
            vec![Question::new("rancherKubernetesEngineConfig.kubernetesVersion", QuestionType::String)
                .required()
                .with_default("v1.27")],
        );

        let spec = bind(
            &rev,
            &Answers::new().with("rancherKubernetesEngineConfig.kubernetesVersion", "v1.28"),
        )
        .unwrap();

        assert_eq!(spec["rancherKubernetesEngineConfig"]["kubernetesVersion"], "v1.28");
        assert_eq!(
            spec["rancherKubernetesEngineConfig"]["services"]["etcd"]["backupConfig"],
            json!({"enabled": true, "intervalHours": 12})
        );
        assert_eq!(spec["dockerRootDir"], "/var/lib/docker");
    }

    #[test]
    fn required_without_answer_or_default_fails() {
        let rev = revision(
            json!({}),
            vec![Question::new("services.etcd.backupConfig.s3BackupConfig.bucketName", QuestionType::String)
                .required()
                .with_default("")],
        );
        let err = bind(&rev, &Answers::new()).unwrap_err();
        assert_eq!(err.code(), "InvalidBodyContent");

        let spec = bind(
            &rev,
            &Answers::new().with("services.etcd.backupConfig.s3BackupConfig.bucketName", "backups"),
        )
        .unwrap();
        assert_eq!(spec["services"]["etcd"]["backupConfig"]["s3BackupConfig"]["bucketName"], "backups");
    }

    #[test]
    fn optional_without_value_is_skipped() {
        let rev = revision(json!({"keep": 1}), vec![Question::new("a.b", QuestionType::String)]);
        assert_eq!(bind(&rev, &Answers::new()).unwrap(), json!({"keep": 1}));
    }

    #[test]
    fn undeclared_answer_is_rejected() {
        let rev = revision(json!({}), vec![Question::new("a.b", QuestionType::String).with_default("x")]);
        let err = bind(&rev, &Answers::new().with("a.c", "y")).unwrap_err();
        match err {
            KeelsonError::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("answers.values.a.c"))
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn values_are_coerced_to_question_type() {
        let rev = revision(
            json!({}),
            vec![
                Question::new("addonJobTimeout", QuestionType::Int).with_default("30"),
                Question::new("ignoreDockerVersion", QuestionType::Boolean).with_default("true"),
            ],
        );
        let spec = bind(&rev, &Answers::new().with("addonJobTimeout", "45")).unwrap();
        assert_eq!(spec["addonJobTimeout"], json!(45));
        assert_eq!(spec["ignoreDockerVersion"], json!(true));

        let err = bind(&rev, &Answers::new().with("addonJobTimeout", "soon")).unwrap_err();
        assert_eq!(err.code(), "InvalidBodyContent");
    }

    #[test]
    fn writing_through_scalar_fails() {
        let rev = revision(
            json!({"network": "canal"}),
            vec![Question::new("network.plugin", QuestionType::String).with_default("flannel")],
        );
        let err = bind(&rev, &Answers::new()).unwrap_err();
        assert!(err.to_string().contains("network"));
    }

    #[test]
    fn bind_does_not_mutate_revision() {
        let rev = revision(json!({"a": {}}), vec![Question::new("a.b", QuestionType::String).with_default("x")]);
        let _ = bind(&rev, &Answers::new()).unwrap();
        assert_eq!(rev.cluster_config, json!({"a": {}}));
    }
}
