use serde::Deserialize;
use utoipa::ToSchema;

use crate::domain::{Answers, RevisionId};

/// Move a cluster onto another revision of its template.
///
/// Without `answers` the previous answers carry over for questions the new
/// revision still declares.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "clusterTemplateRevisionId": "ctr-6f1c0d36-3a7e-4b55-9a41-0c1f0f1f7f2a",
    "answers": {"values": {"rancherKubernetesEngineConfig.kubernetesVersion": "v1.28.4"}}
}))]
pub struct SwitchRevisionBody {
    pub cluster_template_revision_id: RevisionId,
    #[serde(default)]
    pub answers: Option<Answers>,
}
