//! Clusters bound from template revisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;
use validator::Validate;

use crate::domain::{ClusterId, PrincipalId, RevisionId, TemplateId};

/// Caller-supplied overrides keyed by question variable path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Answers {
    #[serde(default)]
    #[schema(value_type = Object)]
    pub values: Map<String, Value>,
}

impl Answers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, variable: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(variable.into(), value.into());
        self
    }

    pub fn get(&self, variable: &str) -> Option<&Value> {
        self.values.get(variable)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Reconciliation state of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ClusterState {
    /// Created; first applied spec not yet published.
    Provisioning,
    /// Spec changed; new applied spec not yet published.
    Updating,
    Active,
}

impl ClusterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterState::Provisioning => "provisioning",
            ClusterState::Updating => "updating",
            ClusterState::Active => "active",
        }
    }

    /// Whether the cluster is still converging.
    pub fn is_transitioning(&self) -> bool {
        !matches!(self, ClusterState::Active)
    }
}

impl Display for ClusterState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ClusterState {
    type Err = ClusterStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provisioning" => Ok(ClusterState::Provisioning),
            "updating" => Ok(ClusterState::Updating),
            "active" => Ok(ClusterState::Active),
            other => Err(ClusterStateParseError(other.to_string())),
        }
    }
}

/// Error returned when cluster state parsing fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid cluster state: {0}")]
pub struct ClusterStateParseError(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub id: ClusterId,
    pub name: String,
    pub owner_id: PrincipalId,
    pub template_id: TemplateId,
    pub revision_id: RevisionId,
    pub answers: Answers,
    /// Spec the reconciler is converging towards.
    #[schema(value_type = Object)]
    pub desired_spec: Value,
    /// Spec published by the last completed reconcile.
    #[schema(value_type = Option<Object>)]
    pub applied_spec: Option<Value>,
    pub state: ClusterState,
    /// Bumped on every desired spec change; stale reconciles are discarded.
    pub generation: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a cluster from a revision.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewCluster {
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: String,
    pub cluster_template_revision_id: RevisionId,
    #[serde(default)]
    pub answers: Option<Answers>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cluster_state_round_trip() {
        for state in [ClusterState::Provisioning, ClusterState::Updating, ClusterState::Active] {
            assert_eq!(state.as_str().parse::<ClusterState>().unwrap(), state);
        }
        assert!("error".parse::<ClusterState>().is_err());
    }

    #[test]
    fn only_active_is_settled() {
        assert!(ClusterState::Provisioning.is_transitioning());
        assert!(ClusterState::Updating.is_transitioning());
        assert!(!ClusterState::Active.is_transitioning());
    }

    #[test]
    fn answers_deserialize_values_map() {
        let answers: Answers = serde_json::from_value(json!({
            "values": {
                "rancherKubernetesEngineConfig.network.plugin": "flannel"
            }
        }))
        .unwrap();

        assert_eq!(answers.get("rancherKubernetesEngineConfig.network.plugin"), Some(&json!("flannel")));
        assert!(Answers::new().is_empty());
    }
}
