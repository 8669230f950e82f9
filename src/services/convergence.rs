//! Bounded polling for cluster convergence.
//!
//! Reconciles complete asynchronously, so callers that need a settled cluster
//! poll until it reaches the state they expect. Intermediate states are
//! expected along the way; only the overall bound turns into an error.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::auth::AuthContext;
use crate::config::ConvergenceConfig;
use crate::domain::{Cluster, ClusterId, ClusterState};
use crate::errors::{KeelsonError, Result};
use crate::storage::TemplateStore;

#[derive(Clone)]
pub struct ConvergenceWaiter {
    store: Arc<dyn TemplateStore>,
    poll_interval: Duration,
    timeout: Duration,
}

impl ConvergenceWaiter {
    pub fn new(store: Arc<dyn TemplateStore>, config: &ConvergenceConfig) -> Self {
        Self::with_timing(store, config.poll_interval(), config.wait_timeout())
    }

    pub fn with_timing(store: Arc<dyn TemplateStore>, poll_interval: Duration, timeout: Duration) -> Self {
        Self { store, poll_interval, timeout }
    }

    /// Poll until the cluster is in `target`.
    #[instrument(skip(self, ctx), fields(principal_id = %ctx.principal_id))]
    pub async fn wait_for_state(
        &self,
        ctx: &AuthContext,
        id: &ClusterId,
        target: ClusterState,
    ) -> Result<Cluster> {
        let deadline = Instant::now() + self.timeout;
        self.poll_until(ctx, id, target, deadline).await
    }

    /// Poll until the cluster has been seen in `intermediate` and then in
    /// `target`. Both phases share one bound.
    ///
    /// Call this while the change that triggers `intermediate` is still
    /// pending; a cluster that already settled never shows it again.
    #[instrument(skip(self, ctx), fields(principal_id = %ctx.principal_id))]
    pub async fn wait_for_transition(
        &self,
        ctx: &AuthContext,
        id: &ClusterId,
        intermediate: ClusterState,
        target: ClusterState,
    ) -> Result<Cluster> {
        let deadline = Instant::now() + self.timeout;
        self.poll_until(ctx, id, intermediate, deadline).await?;
        self.poll_until(ctx, id, target, deadline).await
    }

    async fn poll_until(
        &self,
        ctx: &AuthContext,
        id: &ClusterId,
        state: ClusterState,
        deadline: Instant,
    ) -> Result<Cluster> {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let cluster = self.store.get_cluster(ctx, id).await?;
            if cluster.state == state {
                debug!(cluster_id = %id, state = %state, attempts, "cluster reached state");
                return Ok(cluster);
            }

            if Instant::now() + self.poll_interval > deadline {
                warn!(
                    cluster_id = %id,
                    expected = %state,
                    observed = %cluster.state,
                    attempts,
                    "timed out waiting for cluster state"
                );
                return Err(KeelsonError::timeout(
                    format!("waiting for cluster '{}' to become {}", id, state),
                    self.timeout.as_millis() as u64,
                ));
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GlobalRole, NewCluster, NewRevision, NewTemplate, Principal, PrincipalId};
    use crate::services::ClusterService;
    use crate::storage::MemoryTemplateStore;
    use serde_json::json;

    fn ctx(id: &str) -> AuthContext {
        let principal_id = PrincipalId::from_str_unchecked(id);
        let principal_ids = vec![Principal::local_principal_id(&principal_id)];
        AuthContext::new(principal_id, id.into(), principal_ids, vec![GlobalRole::TemplatesCreate])
    }

    async fn cluster_with_delay(delay: Duration) -> (Arc<MemoryTemplateStore>, ClusterService, Cluster) {
        let store = Arc::new(MemoryTemplateStore::new());
        let owner = ctx("u-owner");
        let template = store
            .create_template(&owner, NewTemplate { name: "t".into(), description: None, members: vec![] })
            .await
            .unwrap();
        let revision = store
            .create_revision(&owner, &template.id, NewRevision::new("v1", json!({"a": 1})))
            .await
            .unwrap();

        let service = ClusterService::new(store.clone(), delay);
        let cluster = service
            .create_cluster(
                &owner,
                NewCluster { name: "c1".into(), cluster_template_revision_id: revision.id, answers: None },
            )
            .await
            .unwrap();
        (store, service, cluster)
    }

    #[tokio::test]
    async fn waits_through_provisioning_to_active() {
        let (store, _service, cluster) = cluster_with_delay(Duration::from_millis(50)).await;
        let waiter =
            ConvergenceWaiter::with_timing(store, Duration::from_millis(5), Duration::from_secs(5));

        let settled = waiter
            .wait_for_transition(&ctx("u-owner"), &cluster.id, ClusterState::Provisioning, ClusterState::Active)
            .await
            .unwrap();
        assert_eq!(settled.state, ClusterState::Active);
        assert!(settled.applied_spec.is_some());
    }

    #[tokio::test]
    async fn times_out_when_state_is_never_reached() {
        let (store, _service, cluster) = cluster_with_delay(Duration::from_secs(60)).await;
        let waiter =
            ConvergenceWaiter::with_timing(store, Duration::from_millis(5), Duration::from_millis(40));

        let err = waiter
            .wait_for_state(&ctx("u-owner"), &cluster.id, ClusterState::Active)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "Timeout");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn invisible_cluster_fails_fast() {
        let (store, _service, cluster) = cluster_with_delay(Duration::from_millis(10)).await;
        let waiter =
            ConvergenceWaiter::with_timing(store, Duration::from_millis(5), Duration::from_secs(5));

        let err = waiter
            .wait_for_state(&ctx("u-stranger"), &cluster.id, ClusterState::Active)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NotFound");
    }
}
