//! Cluster business logic service
//!
//! Creating a cluster or switching its revision changes the desired spec and
//! schedules a background reconcile. The reconcile waits for the configured
//! delay, then publishes the desired spec of that generation as applied. A
//! newer change in the meantime makes the older reconcile stale. Store
//! failures are retried a bounded number of times, and clusters still pending
//! when the process stops are re-driven by [`ClusterService::resume_pending`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::auth::AuthContext;
use crate::domain::{Answers, Cluster, ClusterId, NewCluster, RevisionId};
use crate::errors::Result;
use crate::observability::metrics::record_cluster_reconcile;
use crate::services::template_service::recorded;
use crate::storage::{ReconcileOutcome, TemplateStore};
use crate::store_span;

/// Service for managing clusters bound from revisions
#[derive(Clone)]
pub struct ClusterService {
    store: Arc<dyn TemplateStore>,
    reconcile_delay: Duration,
}

impl ClusterService {
    pub fn new(store: Arc<dyn TemplateStore>, reconcile_delay: Duration) -> Self {
        Self { store, reconcile_delay }
    }

    pub async fn create_cluster(&self, ctx: &AuthContext, request: NewCluster) -> Result<Cluster> {
        let span = store_span!(
            "create_cluster",
            revision_id = %request.cluster_template_revision_id
        );
        let result = self.store.create_cluster(ctx, request).instrument(span).await;
        let cluster = recorded("create_cluster", result)?;

        self.schedule_reconcile(&cluster);
        Ok(cluster)
    }

    pub async fn get_cluster(&self, ctx: &AuthContext, id: &ClusterId) -> Result<Cluster> {
        recorded("get_cluster", self.store.get_cluster(ctx, id).await)
    }

    pub async fn list_clusters(&self, ctx: &AuthContext) -> Result<Vec<Cluster>> {
        recorded("list_clusters", self.store.list_clusters(ctx).await)
    }

    /// Move a cluster onto another revision of its template.
    pub async fn switch_revision(
        &self,
        ctx: &AuthContext,
        id: &ClusterId,
        revision_id: &RevisionId,
        answers: Option<Answers>,
    ) -> Result<Cluster> {
        let span = store_span!("set_cluster_revision", cluster_id = %id, revision_id = %revision_id);
        let result =
            self.store.set_cluster_revision(ctx, id, revision_id, answers).instrument(span).await;
        let cluster = recorded("set_cluster_revision", result)?;

        self.schedule_reconcile(&cluster);
        Ok(cluster)
    }

    pub async fn delete_cluster(&self, ctx: &AuthContext, id: &ClusterId) -> Result<()> {
        let span = store_span!("delete_cluster", cluster_id = %id);
        let result = self.store.delete_cluster(ctx, id).instrument(span).await;
        recorded("delete_cluster", result)
    }

    /// Re-schedule reconciles for every cluster still converging.
    ///
    /// Called once at startup; each cluster is reconciled at the generation it
    /// was persisted with, so a change made after the restart still wins.
    pub async fn resume_pending(&self) -> Result<usize> {
        let pending = self.store.list_pending_clusters().await?;
        for cluster in &pending {
            debug!(
                cluster_id = %cluster.id,
                generation = cluster.generation,
                state = %cluster.state,
                "resuming pending reconcile"
            );
            self.schedule_reconcile(cluster);
        }
        if !pending.is_empty() {
            info!(count = pending.len(), "resumed pending cluster reconciles");
        }
        Ok(pending.len())
    }

    fn schedule_reconcile(&self, cluster: &Cluster) {
        let store = self.store.clone();
        let delay = self.reconcile_delay;
        let id = cluster.id.clone();
        let generation = cluster.generation;
        let span = info_span!("cluster_reconcile", cluster_id = %id, generation);

        tokio::spawn(
            async move {
                tokio::time::sleep(delay).await;
                reconcile_with_retry(store.as_ref(), &id, generation, retry_delay(delay)).await;
            }
            .instrument(span),
        );
    }
}

const MAX_RECONCILE_ATTEMPTS: u32 = 5;
const MIN_RETRY_DELAY: Duration = Duration::from_millis(50);

fn retry_delay(reconcile_delay: Duration) -> Duration {
    reconcile_delay.max(MIN_RETRY_DELAY)
}

/// Publish a reconcile, retrying store failures with a linear backoff.
///
/// Returns whether the reconcile reached a final outcome. A cluster left
/// pending after the last attempt is picked up again by
/// [`ClusterService::resume_pending`] on the next start.
async fn reconcile_with_retry(
    store: &dyn TemplateStore,
    id: &ClusterId,
    generation: i64,
    retry_delay: Duration,
) -> bool {
    for attempt in 1..=MAX_RECONCILE_ATTEMPTS {
        match store.complete_reconcile(id, generation).await {
            Ok(outcome) => {
                record_cluster_reconcile(outcome.label());
                match outcome {
                    ReconcileOutcome::Applied(cluster) => info!(
                        cluster_id = %id,
                        generation,
                        attempt,
                        state = %cluster.state,
                        "cluster reconciled"
                    ),
                    ReconcileOutcome::Stale { current_generation } => debug!(
                        cluster_id = %id,
                        generation,
                        current_generation,
                        "reconcile superseded by newer generation"
                    ),
                    ReconcileOutcome::Gone => {
                        debug!(cluster_id = %id, generation, "cluster deleted before reconcile")
                    }
                }
                return true;
            }
            Err(e) if attempt < MAX_RECONCILE_ATTEMPTS => {
                record_cluster_reconcile("retry");
                warn!(cluster_id = %id, generation, attempt, error = %e, "cluster reconcile failed, retrying");
                tokio::time::sleep(retry_delay * attempt).await;
            }
            Err(e) => {
                record_cluster_reconcile("error");
                error!(
                    cluster_id = %id,
                    generation,
                    attempts = MAX_RECONCILE_ATTEMPTS,
                    error = %e,
                    "cluster reconcile failed after all retries"
                );
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ClusterState, GlobalRole, NewRevision, NewTemplate, Principal, PrincipalId, Question,
        QuestionType, Revision, Template, TemplateId, TemplateUpdate,
    };
    use crate::errors::KeelsonError;
    use crate::storage::MemoryTemplateStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn owner() -> AuthContext {
        let principal_id = PrincipalId::from_str_unchecked("u-owner");
        let principal_ids = vec![Principal::local_principal_id(&principal_id)];
        AuthContext::new(principal_id, "owner".into(), principal_ids, vec![GlobalRole::TemplatesCreate])
    }

    async fn seeded(store: &Arc<MemoryTemplateStore>) -> (RevisionId, RevisionId) {
        let ctx = owner();
        let template = store
            .create_template(&ctx, NewTemplate { name: "t".into(), description: None, members: vec![] })
            .await
            .unwrap();

        let mut ids = Vec::new();
        for version in ["v1.27", "v1.28"] {
            let revision = store
                .create_revision(
                    &ctx,
                    &template.id,
                    NewRevision::new(version, json!({"kubernetesVersion": version})).with_questions(
                        vec![Question::new("kubernetesVersion", QuestionType::String).with_default(version)],
                    ),
                )
                .await
                .unwrap();
            ids.push(revision.id);
        }
        (ids[0].clone(), ids[1].clone())
    }

    #[tokio::test]
    async fn reconcile_publishes_after_delay() {
        let store = Arc::new(MemoryTemplateStore::new());
        let (r1, _) = seeded(&store).await;
        let service = ClusterService::new(store.clone(), Duration::from_millis(20));
        let ctx = owner();

        let cluster = service
            .create_cluster(
                &ctx,
                NewCluster { name: "c1".into(), cluster_template_revision_id: r1, answers: None },
            )
            .await
            .unwrap();
        assert_eq!(cluster.state, ClusterState::Provisioning);
        assert!(cluster.applied_spec.is_none());

        tokio::time::sleep(Duration::from_millis(200)).await;

        let cluster = service.get_cluster(&ctx, &cluster.id).await.unwrap();
        assert_eq!(cluster.state, ClusterState::Active);
        assert_eq!(cluster.applied_spec, Some(json!({"kubernetesVersion": "v1.27"})));
    }

    #[tokio::test]
    async fn older_reconcile_does_not_overwrite_newer_switch() {
        let store = Arc::new(MemoryTemplateStore::new());
        let (r1, r2) = seeded(&store).await;
        let service = ClusterService::new(store.clone(), Duration::from_millis(20));
        let ctx = owner();

        let cluster = service
            .create_cluster(
                &ctx,
                NewCluster { name: "c1".into(), cluster_template_revision_id: r1, answers: None },
            )
            .await
            .unwrap();
        let switched = service.switch_revision(&ctx, &cluster.id, &r2, None).await.unwrap();
        assert_eq!(switched.state, ClusterState::Updating);
        assert_eq!(switched.generation, 2);

        tokio::time::sleep(Duration::from_millis(200)).await;

        let done = service.get_cluster(&ctx, &cluster.id).await.unwrap();
        assert_eq!(done.state, ClusterState::Active);
        assert_eq!(done.generation, 2);
        assert_eq!(done.applied_spec, Some(json!({"kubernetesVersion": "v1.28"})));
    }

    #[tokio::test]
    async fn deleted_cluster_reconcile_is_harmless() {
        let store = Arc::new(MemoryTemplateStore::new());
        let (r1, _) = seeded(&store).await;
        let service = ClusterService::new(store.clone(), Duration::from_millis(20));
        let ctx = owner();

        let cluster = service
            .create_cluster(
                &ctx,
                NewCluster { name: "c1".into(), cluster_template_revision_id: r1, answers: None },
            )
            .await
            .unwrap();
        service.delete_cluster(&ctx, &cluster.id).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(service.list_clusters(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn resume_pending_drives_clusters_left_by_previous_process() {
        let store = Arc::new(MemoryTemplateStore::new());
        let (r1, r2) = seeded(&store).await;
        let ctx = owner();

        // Written straight to the store: no reconcile was ever scheduled.
        let provisioning = store
            .create_cluster(
                &ctx,
                NewCluster { name: "c1".into(), cluster_template_revision_id: r1.clone(), answers: None },
            )
            .await
            .unwrap();
        let other = store
            .create_cluster(
                &ctx,
                NewCluster { name: "c2".into(), cluster_template_revision_id: r1, answers: None },
            )
            .await
            .unwrap();
        store.complete_reconcile(&other.id, 1).await.unwrap();
        let updating = store.set_cluster_revision(&ctx, &other.id, &r2, None).await.unwrap();
        assert_eq!(updating.state, ClusterState::Updating);

        let restarted = ClusterService::new(store.clone(), Duration::from_millis(5));
        assert_eq!(restarted.resume_pending().await.unwrap(), 2);

        tokio::time::sleep(Duration::from_millis(300)).await;

        let first = restarted.get_cluster(&ctx, &provisioning.id).await.unwrap();
        assert_eq!(first.state, ClusterState::Active);
        let second = restarted.get_cluster(&ctx, &other.id).await.unwrap();
        assert_eq!(second.state, ClusterState::Active);
        assert_eq!(second.applied_spec, Some(json!({"kubernetesVersion": "v1.28"})));
        assert_eq!(restarted.resume_pending().await.unwrap(), 0);
    }

    /// Template store whose reconcile publishing fails a set number of times.
    struct FlakyReconcileStore {
        inner: MemoryTemplateStore,
        failures_left: AtomicU32,
        attempts: AtomicU32,
    }

    impl FlakyReconcileStore {
        fn new(failures: u32) -> Self {
            Self {
                inner: MemoryTemplateStore::new(),
                failures_left: AtomicU32::new(failures),
                attempts: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl TemplateStore for FlakyReconcileStore {
        async fn create_template(&self, ctx: &AuthContext, request: NewTemplate) -> Result<Template> {
            self.inner.create_template(ctx, request).await
        }

        async fn get_template(&self, ctx: &AuthContext, id: &TemplateId) -> Result<Template> {
            self.inner.get_template(ctx, id).await
        }

        async fn list_templates(&self, ctx: &AuthContext) -> Result<Vec<Template>> {
            self.inner.list_templates(ctx).await
        }

        async fn update_template(
            &self,
            ctx: &AuthContext,
            id: &TemplateId,
            update: TemplateUpdate,
        ) -> Result<Template> {
            self.inner.update_template(ctx, id, update).await
        }

        async fn delete_template(&self, ctx: &AuthContext, id: &TemplateId) -> Result<()> {
            self.inner.delete_template(ctx, id).await
        }

        async fn create_revision(
            &self,
            ctx: &AuthContext,
            template_id: &TemplateId,
            request: NewRevision,
        ) -> Result<Revision> {
            self.inner.create_revision(ctx, template_id, request).await
        }

        async fn get_revision(&self, ctx: &AuthContext, id: &RevisionId) -> Result<Revision> {
            self.inner.get_revision(ctx, id).await
        }

        async fn list_revisions(
            &self,
            ctx: &AuthContext,
            template_id: &TemplateId,
        ) -> Result<Vec<Revision>> {
            self.inner.list_revisions(ctx, template_id).await
        }

        async fn set_revision_enabled(
            &self,
            ctx: &AuthContext,
            id: &RevisionId,
            enabled: bool,
        ) -> Result<Revision> {
            self.inner.set_revision_enabled(ctx, id, enabled).await
        }

        async fn delete_revision(&self, ctx: &AuthContext, id: &RevisionId) -> Result<()> {
            self.inner.delete_revision(ctx, id).await
        }

        async fn create_cluster(&self, ctx: &AuthContext, request: NewCluster) -> Result<Cluster> {
            self.inner.create_cluster(ctx, request).await
        }

        async fn get_cluster(&self, ctx: &AuthContext, id: &ClusterId) -> Result<Cluster> {
            self.inner.get_cluster(ctx, id).await
        }

        async fn list_clusters(&self, ctx: &AuthContext) -> Result<Vec<Cluster>> {
            self.inner.list_clusters(ctx).await
        }

        async fn set_cluster_revision(
            &self,
            ctx: &AuthContext,
            id: &ClusterId,
            revision_id: &RevisionId,
            answers: Option<Answers>,
        ) -> Result<Cluster> {
            self.inner.set_cluster_revision(ctx, id, revision_id, answers).await
        }

        async fn delete_cluster(&self, ctx: &AuthContext, id: &ClusterId) -> Result<()> {
            self.inner.delete_cluster(ctx, id).await
        }

        async fn list_pending_clusters(&self) -> Result<Vec<Cluster>> {
            self.inner.list_pending_clusters().await
        }

        async fn complete_reconcile(&self, id: &ClusterId, generation: i64) -> Result<ReconcileOutcome> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures_left.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_left.store(remaining - 1, Ordering::SeqCst);
                return Err(KeelsonError::internal("connection reset"));
            }
            self.inner.complete_reconcile(id, generation).await
        }
    }

    async fn flaky_cluster(failures: u32) -> (Arc<FlakyReconcileStore>, Cluster) {
        let store = Arc::new(FlakyReconcileStore::new(failures));
        let ctx = owner();
        let template = store
            .create_template(&ctx, NewTemplate { name: "t".into(), description: None, members: vec![] })
            .await
            .unwrap();
        let revision = store
            .create_revision(&ctx, &template.id, NewRevision::new("v1", json!({"a": 1})))
            .await
            .unwrap();
        let cluster = store
            .create_cluster(
                &ctx,
                NewCluster { name: "c1".into(), cluster_template_revision_id: revision.id, answers: None },
            )
            .await
            .unwrap();
        (store, cluster)
    }

    #[tokio::test]
    async fn transient_reconcile_failures_are_retried() {
        let (store, cluster) = flaky_cluster(2).await;

        let settled =
            reconcile_with_retry(store.as_ref(), &cluster.id, 1, Duration::from_millis(1)).await;
        assert!(settled);
        assert_eq!(store.attempts.load(Ordering::SeqCst), 3);

        let cluster = store.get_cluster(&owner(), &cluster.id).await.unwrap();
        assert_eq!(cluster.state, ClusterState::Active);
    }

    #[tokio::test]
    async fn exhausted_retries_leave_cluster_pending_for_resume() {
        let (store, cluster) = flaky_cluster(MAX_RECONCILE_ATTEMPTS).await;

        let settled =
            reconcile_with_retry(store.as_ref(), &cluster.id, 1, Duration::from_millis(1)).await;
        assert!(!settled);
        assert_eq!(store.attempts.load(Ordering::SeqCst), MAX_RECONCILE_ATTEMPTS);

        let pending = store.list_pending_clusters().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].state, ClusterState::Provisioning);

        let service = ClusterService::new(store.clone(), Duration::from_millis(1));
        assert_eq!(service.resume_pending().await.unwrap(), 1);
        tokio::time::sleep(Duration::from_millis(200)).await;
        let cluster = store.get_cluster(&owner(), &cluster.id).await.unwrap();
        assert_eq!(cluster.state, ClusterState::Active);
    }
}
