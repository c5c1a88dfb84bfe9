//! The saga executor: the six-step creation lifecycle with compensation.
//! Each step is its own typed method rather than a dynamic name-based
//! dispatch, which keeps the compiler checking that every step produces
//! the state the next one needs.

use std::collections::HashSet;
use std::sync::Arc;

use atlas_core::AtlasError;
use atlas_products::ProductRegistry;
use atlas_provisioner::{ApplyOutcome, ResourceProvisioner};
use atlas_replication::{needs_replication, ReplicationManager};
use atlas_scheduler::{ScheduleRequest, SchedulerState};
use atlas_store::{PlacementRecord, PlacementStatus, SagaRecord, SagaState, Store};
use chrono::Utc;
use uuid::Uuid;

use crate::claim::build_claim;
use crate::request::CreateRequest;

/// Canonical step order; `SagaRecord::steps_completed` is always a
/// prefix of this list.
pub const SAGA_STEPS: [&str; 6] =
    ["validate", "schedule", "apply_claim", "wait_ready", "register", "notify"];

/// The saga's terminal result for a successful creation.
#[derive(Debug, Clone)]
pub struct Placed {
    pub saga_id: Uuid,
    pub placement_id: Uuid,
    pub decision: atlas_scheduler::Decision,
    pub claim: atlas_provisioner::ResourceDocument,
    /// `false` when the provisioner was unavailable and the saga
    /// completed in standalone mode.
    pub applied: bool,
}

/// What `create` returns: either a fresh placement, or the existing one
/// the sticky-placement check found.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(Placed),
    Sticky(PlacementRecord),
}

pub struct SagaExecutor {
    store: Arc<dyn Store>,
    scheduler: Arc<SchedulerState>,
    products: Arc<ProductRegistry>,
    provisioner: Arc<dyn ResourceProvisioner>,
    /// Opens a replication pair for cross-cloud tiers once `register`
    /// succeeds. `None` runs the saga without DR wiring (e.g. a
    /// standalone test fixture that doesn't need it).
    replication: Option<Arc<ReplicationManager>>,
    sagas_enabled: bool,
    credential_validation_enabled: bool,
}

impl SagaExecutor {
    pub fn new(
        store: Arc<dyn Store>,
        scheduler: Arc<SchedulerState>,
        products: Arc<ProductRegistry>,
        provisioner: Arc<dyn ResourceProvisioner>,
        sagas_enabled: bool,
        credential_validation_enabled: bool,
    ) -> Self {
        Self {
            store,
            scheduler,
            products,
            provisioner,
            replication: None,
            sagas_enabled,
            credential_validation_enabled,
        }
    }

    pub fn with_replication(mut self, replication: Arc<ReplicationManager>) -> Self {
        self.replication = Some(replication);
        self
    }

    /// Run the six-step lifecycle for a validated request. Sticky: if a
    /// resource already exists at the request's identity, no new saga
    /// starts and the existing placement is returned instead.
    pub async fn create(&self, request: CreateRequest) -> Result<CreateOutcome, AtlasError> {
        self.create_excluding(request, HashSet::new()).await
    }

    /// Entry point for replication failover: bypasses the sticky check
    /// (the old resource is being replaced on purpose) and excludes the
    /// providers the caller already knows are bad, without touching the
    /// shared operator-health table.
    pub async fn force_failover(
        &self,
        request: CreateRequest,
        exclude_providers: HashSet<String>,
    ) -> Result<CreateOutcome, AtlasError> {
        let product = self.product(&request)?;
        let identity = atlas_provisioner::ResourceIdentity::new(
            product.api_version.clone(),
            product.kind.clone(),
            request.namespace.clone(),
            request.name.clone(),
        );
        self.provisioner.delete(&identity).await;
        self.run(request, exclude_providers).await
    }

    /// Sticky-respecting creation scoped to a provider subset, used by
    /// [`crate::multicloud::MultiCloudDeployer`] to run one saga per
    /// target provider without touching the shared operator-health
    /// table.
    pub(crate) async fn create_excluding(
        &self,
        request: CreateRequest,
        exclude_providers: HashSet<String>,
    ) -> Result<CreateOutcome, AtlasError> {
        let product = self.product(&request)?;
        let identity = atlas_provisioner::ResourceIdentity::new(
            product.api_version.clone(),
            product.kind.clone(),
            request.namespace.clone(),
            request.name.clone(),
        );

        if self.provisioner.get(&identity).await.is_some() {
            if let Some(placement) = self
                .store
                .get_placement_by_name(&product.name, &request.namespace, &request.name)
                .await
            {
                return Ok(CreateOutcome::Sticky(placement));
            }
        }

        self.run(request, exclude_providers).await
    }

    fn product(&self, request: &CreateRequest) -> Result<atlas_products::ProductDefinition, AtlasError> {
        self.products
            .get(&request.product)
            .ok_or_else(|| AtlasError::not_found(format!("unknown product '{}'", request.product)))
    }

    async fn run(
        &self,
        request: CreateRequest,
        exclude_providers: HashSet<String>,
    ) -> Result<CreateOutcome, AtlasError> {
        let product = self.product(&request)?;

        let mut saga = SagaRecord {
            id: Uuid::new_v4(),
            product: product.name.clone(),
            namespace: request.namespace.clone(),
            resource_name: request.name.clone(),
            state: SagaState::Pending,
            current_step: None,
            steps_completed: Vec::new(),
            error: None,
            placement_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.store.create_saga(saga.clone()).await;
        saga.state = SagaState::Running;
        self.store.update_saga(saga.clone()).await;

        // validate
        self.check_deadline(&mut saga, "validate", &request).await?;
        self.enter_step(&mut saga, "validate").await;
        let violations = product.validate_params(&request.params);
        if !violations.is_empty() {
            return self.fail(&mut saga, "validate", violations.join("; "), None, None).await;
        }
        self.complete_step(&mut saga, "validate").await;

        // schedule
        self.check_deadline(&mut saga, "schedule", &request).await?;
        self.enter_step(&mut saga, "schedule").await;
        let schedule_request = ScheduleRequest {
            cell: request.cell.clone(),
            tier: request.tier.clone(),
            environment: request.environment.clone(),
            ha: request.ha,
            name: request.name.clone(),
        };
        let decision = match self
            .scheduler
            .schedule_excluding(&schedule_request, &exclude_providers)
        {
            Ok(decision) => decision,
            Err(err) => return self.fail(&mut saga, "schedule", err.to_string(), None, None).await,
        };
        if self.credential_validation_enabled
            && !self.store.has_credentials(&decision.provider).await
        {
            return self
                .fail(
                    &mut saga,
                    "schedule",
                    format!("provider '{}' has no stored credentials", decision.provider),
                    Some(&decision.provider),
                    None,
                )
                .await;
        }
        self.scheduler.breakers.record_success(&decision.provider);
        self.complete_step(&mut saga, "schedule").await;

        // apply_claim
        self.check_deadline(&mut saga, "apply_claim", &request).await?;
        self.enter_step(&mut saga, "apply_claim").await;
        let document = match build_claim(&product, &request, &decision) {
            Ok(document) => document,
            Err(err) => {
                return self
                    .fail(&mut saga, "apply_claim", err.to_string(), Some(&decision.provider), None)
                    .await
            }
        };
        let applied = match self.provisioner.apply(document.clone()).await {
            Ok(ApplyOutcome::Applied) => true,
            Ok(ApplyOutcome::Unavailable) => false,
            Err(err) => {
                return self
                    .fail(&mut saga, "apply_claim", err.to_string(), Some(&decision.provider), None)
                    .await
            }
        };
        self.complete_step(&mut saga, "apply_claim").await;

        // wait_ready: the capability surface is an opaque collaborator, so
        // this step can't poll a real readiness condition. It still
        // consults the one signal the provisioner exposes — whether the
        // connection secret landed — and logs rather than fails on a miss,
        // since a standalone-mode apply never produces one.
        self.check_deadline(&mut saga, "wait_ready", &request).await?;
        self.enter_step(&mut saga, "wait_ready").await;
        if applied
            && !self
                .provisioner
                .connection_secret_exists(&document.identity, &product.connection_secret_suffix)
                .await
        {
            tracing::warn!(
                saga_id = %saga.id,
                name = %request.name,
                "provisioner reports applied but connection secret is not yet visible"
            );
        }
        self.complete_step(&mut saga, "wait_ready").await;

        // register
        self.check_deadline(&mut saga, "register", &request).await?;
        self.enter_step(&mut saga, "register").await;
        let placement_id = Uuid::new_v4();
        let placement = PlacementRecord {
            id: placement_id,
            product: product.name.clone(),
            namespace: request.namespace.clone(),
            name: request.name.clone(),
            provider: decision.provider.clone(),
            region: decision.region.clone(),
            runtime_cluster: decision.runtime_cluster.clone(),
            status: if applied {
                PlacementStatus::Ready
            } else {
                PlacementStatus::Provisioning
            },
            decision: serde_json::to_value(&decision).unwrap_or(serde_json::Value::Null),
            api_version: product.api_version.clone(),
            kind: product.kind.clone(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.store.record_placement(placement).await;
        saga.placement_id = Some(placement_id);

        if let (Some(replication), Some(failover)) =
            (self.replication.as_ref(), decision.reason.failover.as_ref())
        {
            if needs_replication(&request.tier) {
                let primary = atlas_store::ReplicationSide {
                    provider: decision.provider.clone(),
                    region: decision.region.clone(),
                    runtime_cluster: decision.runtime_cluster.clone(),
                    placement_id: Some(placement_id),
                };
                let secondary = atlas_store::ReplicationSide {
                    provider: failover.provider.clone(),
                    region: failover.region.clone(),
                    runtime_cluster: failover.runtime_cluster.clone(),
                    placement_id: None,
                };
                if let Err(err) = replication
                    .create_pair(
                        &request.cell,
                        &request.namespace,
                        &request.name,
                        &product.name,
                        &request.tier,
                        primary,
                        secondary,
                        decision.reason.rpo_minutes,
                        decision.reason.rto_minutes,
                        serde_json::json!({}),
                    )
                    .await
                {
                    tracing::warn!(saga_id = %saga.id, error = %err, "failed to open replication pair");
                }
            }
        }

        self.complete_step(&mut saga, "register").await;

        // notify
        self.check_deadline(&mut saga, "notify", &request).await?;
        self.enter_step(&mut saga, "notify").await;
        tracing::info!(
            saga_id = %saga.id,
            placement_id = %placement_id,
            provider = %decision.provider,
            applied,
            "placement created"
        );
        self.store
            .append_audit(
                "create_placement",
                "success",
                serde_json::json!({
                    "saga_id": saga.id,
                    "placement_id": placement_id,
                    "provider": decision.provider,
                }),
            )
            .await;
        saga.steps_completed.push("notify".to_string());
        saga.state = SagaState::Completed;
        saga.current_step = None;
        saga.updated_at = Utc::now();
        self.store.update_saga(saga.clone()).await;

        Ok(CreateOutcome::Created(Placed {
            saga_id: saga.id,
            placement_id,
            decision,
            claim: document,
            applied,
        }))
    }

    async fn enter_step(&self, saga: &mut SagaRecord, step: &str) {
        saga.current_step = Some(step.to_string());
        saga.updated_at = Utc::now();
        self.store.update_saga(saga.clone()).await;
    }

    async fn complete_step(&self, saga: &mut SagaRecord, step: &str) {
        saga.steps_completed.push(step.to_string());
        saga.updated_at = Utc::now();
        self.store.update_saga(saga.clone()).await;
    }

    /// Check the request's deadline before starting `step`. Past the
    /// deadline the saga is marked FAILED, compensation runs, and a
    /// `Timeout` error is returned instead of letting the step start.
    async fn check_deadline(
        &self,
        saga: &mut SagaRecord,
        step: &str,
        request: &CreateRequest,
    ) -> Result<(), AtlasError> {
        if Utc::now() < request.deadline {
            return Ok(());
        }

        saga.state = SagaState::Failed;
        saga.error = Some(format!("deadline exceeded at step '{step}'"));
        saga.updated_at = Utc::now();
        self.store.update_saga(saga.clone()).await;

        self.store
            .append_audit(
                "create_placement",
                "failure",
                serde_json::json!({"saga_id": saga.id, "step": step, "reason": "deadline_exceeded"}),
            )
            .await;

        if self.sagas_enabled {
            self.compensate(saga, saga.placement_id).await;
        }

        Err(AtlasError::timeout(step))
    }

    /// Mark the saga FAILED, run compensation if enabled, and return the
    /// `SagaFailed` error the caller propagates.
    async fn fail(
        &self,
        saga: &mut SagaRecord,
        step: &str,
        reason: String,
        failing_provider: Option<&str>,
        placement_id: Option<Uuid>,
    ) -> Result<CreateOutcome, AtlasError> {
        if let Some(provider) = failing_provider {
            self.scheduler.breakers.record_failure(provider);
        }
        saga.state = SagaState::Failed;
        saga.error = Some(reason.clone());
        saga.updated_at = Utc::now();
        self.store.update_saga(saga.clone()).await;

        self.store
            .append_audit(
                "create_placement",
                "failure",
                serde_json::json!({"saga_id": saga.id, "step": step, "reason": reason}),
            )
            .await;

        if self.sagas_enabled {
            self.compensate(saga, placement_id.or(saga.placement_id)).await;
        }

        Err(AtlasError::saga_failed(step, reason))
    }

    /// Reverse `steps_completed` in order, running each step's
    /// compensator. `apply_claim` deletes the resource it created;
    /// `register` marks the placement FAILED; every other step is a
    /// no-op compensation.
    async fn compensate(&self, saga: &mut SagaRecord, placement_id: Option<Uuid>) {
        saga.state = SagaState::Compensating;
        self.store.update_saga(saga.clone()).await;

        for step in saga.steps_completed.clone().iter().rev() {
            match step.as_str() {
                "apply_claim" => {
                    let identity = atlas_provisioner::ResourceIdentity::new(
                        self.products
                            .get(&saga.product)
                            .map(|p| p.api_version)
                            .unwrap_or_default(),
                        self.products.get(&saga.product).map(|p| p.kind).unwrap_or_default(),
                        saga.namespace.clone(),
                        saga.resource_name.clone(),
                    );
                    self.provisioner.delete(&identity).await;
                }
                "register" => {
                    if let Some(id) = placement_id {
                        self.store.update_placement_status(id, PlacementStatus::Failed).await;
                    }
                }
                _ => {}
            }
        }

        saga.state = SagaState::RolledBack;
        saga.updated_at = Utc::now();
        self.store.update_saga(saga.clone()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_policy::PolicyModel;
    use atlas_provisioner::FakeProvisioner;
    use atlas_store::InMemoryStore;
    use serde_json::json;

    fn executor(sagas_enabled: bool) -> SagaExecutor {
        SagaExecutor::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(SchedulerState::new(Arc::new(PolicyModel::with_defaults()), 5, 60)),
            Arc::new(ProductRegistry::with_defaults()),
            Arc::new(FakeProvisioner::new()),
            sagas_enabled,
            false,
        )
    }

    fn request(name: &str) -> CreateRequest {
        let body = json!({
            "name": name, "namespace": "orders", "cell": "cell-us",
            "tier": "medium", "environment": "production", "ha": false,
            "size": "medium", "storage_gb": 50
        });
        CreateRequest::from_body("mysql", &body).unwrap()
    }

    #[tokio::test]
    async fn a_well_formed_request_completes_all_six_steps() {
        let executor = executor(true);
        let outcome = executor.create(request("orders-db")).await.unwrap();
        let placed = match outcome {
            CreateOutcome::Created(p) => p,
            CreateOutcome::Sticky(_) => panic!("expected a fresh placement"),
        };
        assert!(placed.applied);
        let saga = executor.store.get_saga(placed.saga_id).await.unwrap();
        assert_eq!(saga.state, SagaState::Completed);
        let expected: Vec<String> = SAGA_STEPS.iter().map(|s| s.to_string()).collect();
        assert_eq!(saga.steps_completed, expected);
    }

    #[tokio::test]
    async fn a_second_create_for_the_same_identity_is_sticky() {
        let executor = executor(true);
        executor.create(request("orders-db")).await.unwrap();
        let second = executor.create(request("orders-db")).await.unwrap();
        assert!(matches!(second, CreateOutcome::Sticky(_)));
    }

    #[tokio::test]
    async fn unknown_tier_fails_at_the_schedule_step_and_compensates() {
        let executor = executor(true);
        let body = json!({
            "name": "orders-db", "namespace": "orders", "cell": "cell-us",
            "tier": "nonexistent", "environment": "production",
            "size": "medium", "storage_gb": 50
        });
        let request = CreateRequest::from_body("mysql", &body).unwrap();
        let err = executor.create(request).await.unwrap_err();
        assert!(matches!(err, AtlasError::SagaFailed { ref step, .. } if step == "schedule"));
    }

    #[tokio::test]
    async fn apply_claim_failure_rolls_back_when_sagas_are_enabled() {
        let executor = executor(true);
        let provisioner = FakeProvisioner::new();
        provisioner.set_rejecting(true);
        let executor = SagaExecutor::new(
            executor.store.clone(),
            executor.scheduler.clone(),
            executor.products.clone(),
            Arc::new(provisioner),
            true,
            false,
        );
        let err = executor.create(request("orders-db")).await.unwrap_err();
        assert!(matches!(err, AtlasError::SagaFailed { ref step, .. } if step == "apply_claim"));
        let saga = executor
            .store
            .get_saga_by_resource("orders", "orders-db")
            .await
            .unwrap();
        assert_eq!(saga.state, SagaState::RolledBack);
    }

    #[tokio::test]
    async fn apply_unavailable_completes_in_standalone_mode() {
        let executor = executor(true);
        let provisioner = FakeProvisioner::new();
        provisioner.set_unavailable(true);
        let executor = SagaExecutor::new(
            executor.store.clone(),
            executor.scheduler.clone(),
            executor.products.clone(),
            Arc::new(provisioner),
            true,
            false,
        );
        let outcome = executor.create(request("orders-db")).await.unwrap();
        match outcome {
            CreateOutcome::Created(placed) => assert!(!placed.applied),
            CreateOutcome::Sticky(_) => panic!("expected a fresh placement"),
        }
    }

    #[tokio::test]
    async fn a_cross_cloud_tier_opens_a_replication_pair() {
        let base = executor(true);
        let executor = SagaExecutor::new(
            base.store.clone(),
            base.scheduler.clone(),
            base.products.clone(),
            Arc::new(FakeProvisioner::new()),
            true,
            false,
        )
        .with_replication(Arc::new(atlas_replication::ReplicationManager::new(base.store.clone())));

        let body = json!({
            "name": "orders-db", "namespace": "orders", "cell": "cell-us",
            "tier": "low", "environment": "production", "ha": true,
            "size": "medium", "storage_gb": 50
        });
        let request = CreateRequest::from_body("mysql", &body).unwrap();
        let outcome = executor.create(request).await.unwrap();
        let placed = match outcome {
            CreateOutcome::Created(p) => p,
            CreateOutcome::Sticky(_) => panic!("expected a fresh placement"),
        };
        assert!(placed.decision.reason.failover.is_some());

        let pair = executor
            .store
            .get_replication_pair_by_name("orders", "orders-db")
            .await
            .expect("expected a replication pair to be opened");
        assert_ne!(pair.primary.provider, pair.secondary.provider);
    }

    #[tokio::test]
    async fn a_request_past_its_deadline_fails_with_timeout_and_compensates() {
        let executor = executor(true);
        let mut request = request("orders-db");
        request.deadline = Utc::now() - chrono::Duration::seconds(1);
        let err = executor.create(request).await.unwrap_err();
        assert!(matches!(err, AtlasError::Timeout { ref step } if step == "validate"));
        let saga = executor
            .store
            .get_saga_by_resource("orders", "orders-db")
            .await
            .unwrap();
        assert_eq!(saga.state, SagaState::RolledBack);
    }
}
