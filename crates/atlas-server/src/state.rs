//! Central application state: wires the policy model, scheduler,
//! product registry, provisioner, store, saga executor, and replication
//! orchestrator into one value the bootstrap binary constructs once.

use std::sync::Arc;

use atlas_policy::PolicyModel;
use atlas_products::ProductRegistry;
use atlas_provisioner::{FakeProvisioner, ResourceProvisioner};
use atlas_replication::{FailoverOrchestrator, FakeTrafficController, ReplicationManager, TrafficController};
use atlas_saga::SagaExecutor;
use atlas_scheduler::SchedulerState;
use atlas_store::{InMemoryStore, Store};

use crate::config::AppConfig;
use crate::errors::AppError;

/// Central application state. Cheap to clone: every field is an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn Store>,
    pub scheduler: Arc<SchedulerState>,
    pub products: Arc<ProductRegistry>,
    pub provisioner: Arc<dyn ResourceProvisioner>,
    pub saga: Arc<SagaExecutor>,
    pub replication: Arc<ReplicationManager>,
    pub failover: Arc<FailoverOrchestrator>,
}

impl AppState {
    /// Build the control plane's runtime graph from configuration. This
    /// wires the in-memory `Store`/`FakeProvisioner`/`FakeTrafficController`
    /// fixtures this workspace ships; a deployment swaps those three for
    /// real collaborators without touching anything else here.
    pub async fn new(config: AppConfig) -> Result<Self, AppError> {
        let policy = if let Some(path) = &config.scheduler.policy_source_path {
            Arc::new(load_policy_from_file(path)?)
        } else {
            Arc::new(PolicyModel::with_defaults())
        };

        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let scheduler = Arc::new(SchedulerState::new(
            policy,
            config.scheduler.breaker_failure_threshold,
            config.scheduler.breaker_cooldown_seconds,
        ));
        scheduler
            .experiments
            .set_feature_flag("prefer_cost_optimization", config.scheduler.prefer_cost_optimization);

        let products = Arc::new(ProductRegistry::with_defaults());
        let provisioner: Arc<dyn ResourceProvisioner> = Arc::new(FakeProvisioner::new());
        let traffic: Arc<dyn TrafficController> = Arc::new(FakeTrafficController::new());

        let replication = Arc::new(ReplicationManager::new(store.clone()));
        let failover = Arc::new(FailoverOrchestrator::new(store.clone(), traffic));

        let saga = Arc::new(
            SagaExecutor::new(
                store.clone(),
                scheduler.clone(),
                products.clone(),
                provisioner.clone(),
                config.saga.sagas_enabled,
                config.saga.credential_validation_enabled,
            )
            .with_replication(replication.clone()),
        );

        Ok(Self {
            config,
            store,
            scheduler,
            products,
            provisioner,
            saga,
            replication,
            failover,
        })
    }
}

/// Load a policy override document from disk. The document shape is the
/// same tiers/candidates pair `PolicyModel` is built from by default.
fn load_policy_from_file(path: &str) -> Result<PolicyModel, AppError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AppError::dependency_down(format!("cannot read policy source '{path}': {e}")))?;
    let document: PolicyDocument = serde_json::from_str(&content)
        .map_err(|e| AppError::validation(format!("malformed policy source '{path}': {e}")))?;
    Ok(PolicyModel::new(document.tiers, document.candidates))
}

#[derive(serde::Deserialize)]
struct PolicyDocument {
    tiers: std::collections::HashMap<String, atlas_policy::Tier>,
    candidates: Vec<atlas_policy::Candidate>,
}
