//! The state store contract: the row/operation set the core consumes,
//! expressed as an async trait so a real persistence crate can implement
//! it against Postgres. [`InMemoryStore`] is the in-process fixture the
//! rest of this workspace's test suite runs against — it is not a
//! substitute for that relational layer.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStatus {
    Provisioning,
    Ready,
    Failed,
}

/// A persisted placement: the decision's fields (kept as an opaque JSON
/// blob, since this crate has no dependency on the scheduler's `Decision`
/// type) plus the status and resource identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementRecord {
    pub id: Uuid,
    pub product: String,
    pub namespace: String,
    pub name: String,
    pub provider: String,
    pub region: String,
    pub runtime_cluster: String,
    pub status: PlacementStatus,
    pub decision: Value,
    pub api_version: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaState {
    Pending,
    Running,
    Completed,
    Failed,
    Compensating,
    RolledBack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaRecord {
    pub id: Uuid,
    pub product: String,
    pub namespace: String,
    pub resource_name: String,
    pub state: SagaState,
    pub current_step: Option<String>,
    pub steps_completed: Vec<String>,
    pub error: Option<String>,
    pub placement_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub id: String,
    pub description: String,
    pub variant_weights: HashMap<String, f64>,
    pub traffic_fraction: f64,
    pub tier_selector: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub provider: String,
    pub blob: Vec<u8>,
    pub validated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationState {
    Pending,
    ProvisioningSecondary,
    Configuring,
    Replicating,
    LagWarning,
    FailoverInProgress,
    FailedOver,
    Suspended,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverPhase {
    Idle,
    FreezeWrites,
    VerifyLag,
    PromoteSecondary,
    UpdateDns,
    ScaleCompute,
    Completed,
    Aborted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationSide {
    pub provider: String,
    pub region: String,
    pub runtime_cluster: String,
    pub placement_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationPairRecord {
    pub id: Uuid,
    pub cell: String,
    pub namespace: String,
    pub name: String,
    pub product: String,
    pub tier: String,
    pub primary: ReplicationSide,
    pub secondary: ReplicationSide,
    pub replication_config: Value,
    pub state: ReplicationState,
    pub lag_ms: i64,
    pub rpo_target_minutes: u32,
    pub rto_target_minutes: u32,
    pub failover_phase: FailoverPhase,
    pub dr_strategy: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub outcome: String,
    pub detail: Value,
}

/// The row/operation set the core requires of a durable store. Every
/// write a single request performs must be observable atomically;
/// concurrent readers may see pre- or post-state but never a torn row.
#[async_trait]
pub trait Store: Send + Sync {
    async fn config_get(&self, key: &str) -> Option<String>;
    async fn config_set(&self, key: &str, value: &str);

    async fn put_provider_config(&self, provider: &str, config: Value);
    async fn get_provider_config(&self, provider: &str) -> Option<Value>;

    async fn record_placement(&self, record: PlacementRecord);
    async fn update_placement_status(&self, id: Uuid, status: PlacementStatus);
    async fn get_placement(&self, id: Uuid) -> Option<PlacementRecord>;
    async fn get_placement_by_name(
        &self,
        product: &str,
        namespace: &str,
        name: &str,
    ) -> Option<PlacementRecord>;
    async fn list_placements_by_product(&self, product: &str) -> Vec<PlacementRecord>;
    async fn list_placements_by_status(&self, status: PlacementStatus) -> Vec<PlacementRecord>;

    async fn create_saga(&self, saga: SagaRecord);
    async fn update_saga(&self, saga: SagaRecord);
    async fn get_saga(&self, id: Uuid) -> Option<SagaRecord>;
    async fn get_saga_by_resource(&self, namespace: &str, name: &str) -> Option<SagaRecord>;
    async fn list_sagas_by_state(&self, state: SagaState) -> Vec<SagaRecord>;

    async fn save_experiment(&self, experiment: ExperimentRecord);
    async fn get_experiment(&self, id: &str) -> Option<ExperimentRecord>;
    async fn list_experiments(&self) -> Vec<ExperimentRecord>;
    async fn delete_experiment(&self, id: &str);

    async fn set_provider_health(&self, provider: &str, healthy: bool);
    async fn get_provider_health(&self, provider: &str) -> Option<bool>;

    async fn save_provider_credentials(&self, provider: &str, blob: Vec<u8>);
    async fn mark_credentials_validated(&self, provider: &str);
    async fn has_credentials(&self, provider: &str) -> bool;
    async fn delete_provider_credentials(&self, provider: &str);

    async fn create_replication_pair(&self, pair: ReplicationPairRecord);
    async fn get_replication_pair(&self, id: Uuid) -> Option<ReplicationPairRecord>;
    async fn get_replication_pair_by_name(
        &self,
        namespace: &str,
        name: &str,
    ) -> Option<ReplicationPairRecord>;
    async fn list_replication_pairs_by_cell(&self, cell: &str) -> Vec<ReplicationPairRecord>;
    async fn list_replication_pairs_by_state(
        &self,
        state: ReplicationState,
    ) -> Vec<ReplicationPairRecord>;
    async fn update_replication_pair(&self, pair: ReplicationPairRecord);

    async fn append_audit(&self, action: &str, outcome: &str, detail: Value);
    async fn list_audit(&self, limit: usize) -> Vec<AuditLogEntry>;
}

/// In-memory `Store`, one `RwLock`-guarded table per entity group so an
/// audit append never blocks a concurrent placement read.
#[derive(Default)]
pub struct InMemoryStore {
    config: RwLock<HashMap<String, String>>,
    provider_configs: RwLock<HashMap<String, Value>>,
    placements: RwLock<HashMap<Uuid, PlacementRecord>>,
    sagas: RwLock<HashMap<Uuid, SagaRecord>>,
    experiments: RwLock<HashMap<String, ExperimentRecord>>,
    provider_health: RwLock<HashMap<String, bool>>,
    provider_credentials: RwLock<HashMap<String, ProviderCredentials>>,
    replication_pairs: RwLock<HashMap<Uuid, ReplicationPairRecord>>,
    audit_log: RwLock<Vec<AuditLogEntry>>,
    audit_seq: RwLock<u64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn config_get(&self, key: &str) -> Option<String> {
        self.config.read().await.get(key).cloned()
    }

    async fn config_set(&self, key: &str, value: &str) {
        self.config.write().await.insert(key.to_string(), value.to_string());
    }

    async fn put_provider_config(&self, provider: &str, config: Value) {
        self.provider_configs
            .write()
            .await
            .insert(provider.to_string(), config);
    }

    async fn get_provider_config(&self, provider: &str) -> Option<Value> {
        self.provider_configs.read().await.get(provider).cloned()
    }

    async fn record_placement(&self, record: PlacementRecord) {
        self.placements.write().await.insert(record.id, record);
    }

    async fn update_placement_status(&self, id: Uuid, status: PlacementStatus) {
        if let Some(record) = self.placements.write().await.get_mut(&id) {
            record.status = status;
            record.updated_at = Utc::now();
        }
    }

    async fn get_placement(&self, id: Uuid) -> Option<PlacementRecord> {
        self.placements.read().await.get(&id).cloned()
    }

    async fn get_placement_by_name(
        &self,
        product: &str,
        namespace: &str,
        name: &str,
    ) -> Option<PlacementRecord> {
        self.placements
            .read()
            .await
            .values()
            .find(|r| r.product == product && r.namespace == namespace && r.name == name)
            .cloned()
    }

    async fn list_placements_by_product(&self, product: &str) -> Vec<PlacementRecord> {
        self.placements
            .read()
            .await
            .values()
            .filter(|r| r.product == product)
            .cloned()
            .collect()
    }

    async fn list_placements_by_status(&self, status: PlacementStatus) -> Vec<PlacementRecord> {
        self.placements
            .read()
            .await
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect()
    }

    async fn create_saga(&self, saga: SagaRecord) {
        self.sagas.write().await.insert(saga.id, saga);
    }

    async fn update_saga(&self, saga: SagaRecord) {
        self.sagas.write().await.insert(saga.id, saga);
    }

    async fn get_saga(&self, id: Uuid) -> Option<SagaRecord> {
        self.sagas.read().await.get(&id).cloned()
    }

    async fn get_saga_by_resource(&self, namespace: &str, name: &str) -> Option<SagaRecord> {
        self.sagas
            .read()
            .await
            .values()
            .find(|s| s.namespace == namespace && s.resource_name == name)
            .cloned()
    }

    async fn list_sagas_by_state(&self, state: SagaState) -> Vec<SagaRecord> {
        self.sagas
            .read()
            .await
            .values()
            .filter(|s| s.state == state)
            .cloned()
            .collect()
    }

    async fn save_experiment(&self, experiment: ExperimentRecord) {
        self.experiments
            .write()
            .await
            .insert(experiment.id.clone(), experiment);
    }

    async fn get_experiment(&self, id: &str) -> Option<ExperimentRecord> {
        self.experiments.read().await.get(id).cloned()
    }

    async fn list_experiments(&self) -> Vec<ExperimentRecord> {
        self.experiments.read().await.values().cloned().collect()
    }

    async fn delete_experiment(&self, id: &str) {
        self.experiments.write().await.remove(id);
    }

    async fn set_provider_health(&self, provider: &str, healthy: bool) {
        self.provider_health
            .write()
            .await
            .insert(provider.to_string(), healthy);
    }

    async fn get_provider_health(&self, provider: &str) -> Option<bool> {
        self.provider_health.read().await.get(provider).copied()
    }

    async fn save_provider_credentials(&self, provider: &str, blob: Vec<u8>) {
        self.provider_credentials.write().await.insert(
            provider.to_string(),
            ProviderCredentials {
                provider: provider.to_string(),
                blob,
                validated: false,
            },
        );
    }

    async fn mark_credentials_validated(&self, provider: &str) {
        if let Some(creds) = self.provider_credentials.write().await.get_mut(provider) {
            creds.validated = true;
        }
    }

    async fn has_credentials(&self, provider: &str) -> bool {
        self.provider_credentials.read().await.contains_key(provider)
    }

    async fn delete_provider_credentials(&self, provider: &str) {
        self.provider_credentials.write().await.remove(provider);
    }

    async fn create_replication_pair(&self, pair: ReplicationPairRecord) {
        self.replication_pairs.write().await.insert(pair.id, pair);
    }

    async fn get_replication_pair(&self, id: Uuid) -> Option<ReplicationPairRecord> {
        self.replication_pairs.read().await.get(&id).cloned()
    }

    async fn get_replication_pair_by_name(
        &self,
        namespace: &str,
        name: &str,
    ) -> Option<ReplicationPairRecord> {
        self.replication_pairs
            .read()
            .await
            .values()
            .find(|p| p.namespace == namespace && p.name == name)
            .cloned()
    }

    async fn list_replication_pairs_by_cell(&self, cell: &str) -> Vec<ReplicationPairRecord> {
        self.replication_pairs
            .read()
            .await
            .values()
            .filter(|p| p.cell == cell)
            .cloned()
            .collect()
    }

    async fn list_replication_pairs_by_state(
        &self,
        state: ReplicationState,
    ) -> Vec<ReplicationPairRecord> {
        self.replication_pairs
            .read()
            .await
            .values()
            .filter(|p| p.state == state)
            .cloned()
            .collect()
    }

    async fn update_replication_pair(&self, pair: ReplicationPairRecord) {
        self.replication_pairs.write().await.insert(pair.id, pair);
    }

    async fn append_audit(&self, action: &str, outcome: &str, detail: Value) {
        let mut seq = self.audit_seq.write().await;
        *seq += 1;
        self.audit_log.write().await.push(AuditLogEntry {
            id: *seq,
            timestamp: Utc::now(),
            action: action.to_string(),
            outcome: outcome.to_string(),
            detail,
        });
    }

    async fn list_audit(&self, limit: usize) -> Vec<AuditLogEntry> {
        let log = self.audit_log.read().await;
        log.iter().rev().take(limit).cloned().collect()
    }
}
