//! The five-phase failover state machine. Phases run serially; any
//! failure aborts the whole sequence and leaves the pair untouched
//! identity-wise.

use std::sync::Arc;

use atlas_core::AtlasError;
use atlas_store::{FailoverPhase, ReplicationPairRecord, ReplicationState, Store};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::dr_strategy::{dr_policy, DrStrategy, SecondaryCompute};
use crate::traffic::TrafficController;

pub struct FailoverOrchestrator {
    store: Arc<dyn Store>,
    traffic: Arc<dyn TrafficController>,
}

impl FailoverOrchestrator {
    pub fn new(store: Arc<dyn Store>, traffic: Arc<dyn TrafficController>) -> Self {
        Self { store, traffic }
    }

    /// Run the phased failover for `pair_id` with no external cancellation
    /// source; equivalent to `execute_failover_cancellable` with a token
    /// that is never cancelled.
    pub async fn execute_failover(&self, pair_id: Uuid) -> Result<ReplicationPairRecord, AtlasError> {
        self.execute_failover_cancellable(pair_id, CancellationToken::new()).await
    }

    /// Run the phased failover for `pair_id`. Refuses a pair already
    /// mid-failover. On success the primary/secondary sides are swapped
    /// atomically in the stored record; on failure the pair's identities
    /// are untouched and `failover_phase` is ABORTED.
    ///
    /// A phase already in flight always runs to completion; `cancellation`
    /// is only honored at the boundary between two phases, so cancelling
    /// never leaves a phase half-applied.
    pub async fn execute_failover_cancellable(
        &self,
        pair_id: Uuid,
        cancellation: CancellationToken,
    ) -> Result<ReplicationPairRecord, AtlasError> {
        let mut pair = self
            .store
            .get_replication_pair(pair_id)
            .await
            .ok_or_else(|| AtlasError::not_found(format!("replication pair '{pair_id}'")))?;

        if pair.state == ReplicationState::FailoverInProgress {
            return Err(AtlasError::conflict(format!(
                "replication pair '{pair_id}' already has a failover in progress"
            )));
        }

        pair.state = ReplicationState::FailoverInProgress;
        pair.updated_at = Utc::now();
        self.store.update_replication_pair(pair.clone()).await;

        if let Err(reason) = self.run_phases(&mut pair, &cancellation).await {
            pair.state = ReplicationState::Error;
            pair.failover_phase = FailoverPhase::Aborted;
            pair.updated_at = Utc::now();
            self.store.update_replication_pair(pair.clone()).await;
            return Err(AtlasError::saga_failed("failover", reason));
        }

        std::mem::swap(&mut pair.primary, &mut pair.secondary);
        pair.state = ReplicationState::FailedOver;
        pair.failover_phase = FailoverPhase::Completed;
        pair.updated_at = Utc::now();
        self.store.update_replication_pair(pair.clone()).await;
        Ok(pair)
    }

    async fn run_phases(&self, pair: &mut ReplicationPairRecord, cancellation: &CancellationToken) -> Result<(), String> {
        // 1. FREEZE_WRITES
        pair.failover_phase = FailoverPhase::FreezeWrites;
        self.store.update_replication_pair(pair.clone()).await;
        self.traffic
            .fence_writes(&pair.namespace, &pair.name)
            .await
            .map_err(|e| e.to_string())?;

        Self::check_cancelled(cancellation)?;

        // 2. VERIFY_LAG
        pair.failover_phase = FailoverPhase::VerifyLag;
        self.store.update_replication_pair(pair.clone()).await;
        let max_allowed_lag_ms = pair.rpo_target_minutes as f64 * 60_000.0;
        if pair.lag_ms as f64 > max_allowed_lag_ms {
            return Err(format!(
                "replication lag {}ms exceeds RPO target of {}ms",
                pair.lag_ms, max_allowed_lag_ms as i64
            ));
        }

        Self::check_cancelled(cancellation)?;

        // 3. PROMOTE_SECONDARY (side effect: no external collaborator in
        // this workspace, so promotion is just the phase transition).
        pair.failover_phase = FailoverPhase::PromoteSecondary;
        self.store.update_replication_pair(pair.clone()).await;

        Self::check_cancelled(cancellation)?;

        // 4. UPDATE_DNS
        pair.failover_phase = FailoverPhase::UpdateDns;
        self.store.update_replication_pair(pair.clone()).await;
        self.traffic
            .repoint_dns(&pair.namespace, &pair.name, &pair.secondary.provider, &pair.secondary.region)
            .await
            .map_err(|e| e.to_string())?;

        Self::check_cancelled(cancellation)?;

        // 5. SCALE_COMPUTE: only pilot_light strategies scale the
        // secondary up on failover; everything else is a no-op.
        pair.failover_phase = FailoverPhase::ScaleCompute;
        self.store.update_replication_pair(pair.clone()).await;
        if let Some(policy) = dr_policy(&pair.tier) {
            if policy.strategy == DrStrategy::PilotLight && policy.secondary_compute == SecondaryCompute::Minimal {
                tracing::info!(pair_id = %pair.id, "scaling pilot-light secondary up for failover");
            }
        }

        Ok(())
    }

    /// A phase boundary check: a cancellation requested while a phase was
    /// running is only observed once that phase has finished.
    fn check_cancelled(cancellation: &CancellationToken) -> Result<(), String> {
        if cancellation.is_cancelled() {
            return Err("failover cancelled between phases".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_store::{InMemoryStore, ReplicationSide};
    use crate::traffic::FakeTrafficController;
    use serde_json::json;

    fn side(provider: &str) -> ReplicationSide {
        ReplicationSide {
            provider: provider.to_string(),
            region: format!("{provider}-region"),
            runtime_cluster: format!("{provider}-cluster"),
            placement_id: None,
        }
    }

    async fn pair(store: &Arc<dyn Store>, lag_ms: i64, rpo_target_minutes: u32) -> ReplicationPairRecord {
        let pair = ReplicationPairRecord {
            id: Uuid::new_v4(),
            cell: "cell-us".to_string(),
            namespace: "orders".to_string(),
            name: "orders-db".to_string(),
            product: "mysql".to_string(),
            tier: "low".to_string(),
            primary: side("aws"),
            secondary: side("gcp"),
            replication_config: json!({}),
            state: ReplicationState::Replicating,
            lag_ms,
            rpo_target_minutes,
            rto_target_minutes: 240,
            failover_phase: FailoverPhase::Idle,
            dr_strategy: "warm_standby".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.create_replication_pair(pair.clone()).await;
        pair
    }

    #[tokio::test]
    async fn successful_failover_swaps_primary_and_secondary() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let traffic: Arc<dyn TrafficController> = Arc::new(FakeTrafficController::new());
        let orchestrator = FailoverOrchestrator::new(store.clone(), traffic);

        let original = pair(&store, 1_000, 30).await;
        let result = orchestrator.execute_failover(original.id).await.unwrap();

        assert_eq!(result.state, ReplicationState::FailedOver);
        assert_eq!(result.failover_phase, FailoverPhase::Completed);
        assert_eq!(result.primary.provider, "gcp");
        assert_eq!(result.secondary.provider, "aws");
    }

    #[tokio::test]
    async fn excessive_lag_aborts_at_verify_lag_without_swapping() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let traffic: Arc<dyn TrafficController> = Arc::new(FakeTrafficController::new());
        let orchestrator = FailoverOrchestrator::new(store.clone(), traffic);

        // threshold = 30 * 60_000 = 1_800_000 ms
        let original = pair(&store, 5_000_000, 30).await;
        let err = orchestrator.execute_failover(original.id).await.unwrap_err();
        assert!(matches!(err, AtlasError::SagaFailed { .. }));

        let stored = store.get_replication_pair(original.id).await.unwrap();
        assert_eq!(stored.state, ReplicationState::Error);
        assert_eq!(stored.failover_phase, FailoverPhase::Aborted);
        assert_eq!(stored.primary.provider, "aws");
    }

    #[tokio::test]
    async fn a_pair_already_mid_failover_refuses_a_second_attempt() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let traffic: Arc<dyn TrafficController> = Arc::new(FakeTrafficController::new());
        let orchestrator = FailoverOrchestrator::new(store.clone(), traffic);

        let mut original = pair(&store, 1_000, 30).await;
        original.state = ReplicationState::FailoverInProgress;
        store.update_replication_pair(original.clone()).await;

        let err = orchestrator.execute_failover(original.id).await.unwrap_err();
        assert!(matches!(err, AtlasError::Conflict(_)));
    }

    #[tokio::test]
    async fn a_cancellation_requested_upfront_still_lets_freeze_writes_finish_then_aborts() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let traffic: Arc<dyn TrafficController> = Arc::new(FakeTrafficController::new());
        let orchestrator = FailoverOrchestrator::new(store.clone(), traffic);

        let original = pair(&store, 1_000, 30).await;
        let token = CancellationToken::new();
        token.cancel();

        let err = orchestrator
            .execute_failover_cancellable(original.id, token)
            .await
            .unwrap_err();
        assert!(matches!(err, AtlasError::SagaFailed { .. }));

        let stored = store.get_replication_pair(original.id).await.unwrap();
        assert_eq!(stored.state, ReplicationState::Error);
        assert_eq!(stored.failover_phase, FailoverPhase::Aborted);
        assert_eq!(stored.primary.provider, "aws");
    }
}
