//! Replication pair lifecycle: creation gated on DR policy, and
//! idempotent lag updates.

use std::sync::Arc;

use atlas_core::AtlasError;
use atlas_store::{ReplicationPairRecord, ReplicationSide, ReplicationState, Store};
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::dr_strategy::{dr_policy, needs_replication};

/// The threshold multiplier used to decide LAG_WARNING vs REPLICATING:
/// `0.8 * rpo_target_minutes * 60_000 ms`.
const LAG_WARNING_FRACTION: f64 = 0.8;

pub struct ReplicationManager {
    store: Arc<dyn Store>,
}

impl ReplicationManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Open a pair for a tier whose DR policy requires replication.
    /// Rejects primary/secondary sharing a provider and tiers whose
    /// policy doesn't call for a pair.
    pub async fn create_pair(
        &self,
        cell: &str,
        namespace: &str,
        name: &str,
        product: &str,
        tier: &str,
        primary: ReplicationSide,
        secondary: ReplicationSide,
        rpo_target_minutes: u32,
        rto_target_minutes: u32,
        replication_config: Value,
    ) -> Result<ReplicationPairRecord, AtlasError> {
        if !needs_replication(tier) {
            return Err(AtlasError::validation(format!(
                "tier '{tier}' does not require a replication pair"
            )));
        }
        if primary.provider == secondary.provider {
            return Err(AtlasError::validation(
                "primary and secondary must be on different providers",
            ));
        }

        let policy = dr_policy(tier).expect("needs_replication implies a policy exists");
        let pair = ReplicationPairRecord {
            id: Uuid::new_v4(),
            cell: cell.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            product: product.to_string(),
            tier: tier.to_string(),
            primary,
            secondary,
            replication_config,
            state: ReplicationState::Pending,
            lag_ms: 0,
            rpo_target_minutes,
            rto_target_minutes,
            failover_phase: atlas_store::FailoverPhase::Idle,
            dr_strategy: policy.strategy.as_str().to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.store.create_replication_pair(pair.clone()).await;
        Ok(pair)
    }

    /// Apply a lag probe reading. Idempotent: re-reporting the same
    /// value is a no-op transition-wise. Transitions LAG_WARNING <->
    /// REPLICATING around `0.8 * rpo_target_minutes * 60_000` ms; never
    /// touches `state` if the pair is mid-failover or already terminal.
    pub async fn update_lag(&self, pair_id: Uuid, lag_ms: i64) -> Result<ReplicationPairRecord, AtlasError> {
        let mut pair = self
            .store
            .get_replication_pair(pair_id)
            .await
            .ok_or_else(|| AtlasError::not_found(format!("replication pair '{pair_id}'")))?;

        pair.lag_ms = lag_ms;
        pair.updated_at = Utc::now();

        let warning_threshold = LAG_WARNING_FRACTION * pair.rpo_target_minutes as f64 * 60_000.0;
        if matches!(pair.state, ReplicationState::Replicating | ReplicationState::LagWarning) {
            pair.state = if (lag_ms as f64) >= warning_threshold {
                ReplicationState::LagWarning
            } else {
                ReplicationState::Replicating
            };
        }

        self.store.update_replication_pair(pair.clone()).await;
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_store::InMemoryStore;
    use serde_json::json;

    fn side(provider: &str) -> ReplicationSide {
        ReplicationSide {
            provider: provider.to_string(),
            region: format!("{provider}-region"),
            runtime_cluster: format!("{provider}-cluster"),
            placement_id: None,
        }
    }

    #[tokio::test]
    async fn rejects_a_tier_whose_policy_does_not_require_replication() {
        let manager = ReplicationManager::new(Arc::new(InMemoryStore::new()));
        let err = manager
            .create_pair(
                "cell-us", "orders", "orders-db", "mysql", "medium",
                side("aws"), side("gcp"), 15, 120, json!({}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AtlasError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_same_provider_primary_and_secondary() {
        let manager = ReplicationManager::new(Arc::new(InMemoryStore::new()));
        let err = manager
            .create_pair(
                "cell-us", "orders", "orders-db", "mysql", "low",
                side("aws"), side("aws"), 30, 240, json!({}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AtlasError::Validation(_)));
    }

    #[tokio::test]
    async fn lag_crossing_threshold_flips_state_to_warning() {
        let store = Arc::new(InMemoryStore::new());
        let manager = ReplicationManager::new(store.clone());
        let mut pair = manager
            .create_pair(
                "cell-us", "orders", "orders-db", "mysql", "low",
                side("aws"), side("gcp"), 5, 30, json!({}),
            )
            .await
            .unwrap();
        pair.state = ReplicationState::Replicating;
        store.update_replication_pair(pair.clone()).await;

        // threshold = 0.8 * 5 * 60_000 = 240_000 ms
        let updated = manager.update_lag(pair.id, 300_000).await.unwrap();
        assert_eq!(updated.state, ReplicationState::LagWarning);

        let recovered = manager.update_lag(pair.id, 1_000).await.unwrap();
        assert_eq!(recovered.state, ReplicationState::Replicating);
    }
}
