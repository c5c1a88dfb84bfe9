//! Multi-cloud fan-out: one saga per target provider. A provider with
//! no matching candidate in the pool is reported as skipped rather than
//! failing the whole fan-out — a developer asking for `aws` and `oci`
//! should still get the `aws` instance if `oci` has no eligible
//! candidate for the requested tier.

use std::sync::Arc;

use atlas_core::AtlasError;

use crate::request::CreateRequest;
use crate::saga::{CreateOutcome, SagaExecutor};

/// The per-provider outcome of a fan-out.
#[derive(Debug, Clone)]
pub enum ProviderOutcome {
    Created(crate::saga::Placed),
    Sticky,
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct ProviderResult {
    pub provider: String,
    pub outcome: ProviderOutcome,
}

pub struct MultiCloudDeployer {
    executor: Arc<SagaExecutor>,
}

impl MultiCloudDeployer {
    pub fn new(executor: Arc<SagaExecutor>) -> Self {
        Self { executor }
    }

    /// Run one saga per entry in `providers`, each scoped to its target
    /// provider by excluding every other provider from that saga's
    /// scheduling call. Each provider's resource is suffixed with its
    /// own name (`<name>-<provider>`) so the fan-out never collides on
    /// a single identity.
    pub async fn deploy(&self, request: CreateRequest, providers: &[String]) -> Vec<ProviderResult> {
        let mut results = Vec::with_capacity(providers.len());
        for provider in providers {
            let scoped_request = request.with_name_suffix(provider);
            let exclude: std::collections::HashSet<String> = providers
                .iter()
                .filter(|candidate| *candidate != provider)
                .cloned()
                .collect();

            let outcome = match self.executor.create_excluding(scoped_request, exclude).await {
                Ok(CreateOutcome::Created(placed)) => ProviderOutcome::Created(placed),
                Ok(CreateOutcome::Sticky(_)) => ProviderOutcome::Sticky,
                Err(AtlasError::SagaFailed { step, reason }) if step == "schedule" => {
                    ProviderOutcome::Skipped { reason }
                }
                Err(err) => ProviderOutcome::Failed { reason: err.to_string() },
            };

            results.push(ProviderResult {
                provider: provider.clone(),
                outcome,
            });
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_policy::PolicyModel;
    use atlas_products::ProductRegistry;
    use atlas_provisioner::FakeProvisioner;
    use atlas_scheduler::SchedulerState;
    use atlas_store::InMemoryStore;
    use serde_json::json;

    fn deployer() -> MultiCloudDeployer {
        let executor = SagaExecutor::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(SchedulerState::new(Arc::new(PolicyModel::with_defaults()), 5, 60)),
            Arc::new(ProductRegistry::with_defaults()),
            Arc::new(FakeProvisioner::new()),
            true,
            false,
        );
        MultiCloudDeployer::new(Arc::new(executor))
    }

    fn request() -> CreateRequest {
        let body = json!({
            "name": "orders-db", "namespace": "orders", "cell": "cell-us",
            "tier": "medium", "environment": "production", "ha": false,
            "size": "medium", "storage_gb": 50
        });
        CreateRequest::from_body("mysql", &body).unwrap()
    }

    #[tokio::test]
    async fn fans_out_one_saga_per_requested_provider() {
        let deployer = deployer();
        let providers = vec!["aws".to_string(), "gcp".to_string()];
        let results = deployer.deploy(request(), &providers).await;
        assert_eq!(results.len(), 2);
        for result in &results {
            assert!(matches!(result.outcome, ProviderOutcome::Created(_)));
        }
    }

    #[tokio::test]
    async fn a_provider_with_no_eligible_candidate_is_skipped_not_failed() {
        let deployer = deployer();
        let providers = vec!["aws".to_string(), "does-not-exist".to_string()];
        let results = deployer.deploy(request(), &providers).await;
        let missing = results
            .iter()
            .find(|r| r.provider == "does-not-exist")
            .unwrap();
        assert!(matches!(missing.outcome, ProviderOutcome::Skipped { .. }));
    }
}
