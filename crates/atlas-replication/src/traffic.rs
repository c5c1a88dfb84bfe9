//! The traffic collaborator the failover state machine's `FREEZE_WRITES`
//! and `UPDATE_DNS` phases delegate to — an abstract side effect,
//! mirroring the way `ResourceProvisioner` abstracts the capability
//! surface for `apply_claim`.

use async_trait::async_trait;
use std::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum TrafficError {
    #[error("traffic collaborator unreachable: {0}")]
    Unreachable(String),
}

#[async_trait]
pub trait TrafficController: Send + Sync {
    async fn fence_writes(&self, namespace: &str, name: &str) -> Result<(), TrafficError>;

    async fn repoint_dns(
        &self,
        namespace: &str,
        name: &str,
        target_provider: &str,
        target_region: &str,
    ) -> Result<(), TrafficError>;
}

/// In-memory stand-in. `set_failing` exercises the `VERIFY_LAG`-adjacent
/// failure paths in `FREEZE_WRITES`/`UPDATE_DNS` without a real network
/// collaborator.
#[derive(Default)]
pub struct FakeTrafficController {
    failing: RwLock<bool>,
    fenced: RwLock<Vec<(String, String)>>,
    repointed: RwLock<Vec<(String, String, String, String)>>,
}

impl FakeTrafficController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.write().expect("lock poisoned") = failing;
    }

    pub fn was_fenced(&self, namespace: &str, name: &str) -> bool {
        self.fenced
            .read()
            .expect("lock poisoned")
            .iter()
            .any(|(ns, n)| ns == namespace && n == name)
    }

    pub fn repointed_to(&self, namespace: &str, name: &str) -> Option<(String, String)> {
        self.repointed
            .read()
            .expect("lock poisoned")
            .iter()
            .find(|(ns, n, _, _)| ns == namespace && n == name)
            .map(|(_, _, provider, region)| (provider.clone(), region.clone()))
    }
}

#[async_trait]
impl TrafficController for FakeTrafficController {
    async fn fence_writes(&self, namespace: &str, name: &str) -> Result<(), TrafficError> {
        if *self.failing.read().expect("lock poisoned") {
            return Err(TrafficError::Unreachable("fence_writes failed".to_string()));
        }
        self.fenced
            .write()
            .expect("lock poisoned")
            .push((namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn repoint_dns(
        &self,
        namespace: &str,
        name: &str,
        target_provider: &str,
        target_region: &str,
    ) -> Result<(), TrafficError> {
        if *self.failing.read().expect("lock poisoned") {
            return Err(TrafficError::Unreachable("repoint_dns failed".to_string()));
        }
        self.repointed.write().expect("lock poisoned").push((
            namespace.to_string(),
            name.to_string(),
            target_provider.to_string(),
            target_region.to_string(),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fence_writes_records_the_target() {
        let controller = FakeTrafficController::new();
        controller.fence_writes("orders", "orders-db").await.unwrap();
        assert!(controller.was_fenced("orders", "orders-db"));
    }

    #[tokio::test]
    async fn failing_flag_surfaces_an_error() {
        let controller = FakeTrafficController::new();
        controller.set_failing(true);
        assert!(controller.fence_writes("orders", "orders-db").await.is_err());
    }
}
