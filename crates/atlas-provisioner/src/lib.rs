//! The capability surface the control plane defers to an external
//! collaborator: a declarative, Kubernetes-shaped resource document plus
//! server-side apply/get/delete semantics. This crate specifies only that
//! surface, never a real Kubernetes dynamic client, abstracting the
//! backing vendor behind a trait instead of a concrete SDK call.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The four-tuple that identifies a resource for idempotence purposes:
/// `(api_version, kind, namespace, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceIdentity {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

/// A declarative resource document, shaped like a Kubernetes claim:
/// `apiVersion`/`kind` from the product definition, labels/annotations
/// in metadata, and a product-specific spec body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDocument {
    pub identity: ResourceIdentity,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub spec: Value,
}

impl ResourceDocument {
    pub fn connection_secret_exists_hint(&self, suffix: &str) -> String {
        format!("{}{}", self.identity.name, suffix)
    }
}

/// The three-way classification `apply_claim` reasons about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The document was accepted by the external collaborator.
    Applied,
    /// The collaborator is unreachable; the saga proceeds in standalone
    /// mode with `applied=false` rather than failing the step.
    Unavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionerError {
    #[error("apply rejected: {0}")]
    Rejected(String),
}

/// The capability surface an external collaborator must provide.
///
/// Implementors may talk to a real cluster; this crate ships only
/// [`FakeProvisioner`], an in-memory stand-in for tests and for running
/// the saga/replication engine standalone.
#[async_trait]
pub trait ResourceProvisioner: Send + Sync {
    async fn get(&self, identity: &ResourceIdentity) -> Option<ResourceDocument>;

    async fn apply(&self, document: ResourceDocument) -> Result<ApplyOutcome, ProvisionerError>;

    async fn delete(&self, identity: &ResourceIdentity);

    async fn connection_secret_exists(&self, identity: &ResourceIdentity, suffix: &str) -> bool;
}

/// In-memory stand-in for tests and standalone operation. Every `apply`
/// succeeds with [`ApplyOutcome::Applied`]; use
/// [`FakeProvisioner::set_unavailable`] to exercise the standalone-mode
/// path, and [`FakeProvisioner::set_rejecting`] for the apply-error path.
#[derive(Default)]
pub struct FakeProvisioner {
    documents: RwLock<HashMap<ResourceIdentity, ResourceDocument>>,
    unavailable: RwLock<bool>,
    rejecting: RwLock<bool>,
}

impl FakeProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().expect("lock poisoned") = unavailable;
    }

    pub fn set_rejecting(&self, rejecting: bool) {
        *self.rejecting.write().expect("lock poisoned") = rejecting;
    }
}

#[async_trait]
impl ResourceProvisioner for FakeProvisioner {
    async fn get(&self, identity: &ResourceIdentity) -> Option<ResourceDocument> {
        self.documents
            .read()
            .expect("lock poisoned")
            .get(identity)
            .cloned()
    }

    async fn apply(&self, document: ResourceDocument) -> Result<ApplyOutcome, ProvisionerError> {
        if *self.unavailable.read().expect("lock poisoned") {
            return Ok(ApplyOutcome::Unavailable);
        }
        if *self.rejecting.read().expect("lock poisoned") {
            return Err(ProvisionerError::Rejected("fake provisioner rejected apply".to_string()));
        }
        let identity = document.identity.clone();
        self.documents
            .write()
            .expect("lock poisoned")
            .insert(identity, document);
        Ok(ApplyOutcome::Applied)
    }

    async fn delete(&self, identity: &ResourceIdentity) {
        self.documents.write().expect("lock poisoned").remove(identity);
    }

    async fn connection_secret_exists(&self, identity: &ResourceIdentity, _suffix: &str) -> bool {
        self.documents.read().expect("lock poisoned").contains_key(identity)
    }
}
