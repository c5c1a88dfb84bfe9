//! Error taxonomy shared across the control plane.
//!
//! Every fallible operation in the scheduler, saga executor and
//! replication orchestrator returns an [`AtlasError`]. Transport layers
//! (not part of this workspace) are expected to map each variant to a
//! response class; the mapping is recorded next to each variant below
//! rather than implemented against a specific web framework.

use thiserror::Error;

/// Control-plane error taxonomy.
///
/// Response class notes (for whichever transport wraps this crate):
/// - `Validation` -> 400
/// - `NotFound` -> 404
/// - `SchedulingFailure` -> 422
/// - `DependencyDown` -> 502, or advance-with-warning inside a saga step
/// - `SagaFailed` -> 422, carries the failing step name
/// - `Conflict` -> 409
/// - `Timeout` -> 504, carries the step that was running at expiry
#[derive(Debug, Error)]
pub enum AtlasError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("no candidate passed scheduling gates: {0}")]
    SchedulingFailure(String),

    #[error("dependency unreachable: {0}")]
    DependencyDown(String),

    #[error("saga failed at step '{step}': {reason}")]
    SagaFailed { step: String, reason: String },

    #[error("conflicting state transition: {0}")]
    Conflict(String),

    #[error("deadline exceeded at step '{step}'")]
    Timeout { step: String },
}

impl AtlasError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn scheduling_failure(msg: impl Into<String>) -> Self {
        Self::SchedulingFailure(msg.into())
    }

    pub fn dependency_down(msg: impl Into<String>) -> Self {
        Self::DependencyDown(msg.into())
    }

    pub fn saga_failed(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SagaFailed {
            step: step.into(),
            reason: reason.into(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn timeout(step: impl Into<String>) -> Self {
        Self::Timeout { step: step.into() }
    }

    /// Stable machine-readable tag, used in audit log entries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::SchedulingFailure(_) => "scheduling_failure",
            Self::DependencyDown(_) => "dependency_down",
            Self::SagaFailed { .. } => "saga_failed",
            Self::Conflict(_) => "conflict",
            Self::Timeout { .. } => "timeout",
        }
    }
}

impl From<anyhow::Error> for AtlasError {
    fn from(err: anyhow::Error) -> Self {
        AtlasError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_stable_per_variant() {
        assert_eq!(AtlasError::validation("x").kind(), "validation");
        assert_eq!(AtlasError::not_found("x").kind(), "not_found");
        assert_eq!(AtlasError::scheduling_failure("x").kind(), "scheduling_failure");
        assert_eq!(AtlasError::dependency_down("x").kind(), "dependency_down");
        assert_eq!(
            AtlasError::saga_failed("schedule", "no candidates").kind(),
            "saga_failed"
        );
        assert_eq!(AtlasError::conflict("x").kind(), "conflict");
        assert_eq!(AtlasError::timeout("schedule").kind(), "timeout");
    }

    #[test]
    fn saga_failed_message_carries_step_name() {
        let err = AtlasError::saga_failed("apply_claim", "provisioner unreachable");
        assert!(err.to_string().contains("apply_claim"));
    }
}
