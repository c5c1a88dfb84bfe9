//! Request/response shapes for the scheduler.

use atlas_policy::{Capability, DimensionMap};
use serde::{Deserialize, Serialize};

use crate::experiments::ExperimentAssignment;

/// The inbound scheduling request. Carries exactly the fields the
/// pipeline needs; product-specific parameters live one layer up, in the
/// saga's request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub cell: String,
    pub tier: String,
    pub environment: String,
    pub ha: bool,
    /// Stable resource name, used as the experiment-bucketing key.
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("unknown tier '{0}'")]
    UnknownTier(String),
    #[error("no healthy candidates for tier '{0}'")]
    NoHealthyCandidates(String),
    #[error("no candidate passed the gates for tier '{0}'")]
    NoGatePassers(String),
    #[error("candidate pool is empty")]
    EmptyPool,
}

/// A candidate's per-dimension contribution and total score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateScore {
    pub provider: String,
    pub region: String,
    pub runtime_cluster: String,
    pub network: String,
    pub subscores: DimensionMap,
    pub total_score: f64,
}

/// An excluded candidate plus the reason it was dropped, carried in the
/// Decision's reason record for auditability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcludedCandidate {
    pub provider: String,
    pub region: String,
    pub runtime_cluster: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverDecision {
    pub provider: String,
    pub region: String,
    pub runtime_cluster: String,
    pub network: String,
    pub score: CandidateScore,
    pub note: String,
}

/// The auditable reason record carried alongside a Decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reason {
    pub tier: String,
    pub rto_minutes: u32,
    pub rpo_minutes: u32,
    pub effective_gates: Vec<Capability>,
    pub effective_weights: DimensionMap,
    pub selected: CandidateScore,
    pub top_three: Vec<CandidateScore>,
    pub candidates_evaluated: usize,
    pub candidates_healthy: usize,
    pub candidates_passed_gate: usize,
    pub unhealthy_skipped: Vec<ExcludedCandidate>,
    pub experiment: Option<ExperimentAssignment>,
    pub failover: Option<FailoverDecision>,
}

/// The scheduler's immutable output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub provider: String,
    pub region: String,
    pub runtime_cluster: String,
    pub network: String,
    pub reason: Reason,
}
