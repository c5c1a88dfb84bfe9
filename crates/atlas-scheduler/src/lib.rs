pub mod analytics;
pub mod circuit_breaker;
pub mod decision;
pub mod experiments;
pub mod scheduler;

pub use analytics::{AnalyticsSummary, PlacementAnalytics};
pub use circuit_breaker::{BreakerState, BreakerTable, CircuitBreaker};
pub use decision::{
    CandidateScore, Decision, ExcludedCandidate, FailoverDecision, Reason, ScheduleError,
    ScheduleRequest,
};
pub use experiments::{assign_group, digest_bucket, Experiment, ExperimentAssignment, ExperimentError, ExperimentRegistry, Group};
pub use scheduler::SchedulerState;
