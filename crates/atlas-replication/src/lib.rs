pub mod dr_strategy;
pub mod failover;
pub mod pair;
pub mod traffic;

pub use dr_strategy::{dr_policy, needs_replication, DrPolicy, DrStrategy, SecondaryCompute};
pub use failover::FailoverOrchestrator;
pub use pair::ReplicationManager;
pub use traffic::{FakeTrafficController, TrafficController, TrafficError};
