pub mod claim;
pub mod multicloud;
pub mod request;
pub mod saga;

pub use claim::build_claim;
pub use multicloud::{MultiCloudDeployer, ProviderOutcome, ProviderResult};
pub use request::CreateRequest;
pub use saga::{CreateOutcome, Placed, SagaExecutor, SAGA_STEPS};
