pub mod errors;
pub mod logging;

pub use errors::AtlasError;
pub use logging::{CorrelationId, RequestId};