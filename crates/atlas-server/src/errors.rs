//! Re-exports the shared error taxonomy. No `IntoResponse` impl here —
//! this process has no HTTP transport wired up; whichever layer adds
//! one maps [`atlas_core::AtlasError`]'s variants to response classes
//! using the notes on that type.

pub use atlas_core::AtlasError as AppError;
