//! # Middleware Modules
//!
//! Tower layers wrapped around the API router.

pub mod envelope;
pub mod tracing_layer;
