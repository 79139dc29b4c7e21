//! Access to the school REST backend through the authenticated pipeline.

pub mod client;
pub mod errors;
pub mod resources;

pub use client::{ApiClient, ApiRequest, ApiResponse, PipelineConfig};
pub use errors::ApiError;
pub use resources::{Lookup, Resource};
