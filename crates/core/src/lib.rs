//! # Core
//!
//! Shared building blocks for the hcert project: the numeric error registry
//! with its accumulating error list, region configuration, and identifier
//! suffix generation. Not intended to be used directly.

pub mod error;
pub mod gen;
pub mod region;

pub use error::{CertError, ErrorCode, ErrorList};
pub use region::RegionConfig;

/// Result type for provider-boundary operations.
///
/// External collaborators (secret stores, gateways, persistence) surface
/// their failures as `anyhow` errors; the pipelines translate them into
/// registry entries at the boundary.
pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;
