//! Corral - Container Registry Access Library
//!
//! Corral resolves Docker and OCI image names and talks to the registries
//! that host them: it parses image references, selects the authorization
//! strategy each registry requires, and fetches manifests, blobs, tag
//! lists, and catalogs over the Registry HTTP API V2.
//!
//! # Quick Start
//!
//! ```no_run
//! use libcorral::{RegistryProperties, RegistryService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let properties = RegistryProperties::from_yaml_str(
//!         r#"
//!         registry-configurations:
//!           dockerhub:
//!             registry-host: registry-1.docker.io
//!             authorization-type: dockeroauth2
//!         "#,
//!     )?;
//!     let service = RegistryService::new(&properties);
//!
//!     let image = service.resolve("nginx:latest")?;
//!     println!("{image}");
//!
//!     let manifest = service.get_manifest("nginx:latest").await?;
//!     println!("{manifest:#}");
//!     Ok(())
//! }
//! ```
//!
//! # Main Types
//!
//! - [`RegistryService`] - Main entry point for registry operations
//! - [`ImageReference`] - Parsed, validated image reference
//! - [`RegistryConfiguration`] - Per-registry connection settings
//! - [`RegistryProperties`] - Caller-supplied configuration root
//! - [`CorralError`] - Error type for all operations
//!
//! # Architecture
//!
//! Corral is organized into modules:
//!
//! - **[`reference`]** - Image name grammar, parsing, and the builder
//! - **[`config`]** - Registry configuration, merging, and secrets
//! - **[`auth`]** - The four authorization strategies
//! - **[`client`]** - Memoized HTTP clients and redirect handling
//! - **[`registry`]** - The high-level service facade

#![warn(clippy::all)]

/// Returns the libcorral crate version.
///
/// # Examples
///
/// ```
/// let version = libcorral::version();
/// assert!(!version.is_empty());
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod reference;
pub mod registry;

// Re-export commonly used types for convenience
pub use config::{AuthorizationType, RegistryConfiguration, RegistryProperties};
pub use error::{CorralError, Result};
pub use reference::{ImageReference, parser::ImageReferenceParser};
pub use registry::{RegistryRequestContext, RegistryService};
