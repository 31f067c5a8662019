//! # dofinder-registry
//!
//! HTTP clients for the three read/write collaborators of the pipeline:
//!
//! - [`RegistryClient`]: image registry listing and metadata ([`HubRegistryClient`])
//! - [`CatalogClient`]: freshness queries and descriptor submission ([`HttpCatalogClient`])
//! - [`ProbeCatalog`]: probe definitions ([`HttpProbeCatalog`], [`FileProbeCatalog`])
//!
//! All traits use `impl Future` returns and are implemented with `reqwest`
//! in production and with in-memory doubles in tests.

pub mod catalog;
pub mod error;
pub mod hub;
pub mod probes;

pub use catalog::{CatalogClient, HttpCatalogClient, scan_decision};
pub use error::RegistryClientError;
pub use hub::{HubRegistryClient, RegistryClient, RepositoryPage, api_repository};
pub use probes::{
    ConfiguredProbeCatalog, FileProbeCatalog, HttpProbeCatalog, ProbeCatalog, validate_probe,
};
