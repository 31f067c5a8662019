//! Command handlers -- one module per subcommand

use std::time::Duration;

use dofinder_core::DofinderConfig;

pub mod config;
pub mod crawl;
pub mod fixture;
pub mod probe;
pub mod scan;

/// HTTP timeout shared by the registry, catalog and probe service clients.
pub(crate) fn request_timeout(config: &DofinderConfig) -> Duration {
    Duration::from_secs(config.registry.request_timeout_secs)
}
