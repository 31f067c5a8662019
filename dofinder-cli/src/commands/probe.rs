//! `dofinder probe` command handler

use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use dofinder_core::{DofinderConfig, ImageDescriptor};
use dofinder_registry::{ConfiguredProbeCatalog, HttpCatalogClient, HubRegistryClient};
use dofinder_scanner::{BollardRuntime, ContainerRuntime, ImageScanner, ScanPoolConfig};

use crate::cli::ProbeArgs;
use crate::commands::request_timeout;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `probe` command.
///
/// Scans one image with the configured probes and prints the descriptor.
/// The catalog is never consulted or written.
pub async fn execute(
    args: ProbeArgs,
    config: &DofinderConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let timeout = request_timeout(config);
    let pool_config = ScanPoolConfig::from_core(config);

    let runtime = Arc::new(BollardRuntime::connect(&config.scanner.docker_socket)?);
    runtime.ping().await?;

    let registry = Arc::new(HubRegistryClient::new(&config.registry)?);
    let catalog = Arc::new(HttpCatalogClient::new(&config.catalog, timeout)?);
    let probes = Arc::new(ConfiguredProbeCatalog::from_config(&config.catalog, timeout).await?);
    let scanner = ImageScanner::new(registry, catalog, probes, runtime, &pool_config);

    info!(repository = %args.repository, tag = ?args.tag, "probing image");
    let descriptor = scanner
        .inspect(&args.repository, args.tag.as_deref())
        .await?;

    writer.render(&ImageReport(descriptor))
}

/// Descriptor produced by a one-off probe run.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ImageReport(pub ImageDescriptor);

impl Render for ImageReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        let d = &self.0;
        writeln!(w, "{}:{}", d.repository, d.tag)?;
        if let Some(description) = &d.description {
            writeln!(w, "  Description: {description}")?;
        }
        if let Some(size) = d.size {
            writeln!(w, "  Size:        {size} bytes")?;
        }
        writeln!(
            w,
            "  Distro:      {}",
            d.distro.as_deref().unwrap_or("(unknown)")
        )?;
        if d.softwares.is_empty() {
            writeln!(w, "  Software:    (none found)")?;
        } else {
            writeln!(w, "  Software:")?;
            for finding in &d.softwares {
                writeln!(w, "    {:<16} {}", finding.software, finding.version)?;
            }
        }
        writeln!(w, "  Scanned at:  {}", d.last_scan.to_rfc3339())?;
        Ok(())
    }
}
