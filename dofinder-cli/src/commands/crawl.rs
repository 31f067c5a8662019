//! `dofinder crawl` command handler

use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use dofinder_broker::{AmqpBroker, MessageBroker};
use dofinder_core::DofinderConfig;
use dofinder_crawler::{CrawlRequest, CrawlSummary, Crawler, PublishSink, StopReason};
use dofinder_registry::HubRegistryClient;

use crate::cli::CrawlArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `crawl` command.
///
/// Publishes every eligible image to the discovery route until
/// `max_images` is reached, the registry runs out of pages, or `cancel` fires.
pub async fn execute(
    args: CrawlArgs,
    config: &DofinderConfig,
    cancel: &CancellationToken,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = effective_config(&args, config)?;
    let request = CrawlRequest::from_config(&config.crawler);

    let registry = Arc::new(HubRegistryClient::new(&config.registry)?);
    let broker = Arc::new(AmqpBroker::connect(&config.broker).await?);
    let crawler = Crawler::new(registry, &config.registry);
    let mut sink = PublishSink::new(Arc::clone(&broker), config.broker.route_key.clone());

    let result = crawler.crawl(request, &mut sink, cancel).await;
    if let Err(e) = broker.close().await {
        warn!(error = %e, "failed to close broker connection");
    }
    let summary = result?;

    info!(
        published = summary.published,
        next_page = summary.next_page,
        "crawl finished"
    );
    writer.render(&CrawlReport::new(&config.broker.route_key, &summary))
}

/// Apply command-line overrides to `[crawler]` and re-validate.
pub(crate) fn effective_config(
    args: &CrawlArgs,
    config: &DofinderConfig,
) -> Result<DofinderConfig, CliError> {
    let mut config = config.clone();
    if let Some(from_page) = args.from_page {
        config.crawler.from_page = from_page;
    }
    if let Some(page_size) = args.page_size {
        config.crawler.page_size = page_size;
    }
    if let Some(max_images) = args.max_images {
        config.crawler.max_images = max_images;
    }
    config.validate()?;
    Ok(config)
}

pub(crate) fn stop_reason_label(reason: StopReason) -> &'static str {
    match reason {
        StopReason::MaxImages => "max_images",
        StopReason::Exhausted => "exhausted",
        StopReason::Cancelled => "cancelled",
    }
}

/// Crawl result for output rendering.
#[derive(Debug, Serialize)]
pub struct CrawlReport {
    pub route_key: String,
    pub published: usize,
    pub rejected: usize,
    pub tag_failures: usize,
    pub pages_read: u32,
    pub pages_failed: u32,
    pub next_page: u32,
    pub stop_reason: &'static str,
}

impl CrawlReport {
    pub fn new(route_key: &str, summary: &CrawlSummary) -> Self {
        Self {
            route_key: route_key.to_owned(),
            published: summary.published,
            rejected: summary.rejected,
            tag_failures: summary.tag_failures,
            pages_read: summary.pages_read,
            pages_failed: summary.pages_failed,
            next_page: summary.next_page,
            stop_reason: stop_reason_label(summary.stop_reason),
        }
    }
}

impl Render for CrawlReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "Crawl finished ({})", self.stop_reason)?;
        writeln!(w, "  Published:    {} -> {}", self.published, self.route_key)?;
        writeln!(w, "  Rejected:     {}", self.rejected)?;
        if self.tag_failures > 0 {
            writeln!(w, "  Tag failures: {}", self.tag_failures)?;
        }
        writeln!(
            w,
            "  Pages:        {} read, {} failed",
            self.pages_read, self.pages_failed
        )?;
        writeln!(w, "  Resume from:  --from-page {}", self.next_page)?;
        Ok(())
    }
}
