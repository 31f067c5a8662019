//! `dofinder fixture` command handler

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use dofinder_broker::{AmqpBroker, MessageBroker};
use dofinder_core::DofinderConfig;
use dofinder_crawler::{CrawlRequest, Crawler, build_fixture, push_fixture};
use dofinder_registry::HubRegistryClient;

use crate::cli::{CrawlArgs, FixtureAction, FixtureArgs};
use crate::commands::crawl::{effective_config, stop_reason_label};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `fixture` command.
pub async fn execute(
    args: FixtureArgs,
    config: &DofinderConfig,
    cancel: &CancellationToken,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let path = fixture_path(args.path, config);
    match args.action {
        FixtureAction::Build {
            count,
            from_page,
            page_size,
        } => {
            let crawl_args = CrawlArgs {
                from_page,
                page_size,
                max_images: Some(count),
            };
            execute_build(&crawl_args, config, &path, cancel, writer).await
        }
        FixtureAction::Push => execute_push(config, &path, cancel, writer).await,
    }
}

pub(crate) fn fixture_path(arg: Option<PathBuf>, config: &DofinderConfig) -> PathBuf {
    arg.unwrap_or_else(|| PathBuf::from(&config.fixture.path))
}

async fn execute_build(
    args: &CrawlArgs,
    config: &DofinderConfig,
    path: &Path,
    cancel: &CancellationToken,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = effective_config(args, config)?;
    let registry = Arc::new(HubRegistryClient::new(&config.registry)?);
    let crawler = Crawler::new(registry, &config.registry);

    let summary = build_fixture(
        &crawler,
        CrawlRequest::from_config(&config.crawler),
        path,
        cancel,
    )
    .await?;

    writer.render(&FixtureReport {
        action: "build",
        path: path.display().to_string(),
        images: summary.published,
        route_key: None,
        stop_reason: Some(stop_reason_label(summary.stop_reason)),
    })
}

async fn execute_push(
    config: &DofinderConfig,
    path: &Path,
    cancel: &CancellationToken,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let broker = AmqpBroker::connect(&config.broker).await?;
    let route_key = &config.broker.test_route_key;
    let result = push_fixture(&broker, path, route_key, cancel).await;
    if let Err(e) = broker.close().await {
        warn!(error = %e, "failed to close broker connection");
    }

    writer.render(&FixtureReport {
        action: "push",
        path: path.display().to_string(),
        images: result?,
        route_key: Some(route_key.clone()),
        stop_reason: None,
    })
}

/// Fixture build/push result for output rendering.
#[derive(Debug, Serialize)]
pub struct FixtureReport {
    pub action: &'static str,
    pub path: String,
    pub images: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<&'static str>,
}

impl Render for FixtureReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        match &self.route_key {
            Some(route_key) => writeln!(
                w,
                "Pushed {} images from {} to {}",
                self.images, self.path, route_key
            ),
            None => writeln!(
                w,
                "Saved {} images to {} ({})",
                self.images,
                self.path,
                self.stop_reason.unwrap_or("done")
            ),
        }
    }
}
