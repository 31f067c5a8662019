//! `dofinder scan` command handler
//!
//! Wires the scanner pool to live collaborators: the AMQP broker, the
//! registry API, the catalog service, the probe catalog and the local
//! container runtime. Runs until interrupted or until a worker hits an
//! unreachable dependency.

use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use dofinder_broker::{AmqpBroker, MessageBroker};
use dofinder_core::pipeline::Pipeline;
use dofinder_core::{DofinderConfig, ScanEvent, ScanOutcome};
use dofinder_registry::{ConfiguredProbeCatalog, HttpCatalogClient, HubRegistryClient};
use dofinder_scanner::{
    BollardRuntime, ContainerRuntime, ImageScanner, ScanPoolConfig, ScanWorkerPoolBuilder,
};

use crate::cli::ScanArgs;
use crate::commands::request_timeout;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `scan` command.
pub async fn execute(
    args: ScanArgs,
    config: &DofinderConfig,
    cancel: &CancellationToken,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = effective_config(&args, config)?;
    let pool_config = pool_config(&args, &config);
    let timeout = request_timeout(&config);

    let runtime = Arc::new(BollardRuntime::connect(&config.scanner.docker_socket)?);
    runtime.ping().await?;

    let registry = Arc::new(HubRegistryClient::new(&config.registry)?);
    let catalog = Arc::new(HttpCatalogClient::new(&config.catalog, timeout)?);
    let probes = Arc::new(ConfiguredProbeCatalog::from_config(&config.catalog, timeout).await?);
    let broker = Arc::new(AmqpBroker::connect(&config.broker).await?);

    let scanner = ImageScanner::new(registry, catalog, probes, runtime, &pool_config);
    let (mut pool, events) = ScanWorkerPoolBuilder::new()
        .config(pool_config.clone())
        .broker(Arc::clone(&broker))
        .handler(Arc::new(scanner))
        .cancellation(cancel.clone())
        .build()?;
    let tally = events.map(|rx| tokio::spawn(tally_events(rx)));

    pool.start().await?;
    info!(
        queue = %pool_config.queue,
        workers = pool_config.workers,
        "scanner running"
    );

    pool.shutdown_token().cancelled().await;
    pool.stop().await?;

    let fatal = pool.fatal_error().map(str::to_owned);
    let processed = pool.messages_processed();
    drop(pool);

    // the event channel closes once the pool is dropped
    let tally = match tally {
        Some(handle) => handle.await.unwrap_or_else(|e| {
            warn!(error = %e, "event tally task failed");
            OutcomeTally::default()
        }),
        None => OutcomeTally::default(),
    };

    if let Err(e) = broker.close().await {
        warn!(error = %e, "failed to close broker connection");
    }

    let report = ScanReport {
        queue: pool_config.queue,
        workers: pool_config.workers,
        processed,
        outcomes: tally,
        fatal_error: fatal.clone(),
    };
    writer.render(&report)?;

    match fatal {
        Some(reason) => Err(CliError::ScanAborted(reason)),
        None => Ok(()),
    }
}

/// Apply command-line overrides to `[scanner]` and re-validate.
pub(crate) fn effective_config(
    args: &ScanArgs,
    config: &DofinderConfig,
) -> Result<DofinderConfig, CliError> {
    let mut config = config.clone();
    if let Some(workers) = args.workers {
        config.scanner.workers = workers;
    }
    if args.keep_images {
        config.scanner.remove_images = false;
    }
    config.validate()?;
    Ok(config)
}

/// Pool configuration for the selected queue.
pub(crate) fn pool_config(args: &ScanArgs, config: &DofinderConfig) -> ScanPoolConfig {
    let pool_config = ScanPoolConfig::from_core(config);
    if args.test {
        pool_config.with_queue(config.broker.test_queue.clone())
    } else {
        pool_config
    }
}

/// Count of settled messages per outcome.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeTally {
    pub created: u64,
    pub updated: u64,
    pub discarded: u64,
    pub failed: u64,
}

impl OutcomeTally {
    pub fn record(&mut self, outcome: &ScanOutcome) {
        match outcome {
            ScanOutcome::Created(_) => self.created += 1,
            ScanOutcome::Updated(_) => self.updated += 1,
            ScanOutcome::Discarded(_) => self.discarded += 1,
            ScanOutcome::Failed(_) => self.failed += 1,
        }
    }
}

async fn tally_events(mut rx: mpsc::Receiver<ScanEvent>) -> OutcomeTally {
    let mut tally = OutcomeTally::default();
    while let Some(event) = rx.recv().await {
        if event.is_failure() {
            warn!(trace_id = %event.trace_id, repository = %event.repository, "{}", event.outcome);
        } else {
            info!(trace_id = %event.trace_id, repository = %event.repository, "{}", event.outcome);
        }
        tally.record(&event.outcome);
    }
    tally
}

/// Scanner run summary for output rendering.
#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub queue: String,
    pub workers: usize,
    pub processed: u64,
    pub outcomes: OutcomeTally,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<String>,
}

impl Render for ScanReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(
            w,
            "Scanner stopped ({} workers on '{}')",
            self.workers, self.queue
        )?;
        writeln!(w, "  Processed:  {}", self.processed)?;
        writeln!(w, "  Created:    {}", self.outcomes.created)?;
        writeln!(w, "  Updated:    {}", self.outcomes.updated)?;
        writeln!(w, "  Discarded:  {}", self.outcomes.discarded)?;
        writeln!(w, "  Failed:     {}", self.outcomes.failed)?;
        if let Some(reason) = &self.fatal_error {
            writeln!(w, "  Stopped on: {reason}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dofinder_core::event::DiscardReason;

    #[test]
    fn test_flag_switches_to_test_queue() {
        let config = DofinderConfig::default();
        let args = ScanArgs {
            test: true,
            ..Default::default()
        };
        assert_eq!(pool_config(&args, &config).queue, config.broker.test_queue);
        assert_eq!(
            pool_config(&ScanArgs::default(), &config).queue,
            config.broker.queue
        );
    }

    #[test]
    fn overrides_apply_to_pool() {
        let args = ScanArgs {
            workers: Some(4),
            keep_images: true,
            ..Default::default()
        };
        let config = effective_config(&args, &DofinderConfig::default()).expect("valid");
        let pool = pool_config(&args, &config);
        assert_eq!(pool.workers, 4);
        assert!(!pool.remove_images);
    }

    #[test]
    fn zero_workers_is_a_config_error() {
        let args = ScanArgs {
            workers: Some(0),
            ..Default::default()
        };
        let err = effective_config(&args, &DofinderConfig::default()).expect_err("0 workers");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn tally_counts_by_outcome() {
        let mut tally = OutcomeTally::default();
        tally.record(&ScanOutcome::Discarded(DiscardReason::UpToDate));
        tally.record(&ScanOutcome::Discarded(DiscardReason::TagMissing));
        tally.record(&ScanOutcome::Failed("pull failed".to_owned()));
        assert_eq!(
            tally,
            OutcomeTally {
                created: 0,
                updated: 0,
                discarded: 2,
                failed: 1,
            }
        );
    }

    #[tokio::test]
    async fn tally_task_ends_when_senders_drop() {
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(tally_events(rx));
        tx.send(ScanEvent::new("acme/tool", ScanOutcome::Failed("boom".to_owned())))
            .await
            .unwrap();
        drop(tx);
        let tally = handle.await.unwrap();
        assert_eq!(tally.failed, 1);
    }

    #[test]
    fn report_text_shows_fatal_reason() {
        let report = ScanReport {
            queue: "images".to_owned(),
            workers: 2,
            processed: 3,
            outcomes: OutcomeTally::default(),
            fatal_error: Some("docker connection error: refused".to_owned()),
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("2 workers on 'images'"));
        assert!(text.contains("Stopped on: docker connection error: refused"));
    }
}
