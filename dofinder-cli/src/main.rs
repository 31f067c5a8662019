//! dofinder -- container image registry crawler and software version scanner
//!
//! `crawl` publishes eligible registry images to the discovery topic,
//! `scan` consumes them and reports probe results to the catalog.

mod cli;
mod commands;
mod error;
mod logging;
mod metrics_server;
mod output;

use std::path::Path;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use dofinder_core::DofinderConfig;
use dofinder_core::error::{ConfigError, DofinderError};

use cli::{Cli, Commands};
use error::CliError;
use output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);

    // config validate/show report load errors themselves
    let command = match cli.command {
        Commands::Config(args) => {
            return commands::config::execute(args, &cli.config, &writer).await;
        }
        other => other,
    };

    let (mut config, from_file) = load_config(&cli.config).await?;
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }
    config.validate()?;

    logging::init_tracing(&config.general)
        .map_err(|e| CliError::Config(format!("logging: {e}")))?;

    if config.metrics.enabled {
        metrics_server::install_metrics_recorder(&config.metrics)
            .map_err(|e| CliError::Command(e.to_string()))?;
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    if from_file {
        info!(config = %cli.config.display(), "dofinder starting");
    } else {
        warn!(
            config = %cli.config.display(),
            "config file not found, using defaults and environment overrides"
        );
    }

    match command {
        Commands::Crawl(args) => commands::crawl::execute(args, &config, &cancel, &writer).await,
        Commands::Scan(args) => commands::scan::execute(args, &config, &cancel, &writer).await,
        Commands::Probe(args) => commands::probe::execute(args, &config, &writer).await,
        Commands::Fixture(args) => {
            commands::fixture::execute(args, &config, &cancel, &writer).await
        }
        Commands::Config(_) => Ok(()),
    }
}

/// Load the configuration file, falling back to defaults plus environment
/// overrides when the file does not exist. The flag is `false` on fallback.
async fn load_config(path: &Path) -> Result<(DofinderConfig, bool), CliError> {
    match DofinderConfig::load(path).await {
        Ok(config) => Ok((config, true)),
        Err(DofinderError::Config(ConfigError::FileNotFound { .. })) => {
            let mut config = DofinderConfig::default();
            config.apply_env_overrides();
            Ok((config, false))
        }
        Err(e) => Err(e.into()),
    }
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("received SIGINT, shutting down");
                    token.cancel();
                }
                return;
            }
        };

        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => info!("received SIGINT, shutting down"),
                Err(e) => {
                    warn!(error = %e, "failed to listen for SIGINT");
                    return;
                }
            },
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("received ctrl-c, shutting down");
    }

    token.cancel();
}
