//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// dofinder -- discovers container images and records the software they ship.
///
/// Use `dofinder <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "dofinder", version, about, long_about = None)]
pub struct Cli {
    /// Path to the dofinder.toml configuration file.
    #[arg(short, long, default_value = "dofinder.toml", global = true)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl the registry and publish eligible images for scanning.
    Crawl(CrawlArgs),

    /// Consume published images, probe them and report to the catalog.
    Scan(ScanArgs),

    /// Probe a single image and print the result without touching the catalog.
    Probe(ProbeArgs),

    /// Build or replay a test fixture.
    Fixture(FixtureArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- crawl ----

/// Crawl registry pages and publish every image whose canonical tag exists.
#[derive(Args, Debug, Default)]
pub struct CrawlArgs {
    /// First page to read (1-based).
    #[arg(long)]
    pub from_page: Option<u32>,

    /// Repositories per page.
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Stop after publishing this many images.
    #[arg(long)]
    pub max_images: Option<usize>,
}

// ---- scan ----

/// Run scanner workers until interrupted.
#[derive(Args, Debug, Default)]
pub struct ScanArgs {
    /// Number of concurrent workers.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Consume the test queue instead of the discovery queue.
    #[arg(long)]
    pub test: bool,

    /// Keep pulled images after scanning.
    #[arg(long)]
    pub keep_images: bool,
}

// ---- probe ----

/// Probe one `repository[:tag]` and print its descriptor.
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Repository name (e.g. `library/python` or `python`).
    pub repository: String,

    /// Tag to inspect (default: the configured canonical tag).
    #[arg(short, long)]
    pub tag: Option<String>,
}

// ---- fixture ----

/// Build or replay a fixture file of image references.
#[derive(Args, Debug)]
pub struct FixtureArgs {
    /// Fixture file path (default: `[fixture] path`).
    #[arg(long, global = true)]
    pub path: Option<PathBuf>,

    #[command(subcommand)]
    pub action: FixtureAction,
}

#[derive(Subcommand, Debug)]
pub enum FixtureAction {
    /// Crawl N eligible images and save them to the fixture file.
    Build {
        /// Number of images to collect.
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,

        /// First page to read (1-based).
        #[arg(long)]
        from_page: Option<u32>,

        /// Repositories per page.
        #[arg(long)]
        page_size: Option<u32>,
    },
    /// Publish every fixture entry to the test route.
    Push,
}

// ---- config ----

/// Manage dofinder configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only one section (general, broker, registry, catalog, crawler, scanner, fixture, metrics).
        #[arg(long)]
        section: Option<String>,
    },
}
