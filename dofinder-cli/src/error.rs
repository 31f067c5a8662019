//! CLI-specific error types and exit code mapping

use dofinder_broker::BrokerClientError;
use dofinder_core::error::DofinderError;
use dofinder_crawler::CrawlerError;
use dofinder_registry::RegistryClientError;
use dofinder_scanner::ScannerError;

/// CLI-specific error type.
///
/// `exit_code()` maps each variant to a process exit code.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The scanner pool stopped because a collaborator became unreachable.
    #[error("scanner stopped: {0}")]
    ScanAborted(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from dofinder-core.
    #[error("{0}")]
    Core(#[from] DofinderError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                               |
    /// |------|---------------------------------------|
    /// | 0    | Success                               |
    /// | 1    | General / command error               |
    /// | 2    | Configuration error                   |
    /// | 3    | Scanner stopped on an unreachable dependency |
    /// | 10   | IO error                              |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(DofinderError::Config(_)) => 2,
            Self::ScanAborted(_) => 3,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}

impl From<CrawlerError> for CliError {
    fn from(e: CrawlerError) -> Self {
        Self::Core(e.into())
    }
}

impl From<ScannerError> for CliError {
    fn from(e: ScannerError) -> Self {
        Self::Core(e.into())
    }
}

impl From<BrokerClientError> for CliError {
    fn from(e: BrokerClientError) -> Self {
        Self::Core(e.into())
    }
}

impl From<RegistryClientError> for CliError {
    fn from(e: RegistryClientError) -> Self {
        Self::Core(e.into())
    }
}
