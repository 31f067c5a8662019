//! Probe catalog: the list of system and software probes run against each image.
//!
//! Two sources are supported:
//!
//! - [`HttpProbeCatalog`]: the software service
//!   (`GET {software_url}` for software probes, `GET {software_url}/system`
//!   for system probes)
//! - [`FileProbeCatalog`]: a static TOML file with `[[system]]` and
//!   `[[software]]` tables
//!
//! Every probe is validated when loaded: the command must be non-empty and
//! the pattern must compile.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use dofinder_core::config::CatalogConfig;
use dofinder_core::types::{ProbeKind, ProbeSpec};

use crate::error::RegistryClientError;

/// Source of probe definitions.
pub trait ProbeCatalog: Send + Sync + 'static {
    /// Probes producing a distro label.
    fn system_probes(
        &self,
    ) -> impl Future<Output = Result<Vec<ProbeSpec>, RegistryClientError>> + Send;

    /// Probes producing a software name and version.
    fn software_probes(
        &self,
    ) -> impl Future<Output = Result<Vec<ProbeSpec>, RegistryClientError>> + Send;
}

/// Wire/file form of a system probe.
#[derive(Debug, Clone, Deserialize)]
struct SystemEntry {
    #[serde(default)]
    name: Option<String>,
    cmd: String,
    regex: String,
}

/// Wire/file form of a software probe.
#[derive(Debug, Clone, Deserialize)]
struct SoftwareEntry {
    name: String,
    cmd: String,
    regex: String,
}

impl SystemEntry {
    fn into_spec(self) -> ProbeSpec {
        let name = self.name.unwrap_or_else(|| self.cmd.clone());
        ProbeSpec::system(name, self.cmd, self.regex)
    }
}

impl SoftwareEntry {
    fn into_spec(self) -> ProbeSpec {
        ProbeSpec::software(self.name, self.cmd, self.regex)
    }
}

/// Checks that a probe can be executed and its pattern compiles.
pub fn validate_probe(probe: &ProbeSpec) -> Result<(), RegistryClientError> {
    if probe.command().trim().is_empty() {
        return Err(RegistryClientError::InvalidProbe {
            name: probe.name.clone(),
            reason: "empty command".to_owned(),
        });
    }
    if probe.entrypoint().is_none() {
        return Err(RegistryClientError::InvalidProbe {
            name: probe.name.clone(),
            reason: format!("unbalanced quoting in command `{}`", probe.command()),
        });
    }
    if probe.kind == ProbeKind::Software && probe.name.trim().is_empty() {
        return Err(RegistryClientError::InvalidProbe {
            name: probe.name.clone(),
            reason: "software probe without a name".to_owned(),
        });
    }
    probe
        .compile()
        .map_err(|e| RegistryClientError::InvalidProbe {
            name: probe.name.clone(),
            reason: format!("invalid pattern: {e}"),
        })?;
    Ok(())
}

fn validate_all(probes: Vec<ProbeSpec>) -> Result<Vec<ProbeSpec>, RegistryClientError> {
    for probe in &probes {
        validate_probe(probe)?;
    }
    Ok(probes)
}

/// Probe catalog backed by the software service.
pub struct HttpProbeCatalog {
    http: reqwest::Client,
    software_url: String,
}

impl HttpProbeCatalog {
    /// Builds a client from the `[catalog]` config section.
    pub fn new(config: &CatalogConfig, timeout: Duration) -> Result<Self, RegistryClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryClientError::Config {
                field: "catalog".to_owned(),
                reason: format!("failed to build http client: {e}"),
            })?;
        Ok(Self {
            http,
            software_url: config.software_url.trim_end_matches('/').to_owned(),
        })
    }

    async fn fetch<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
    ) -> Result<Vec<T>, RegistryClientError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| RegistryClientError::CatalogUnavailable(format!("GET {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryClientError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| RegistryClientError::Decode {
                url: url.to_owned(),
                reason: e.to_string(),
            })
    }
}

impl ProbeCatalog for HttpProbeCatalog {
    async fn system_probes(&self) -> Result<Vec<ProbeSpec>, RegistryClientError> {
        let url = format!("{}/system", self.software_url);
        let entries: Vec<SystemEntry> = self.fetch(&url).await?;
        debug!(count = entries.len(), "system probes fetched");
        validate_all(entries.into_iter().map(SystemEntry::into_spec).collect())
    }

    async fn software_probes(&self) -> Result<Vec<ProbeSpec>, RegistryClientError> {
        let entries: Vec<SoftwareEntry> = self.fetch(&self.software_url).await?;
        debug!(count = entries.len(), "software probes fetched");
        validate_all(entries.into_iter().map(SoftwareEntry::into_spec).collect())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFile {
    #[serde(default)]
    system: Vec<SystemEntry>,
    #[serde(default)]
    software: Vec<SoftwareEntry>,
}

/// Probe catalog loaded once from a TOML file.
#[derive(Debug, Clone, Default)]
pub struct FileProbeCatalog {
    system: Vec<ProbeSpec>,
    software: Vec<ProbeSpec>,
}

impl FileProbeCatalog {
    /// Parses a probe list from TOML text.
    pub fn parse(toml_str: &str) -> Result<Self, RegistryClientError> {
        let file: ProbeFile = toml::from_str(toml_str).map_err(|e| RegistryClientError::ProbeFile {
            path: "<inline>".to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            system: validate_all(file.system.into_iter().map(SystemEntry::into_spec).collect())?,
            software: validate_all(
                file.software
                    .into_iter()
                    .map(SoftwareEntry::into_spec)
                    .collect(),
            )?,
        })
    }

    /// Loads a probe list from a TOML file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, RegistryClientError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RegistryClientError::ProbeFile {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let catalog = Self::parse(&content).map_err(|e| match e {
            RegistryClientError::ProbeFile { reason, .. } => RegistryClientError::ProbeFile {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })?;
        info!(
            path = %path.display(),
            system = catalog.system.len(),
            software = catalog.software.len(),
            "probe file loaded"
        );
        Ok(catalog)
    }

    /// Builds a catalog from already constructed probes.
    pub fn from_probes(probes: Vec<ProbeSpec>) -> Result<Self, RegistryClientError> {
        let probes = validate_all(probes)?;
        let (system, software): (Vec<_>, Vec<_>) = probes
            .into_iter()
            .partition(|p| p.kind == ProbeKind::System);
        Ok(Self { system, software })
    }
}

impl ProbeCatalog for FileProbeCatalog {
    async fn system_probes(&self) -> Result<Vec<ProbeSpec>, RegistryClientError> {
        Ok(self.system.clone())
    }

    async fn software_probes(&self) -> Result<Vec<ProbeSpec>, RegistryClientError> {
        Ok(self.software.clone())
    }
}

/// Probe catalog selected from configuration.
///
/// `catalog.probes_file` set: the file; otherwise the software service.
pub enum ConfiguredProbeCatalog {
    /// Software service
    Http(HttpProbeCatalog),
    /// Static file
    File(FileProbeCatalog),
}

impl ConfiguredProbeCatalog {
    /// Builds the catalog described by the `[catalog]` section.
    pub async fn from_config(
        config: &CatalogConfig,
        timeout: Duration,
    ) -> Result<Self, RegistryClientError> {
        if config.probes_file.is_empty() {
            Ok(Self::Http(HttpProbeCatalog::new(config, timeout)?))
        } else {
            Ok(Self::File(FileProbeCatalog::load(&config.probes_file).await?))
        }
    }
}

impl ProbeCatalog for ConfiguredProbeCatalog {
    async fn system_probes(&self) -> Result<Vec<ProbeSpec>, RegistryClientError> {
        match self {
            Self::Http(catalog) => catalog.system_probes().await,
            Self::File(catalog) => catalog.system_probes().await,
        }
    }

    async fn software_probes(&self) -> Result<Vec<ProbeSpec>, RegistryClientError> {
        match self {
            Self::Http(catalog) => catalog.software_probes().await,
            Self::File(catalog) => catalog.software_probes().await,
        }
    }
}
