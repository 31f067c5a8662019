//! Version probe engine.
//!
//! For one pulled `repository:tag`, every probe runs in its own disposable
//! container:
//!
//! ```text
//! create ──▶ start ──▶ wait (bounded) ──▶ logs ──▶ remove
//!              │            │               │        ▲
//!              └── error ───┴── timeout ────┴────────┘  (remove always runs once)
//! ```
//!
//! The captured text is matched with the probe's pattern; the first leftmost
//! match is the extracted value. No match, a missing binary, or a timeout
//! all mean "not found" and never abort the scan. Only a fatal runtime
//! failure (socket unreachable) propagates.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use dofinder_core::metrics as m;
use dofinder_core::types::{ProbeKind, ProbeSpec, SoftwareFinding};

use crate::docker::ContainerRuntime;
use crate::error::ScannerError;

/// Extracts the first leftmost match of `pattern` in `text`.
///
/// The whole match is returned, not a capture group. Absence is `None`.
pub fn extract_version(text: &str, pattern: &Regex) -> Option<String> {
    pattern.find(text).map(|m| m.as_str().to_owned())
}

/// Combined result of all probes for one image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    /// Distro label from system probes.
    pub distro: Option<String>,
    /// Software findings, unique by name, in probe order.
    pub softwares: Vec<SoftwareFinding>,
}

/// Result of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ProbeResult {
    Found(String),
    NotFound,
    TimedOut,
    Failed,
}

impl ProbeResult {
    fn label(&self) -> &'static str {
        match self {
            Self::Found(_) => "found",
            Self::NotFound => "not_found",
            Self::TimedOut => "timeout",
            Self::Failed => "error",
        }
    }
}

/// Runs probe containers against an image.
pub struct VersionProbeEngine<D> {
    runtime: Arc<D>,
    probe_timeout: Duration,
}

impl<D: ContainerRuntime> VersionProbeEngine<D> {
    /// Creates an engine with a per-probe wait bound.
    pub fn new(runtime: Arc<D>, probe_timeout: Duration) -> Self {
        Self {
            runtime,
            probe_timeout,
        }
    }

    /// Runs every system probe, then every software probe, against `image`.
    ///
    /// A later matching system probe overrides an earlier distro label.
    /// A software name found once is not probed again.
    ///
    /// # Errors
    ///
    /// Only fatal runtime failures are returned.
    pub async fn run_all(
        &self,
        image: &str,
        system: &[ProbeSpec],
        software: &[ProbeSpec],
    ) -> Result<ProbeReport, ScannerError> {
        let mut report = ProbeReport::default();

        for probe in system {
            if let Some(distro) = self.probe(image, probe).await? {
                report.distro = Some(distro);
            }
        }

        for probe in software {
            if report.softwares.iter().any(|s| s.software == probe.name) {
                debug!(image, probe = %probe.name, "software already found, probe skipped");
                continue;
            }
            if let Some(version) = self.probe(image, probe).await? {
                report
                    .softwares
                    .push(SoftwareFinding::new(probe.name.clone(), version));
            }
        }

        info!(
            image,
            distro = report.distro.as_deref().unwrap_or("-"),
            softwares = report.softwares.len(),
            "probes finished"
        );
        Ok(report)
    }

    /// Runs one probe and returns the extracted value.
    pub async fn probe(&self, image: &str, probe: &ProbeSpec) -> Result<Option<String>, ScannerError> {
        let pattern = match probe.compile() {
            Ok(pattern) => pattern,
            Err(e) => {
                warn!(image, probe = %probe.name, error = %e, "invalid probe pattern, skipped");
                return Ok(None);
            }
        };

        let command = probe.command();
        let result = match probe.entrypoint() {
            Some(argv) => self.execute(image, &command, &argv, &pattern).await?,
            None => {
                warn!(image, probe = %probe.name, command = %command, "probe command cannot be split");
                ProbeResult::Failed
            }
        };

        metrics::counter!(
            m::SCANNER_PROBES_TOTAL,
            m::LABEL_PROBE_KIND => kind_label(probe.kind),
            m::LABEL_RESULT => result.label()
        )
        .increment(1);

        match result {
            ProbeResult::Found(value) => {
                debug!(image, command = %command, value = %value, "probe found");
                Ok(Some(value))
            }
            other => {
                debug!(image, command = %command, result = other.label(), "probe not found");
                Ok(None)
            }
        }
    }

    async fn execute(
        &self,
        image: &str,
        command: &str,
        argv: &[String],
        pattern: &Regex,
    ) -> Result<ProbeResult, ScannerError> {
        let id = match self.runtime.create_container(image, argv).await {
            Ok(id) => id,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(image, command, error = %e, "probe container not created");
                return Ok(ProbeResult::Failed);
            }
        };

        let outcome = self.run_created(image, command, &id, pattern).await;

        // 생성된 컨테이너는 결과와 무관하게 정확히 한 번 삭제
        match self.runtime.remove_container(&id).await {
            Ok(()) => {
                metrics::counter!(m::SCANNER_CONTAINERS_REMOVED_TOTAL).increment(1);
                debug!(image, container_id = %id, "probe container removed");
            }
            Err(e) if e.is_fatal() && outcome.is_ok() => return Err(e),
            Err(e) => warn!(image, container_id = %id, error = %e, "probe container removal failed"),
        }

        outcome
    }

    async fn run_created(
        &self,
        image: &str,
        command: &str,
        id: &str,
        pattern: &Regex,
    ) -> Result<ProbeResult, ScannerError> {
        if let Err(e) = self.runtime.start_container(id).await {
            if e.is_fatal() {
                return Err(e);
            }
            warn!(image, command, container_id = %id, error = %e, "probe container did not start");
            return Ok(ProbeResult::Failed);
        }

        match tokio::time::timeout(self.probe_timeout, self.runtime.wait_container(id)).await {
            Ok(Ok(code)) => debug!(image, command, exit_code = code, "probe container exited"),
            Ok(Err(e)) if e.is_fatal() => return Err(e),
            Ok(Err(e)) => {
                warn!(image, command, container_id = %id, error = %e, "waiting for probe container failed");
                return Ok(ProbeResult::Failed);
            }
            Err(_) => {
                metrics::counter!(m::SCANNER_PROBE_TIMEOUTS_TOTAL).increment(1);
                warn!(
                    image,
                    command,
                    container_id = %id,
                    timeout_secs = self.probe_timeout.as_secs(),
                    "probe timed out"
                );
                return Ok(ProbeResult::TimedOut);
            }
        }

        let output = match self.runtime.container_logs(id).await {
            Ok(output) => output,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(image, command, container_id = %id, error = %e, "probe logs unavailable");
                return Ok(ProbeResult::Failed);
            }
        };

        Ok(match extract_version(&output, pattern) {
            Some(value) => ProbeResult::Found(value),
            None => ProbeResult::NotFound,
        })
    }
}

fn kind_label(kind: ProbeKind) -> &'static str {
    match kind {
        ProbeKind::System => "system",
        ProbeKind::Software => "software",
    }
}
