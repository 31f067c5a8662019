//! 이미지 스캐너: 디스커버리 메시지 하나의 처리 상태 기계
//!
//! ```text
//! Received ──▶ Checked ──┬──▶ Discard (tag missing / up to date)
//!                        └──▶ Scanning ──▶ Reported (create / update)
//! ```
//!
//! 1. 레지스트리에서 태그 목록을 다시 읽습니다. 대표 태그가 없으면 Discard.
//! 2. 카탈로그 상태로 [`ScanDecision`]을 만듭니다.
//! 3. `New`/`NeedsRescan`이면 pull → 프로브 → 기술자 조립 후 `create`/`update`.
//!
//! 이 계층에서는 재시도하지 않습니다. 스캔이 실패하면 카탈로그에 아무것도
//! 쓰지 않고 에러를 반환합니다.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use dofinder_core::event::DiscardReason;
use dofinder_core::metrics as m;
use dofinder_core::types::{
    ImageDescriptor, ImageReference, RepositoryMetadata, ScanAction, TagMetadata, plan_scan,
};
use dofinder_core::ScanOutcome;
use dofinder_registry::{
    CatalogClient, ProbeCatalog, RegistryClient, RegistryClientError, scan_decision,
};

use crate::config::ScanPoolConfig;
use crate::descriptor::assemble_descriptor;
use crate::docker::ContainerRuntime;
use crate::error::ScannerError;
use crate::probe::VersionProbeEngine;

/// 디스커버리 메시지 하나를 처리하는 쪽
///
/// 워커 풀은 이 trait만 알고 있으므로 테스트에서는 가짜 핸들러로 대체할 수 있습니다.
pub trait ScanHandler: Send + Sync + 'static {
    /// 이미지 하나를 끝까지 처리하고 최종 상태를 반환합니다.
    ///
    /// # Errors
    ///
    /// 처리 도중 실패하면 에러를 반환합니다. 카탈로그에는 부분 기록이 남지 않습니다.
    fn handle(
        &self,
        image: &ImageReference,
    ) -> impl Future<Output = Result<ScanOutcome, ScannerError>> + Send;
}

/// 레지스트리, 카탈로그, 프로브 카탈로그, 컨테이너 런타임을 조합한 스캐너
pub struct ImageScanner<R, C, P, D> {
    registry: Arc<R>,
    catalog: Arc<C>,
    probes: Arc<P>,
    runtime: Arc<D>,
    engine: VersionProbeEngine<D>,
    canonical_tag: String,
    remove_images: bool,
}

impl<R, C, P, D> ImageScanner<R, C, P, D>
where
    R: RegistryClient,
    C: CatalogClient,
    P: ProbeCatalog,
    D: ContainerRuntime,
{
    /// 새 스캐너를 생성합니다.
    pub fn new(
        registry: Arc<R>,
        catalog: Arc<C>,
        probes: Arc<P>,
        runtime: Arc<D>,
        config: &ScanPoolConfig,
    ) -> Self {
        let engine = VersionProbeEngine::new(Arc::clone(&runtime), config.probe_timeout());
        Self {
            registry,
            catalog,
            probes,
            runtime,
            engine,
            canonical_tag: config.canonical_tag.clone(),
            remove_images: config.remove_images,
        }
    }

    /// 검사할 대표 태그
    pub fn canonical_tag(&self) -> &str {
        &self.canonical_tag
    }

    /// 디스커버리 메시지 하나를 처리합니다.
    pub async fn process(&self, image: &ImageReference) -> Result<ScanOutcome, ScannerError> {
        let repository = image.repository.as_str();

        let tags = match self.registry.list_tags(repository).await {
            Ok(tags) => tags,
            Err(RegistryClientError::NotFound(_)) => {
                info!(repository, "repository gone from registry, discarded");
                return Ok(ScanOutcome::Discarded(DiscardReason::TagMissing));
            }
            Err(e) => return Err(e.into()),
        };

        let Some(tag) = tags.into_iter().find(|t| t.tag == self.canonical_tag) else {
            info!(
                repository,
                tag = %self.canonical_tag,
                "canonical tag missing, discarded"
            );
            return Ok(ScanOutcome::Discarded(DiscardReason::TagMissing));
        };

        let decision = scan_decision(self.catalog.as_ref(), repository)
            .await
            .map_err(ScannerError::Catalog)?;
        metrics::counter!(m::SCANNER_DECISIONS_TOTAL, m::LABEL_DECISION => decision.as_str())
            .increment(1);

        match plan_scan(true, decision) {
            ScanAction::Discard => {
                info!(repository, decision = %decision, "catalog record up to date, discarded");
                Ok(ScanOutcome::Discarded(DiscardReason::UpToDate))
            }
            ScanAction::Create => {
                info!(repository, decision = %decision, "repository selected for scan");
                let descriptor = self.scan(repository, &tag).await?;
                self.catalog
                    .create(&descriptor)
                    .await
                    .map_err(ScannerError::Catalog)?;
                info!(repository, tag = %descriptor.tag, "descriptor created");
                Ok(ScanOutcome::Created(descriptor))
            }
            ScanAction::Update => {
                info!(repository, decision = %decision, "repository selected for rescan");
                let descriptor = self.scan(repository, &tag).await?;
                self.catalog
                    .update(&descriptor)
                    .await
                    .map_err(ScannerError::Catalog)?;
                info!(repository, tag = %descriptor.tag, "descriptor updated");
                Ok(ScanOutcome::Updated(descriptor))
            }
        }
    }

    /// `repository:tag`를 pull하고 모든 프로브를 실행해 기술자를 조립합니다.
    ///
    /// 카탈로그에는 아무것도 쓰지 않습니다. `last_scan`은 마지막 프로브가 끝난 시각입니다.
    pub async fn scan(
        &self,
        repository: &str,
        tag: &TagMetadata,
    ) -> Result<ImageDescriptor, ScannerError> {
        let started = Instant::now();

        let system = self
            .probes
            .system_probes()
            .await
            .map_err(ScannerError::Catalog)?;
        let software = self
            .probes
            .software_probes()
            .await
            .map_err(ScannerError::Catalog)?;

        let metadata = match self.registry.repository_metadata(repository).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(repository, error = %e, "repository metadata unavailable");
                RepositoryMetadata::default()
            }
        };

        let image = format!("{repository}:{}", tag.tag);
        self.runtime.pull_image(repository, &tag.tag).await?;
        debug!(image = %image, "image pulled");

        let report = self.engine.run_all(&image, &system, &software).await;

        if self.remove_images {
            match self.runtime.remove_image(&image).await {
                Ok(()) => debug!(image = %image, "image removed"),
                Err(e) if e.is_fatal() && report.is_ok() => return Err(e),
                Err(e) => warn!(image = %image, error = %e, "image removal failed"),
            }
        }

        let report = report?;
        let descriptor = assemble_descriptor(repository, tag, &metadata, report, Utc::now());

        metrics::histogram!(m::SCANNER_SCAN_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        info!(
            repository,
            tag = %tag.tag,
            distro = descriptor.distro.as_deref().unwrap_or("-"),
            softwares = descriptor.softwares.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scan finished"
        );
        Ok(descriptor)
    }

    /// 카탈로그를 거치지 않고 `repository:tag` 하나를 검사합니다.
    ///
    /// `tag`가 없으면 대표 태그를 사용합니다.
    pub async fn inspect(
        &self,
        repository: &str,
        tag: Option<&str>,
    ) -> Result<ImageDescriptor, ScannerError> {
        let tag = tag.unwrap_or(&self.canonical_tag);
        let metadata = self.registry.tag_metadata(repository, tag).await?;
        self.scan(repository, &metadata).await
    }
}

impl<R, C, P, D> ScanHandler for ImageScanner<R, C, P, D>
where
    R: RegistryClient,
    C: CatalogClient,
    P: ProbeCatalog,
    D: ContainerRuntime,
{
    async fn handle(&self, image: &ImageReference) -> Result<ScanOutcome, ScannerError> {
        self.process(image).await
    }
}
