//! 스캐너 통합 테스트용 공용 mock

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use dofinder_core::types::{
    ImageDescriptor, ProbeSpec, RepositoryMetadata, ScanDecision, TagMetadata,
};
use dofinder_registry::{
    CatalogClient, ProbeCatalog, RegistryClient, RegistryClientError, RepositoryPage,
};
use dofinder_scanner::docker::MockRuntime;

pub const SEMVER: &str = r"[0-9]+\.[0-9]+\.[0-9]+";

// --- 레지스트리 ---

#[derive(Default)]
pub struct StubRegistry {
    tags: HashMap<String, Vec<TagMetadata>>,
    metadata: HashMap<String, RepositoryMetadata>,
}

impl StubRegistry {
    pub fn with_tag(mut self, repository: &str, tag: &str, size: i64) -> Self {
        self.tags
            .entry(repository.to_owned())
            .or_default()
            .push(TagMetadata {
                tag: tag.to_owned(),
                size_bytes: size,
                last_updated: None,
            });
        self
    }

    pub fn with_metadata(mut self, repository: &str, metadata: RepositoryMetadata) -> Self {
        self.metadata.insert(repository.to_owned(), metadata);
        self
    }
}

impl RegistryClient for StubRegistry {
    async fn list_repositories(
        &self,
        _page: u32,
        _page_size: u32,
    ) -> Result<RepositoryPage, RegistryClientError> {
        let mut names: Vec<String> = self.tags.keys().cloned().collect();
        names.sort();
        Ok(RepositoryPage {
            names,
            has_next: false,
        })
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<TagMetadata>, RegistryClientError> {
        self.tags
            .get(repository)
            .cloned()
            .ok_or_else(|| RegistryClientError::NotFound(repository.to_owned()))
    }

    async fn tag_metadata(
        &self,
        repository: &str,
        tag: &str,
    ) -> Result<TagMetadata, RegistryClientError> {
        self.list_tags(repository)
            .await?
            .into_iter()
            .find(|t| t.tag == tag)
            .ok_or_else(|| RegistryClientError::NotFound(format!("{repository}:{tag}")))
    }

    async fn repository_metadata(
        &self,
        repository: &str,
    ) -> Result<RepositoryMetadata, RegistryClientError> {
        Ok(self.metadata.get(repository).cloned().unwrap_or_default())
    }
}

// --- 카탈로그 ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Create,
    Update,
}

/// 저장소별 판단을 돌려주고 제출을 기록하는 카탈로그
///
/// 처음 생성된 저장소는 이후 `UpToDate`로 답합니다.
#[derive(Default)]
pub struct RecordingCatalog {
    decisions: Mutex<HashMap<String, ScanDecision>>,
    submissions: Mutex<Vec<(Submission, ImageDescriptor)>>,
}

impl RecordingCatalog {
    pub fn with_decision(self, repository: &str, decision: ScanDecision) -> Self {
        self.set_decision(repository, decision);
        self
    }

    pub fn set_decision(&self, repository: &str, decision: ScanDecision) {
        self.decisions
            .lock()
            .unwrap()
            .insert(repository.to_owned(), decision);
    }

    pub fn submissions(&self) -> Vec<(Submission, ImageDescriptor)> {
        self.submissions.lock().unwrap().clone()
    }

    fn decision(&self, repository: &str) -> ScanDecision {
        self.decisions
            .lock()
            .unwrap()
            .get(repository)
            .copied()
            .unwrap_or(ScanDecision::New)
    }

    fn record(&self, kind: Submission, descriptor: &ImageDescriptor) {
        self.submissions
            .lock()
            .unwrap()
            .push((kind, descriptor.clone()));
        self.set_decision(&descriptor.repository, ScanDecision::UpToDate);
    }
}

impl CatalogClient for RecordingCatalog {
    async fn is_new(&self, repository: &str) -> Result<bool, RegistryClientError> {
        Ok(self.decision(repository) == ScanDecision::New)
    }

    async fn must_rescan(&self, repository: &str) -> Result<bool, RegistryClientError> {
        Ok(self.decision(repository) == ScanDecision::NeedsRescan)
    }

    async fn create(&self, descriptor: &ImageDescriptor) -> Result<(), RegistryClientError> {
        self.record(Submission::Create, descriptor);
        Ok(())
    }

    async fn update(&self, descriptor: &ImageDescriptor) -> Result<(), RegistryClientError> {
        self.record(Submission::Update, descriptor);
        Ok(())
    }
}

// --- 프로브 카탈로그 ---

pub struct StaticProbes {
    pub system: Vec<ProbeSpec>,
    pub software: Vec<ProbeSpec>,
}

impl StaticProbes {
    pub fn standard() -> Self {
        Self {
            system: vec![ProbeSpec::system(
                "os-release",
                "cat /etc/os-release",
                "(?i)alpine|debian|ubuntu",
            )],
            software: vec![
                ProbeSpec::software("python", "--version", SEMVER),
                ProbeSpec::software("perl", "-v", SEMVER),
            ],
        }
    }
}

impl ProbeCatalog for StaticProbes {
    async fn system_probes(&self) -> Result<Vec<ProbeSpec>, RegistryClientError> {
        Ok(self.system.clone())
    }

    async fn software_probes(&self) -> Result<Vec<ProbeSpec>, RegistryClientError> {
        Ok(self.software.clone())
    }
}

// --- 컨테이너 런타임 ---

/// acme/tool 시나리오의 런타임 출력
pub fn acme_runtime() -> MockRuntime {
    MockRuntime::new()
        .with_output("cat /etc/os-release", "ID=alpine\nVERSION_ID=3.12.0\nPRETTY_NAME=\"Alpine Linux v3.12\"\n")
        .with_output("python --version", "Python 3.9.1\n")
        .with_missing("perl -v")
}
