//! 이미지 기술자 조립
//!
//! 레지스트리 메타데이터, 태그 메타데이터, 프로브 결과를 하나의
//! [`ImageDescriptor`]로 합칩니다. `last_scan`은 호출자가 스캔 완료 시점에 정합니다.

use chrono::{DateTime, Utc};

use dofinder_core::types::{ImageDescriptor, RepositoryMetadata, TagMetadata};

use crate::probe::ProbeReport;

/// 기술자를 조립합니다.
pub fn assemble_descriptor(
    repository: &str,
    tag: &TagMetadata,
    metadata: &RepositoryMetadata,
    report: ProbeReport,
    last_scan: DateTime<Utc>,
) -> ImageDescriptor {
    ImageDescriptor {
        repository: repository.to_owned(),
        tag: tag.tag.clone(),
        description: metadata.description.clone(),
        stars: metadata.stars,
        pulls: metadata.pulls,
        size: Some(tag.size_bytes),
        last_updated: tag.last_updated,
        distro: report.distro,
        softwares: report.softwares,
        last_scan,
    }
}
