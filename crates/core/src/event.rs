//! 스캔 이벤트 — 스캐너 처리 결과를 하위 소비자에게 전달
//!
//! 워커 풀은 처리한 디스커버리 메시지마다 정확히 하나의 [`ScanEvent`]를 발행합니다.
//! 실패도 이벤트로 표현되며, 카탈로그에는 부분 기록이 남지 않습니다.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::types::ImageDescriptor;

/// 스캐너 모듈명
pub const MODULE_SCANNER: &str = "scanner";
/// 크롤러 모듈명
pub const MODULE_CRAWLER: &str = "crawler";

/// 처리하지 않은 이유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscardReason {
    /// 대표 태그가 더 이상 존재하지 않음
    TagMissing,
    /// 카탈로그 기록이 최신
    UpToDate,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TagMissing => write!(f, "tag_missing"),
            Self::UpToDate => write!(f, "up_to_date"),
        }
    }
}

/// 디스커버리 메시지 하나의 최종 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanOutcome {
    /// 새 기술자를 카탈로그에 생성함
    Created(ImageDescriptor),
    /// 기존 기술자를 갱신함
    Updated(ImageDescriptor),
    /// 스캔하지 않음
    Discarded(DiscardReason),
    /// 스캔 또는 제출 실패
    Failed(String),
}

impl ScanOutcome {
    /// 메트릭 레이블용 이름
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Updated(_) => "updated",
            Self::Discarded(_) => "discarded",
            Self::Failed(_) => "failed",
        }
    }

    /// 카탈로그에 제출된 기술자
    pub fn descriptor(&self) -> Option<&ImageDescriptor> {
        match self {
            Self::Created(d) | Self::Updated(d) => Some(d),
            Self::Discarded(_) | Self::Failed(_) => None,
        }
    }
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created(d) => write!(f, "created {}:{}", d.repository, d.tag),
            Self::Updated(d) => write!(f, "updated {}:{}", d.repository, d.tag),
            Self::Discarded(reason) => write!(f, "discarded ({reason})"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// 스캔 결과 이벤트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEvent {
    /// 이벤트 ID
    pub id: String,
    /// 분산 추적 ID (메시지 단위)
    pub trace_id: String,
    /// 발생 시각
    pub timestamp: SystemTime,
    /// 대상 저장소
    pub repository: String,
    /// 처리 결과
    pub outcome: ScanOutcome,
}

impl ScanEvent {
    /// 새 trace_id로 이벤트를 생성합니다.
    pub fn new(repository: impl Into<String>, outcome: ScanOutcome) -> Self {
        Self::with_trace(repository, outcome, uuid::Uuid::new_v4().to_string())
    }

    /// 기존 trace_id를 유지하여 이벤트를 생성합니다.
    pub fn with_trace(
        repository: impl Into<String>,
        outcome: ScanOutcome,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            trace_id: trace_id.into(),
            timestamp: SystemTime::now(),
            repository: repository.into(),
            outcome,
        }
    }

    /// 실패 이벤트인지 여부
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, ScanOutcome::Failed(_))
    }
}

impl fmt::Display for ScanEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.trace_id, self.repository, self.outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_event_has_distinct_ids() {
        let event = ScanEvent::new("nginx", ScanOutcome::Discarded(DiscardReason::UpToDate));
        assert_ne!(event.id, event.trace_id);
        assert!(!event.is_failure());
    }

    #[test]
    fn with_trace_keeps_trace_id() {
        let event = ScanEvent::with_trace(
            "nginx",
            ScanOutcome::Failed("catalog unavailable".to_owned()),
            "trace-1",
        );
        assert_eq!(event.trace_id, "trace-1");
        assert!(event.is_failure());
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(
            ScanOutcome::Discarded(DiscardReason::TagMissing).label(),
            "discarded"
        );
        assert_eq!(ScanOutcome::Failed(String::new()).label(), "failed");
    }

    #[test]
    fn display_includes_reason() {
        let event = ScanEvent::with_trace(
            "acme/tool",
            ScanOutcome::Discarded(DiscardReason::TagMissing),
            "t",
        );
        let text = event.to_string();
        assert!(text.contains("acme/tool"));
        assert!(text.contains("tag_missing"));
    }
}
