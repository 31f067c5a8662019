//! 도메인 타입 — 크롤러와 스캐너가 공유하는 데이터 구조
//!
//! 카탈로그 서비스와 주고받는 JSON 필드명(`repo_name`, `ver` 등)은
//! serde 속성으로 고정되어 있으며, Rust 필드명과 다를 수 있습니다.

use std::fmt;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// 기본 대표 태그
pub const DEFAULT_CANONICAL_TAG: &str = "latest";

/// 검사 대상 이미지 저장소 참조 (태그 없음)
///
/// 디스커버리 메시지의 와이어 형식은 `{"name": "<repository>"}` 입니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    /// 레지스트리 저장소 이름 (예: `"acme/tool"`, `"nginx"`)
    #[serde(rename = "name")]
    pub repository: String,
}

impl ImageReference {
    /// 새 참조를 생성합니다.
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repository)
    }
}

/// 태그 메타데이터
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMetadata {
    /// 태그 이름
    pub tag: String,
    /// 압축 이미지 전체 크기 (바이트)
    pub size_bytes: i64,
    /// 레지스트리상의 마지막 갱신 시각
    pub last_updated: Option<DateTime<Utc>>,
}

impl TagMetadata {
    /// 크기가 0보다 큰지 여부. 크기가 0인 태그는 검사 대상이 아닙니다.
    pub fn has_content(&self) -> bool {
        self.size_bytes > 0
    }
}

/// 저장소 메타데이터
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    /// 저장소 설명
    pub description: Option<String>,
    /// 별 개수
    pub stars: Option<u64>,
    /// 풀 횟수
    pub pulls: Option<u64>,
}

/// 프로브 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// 배포판 판별 프로브
    System,
    /// 소프트웨어 버전 프로브
    Software,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Software => write!(f, "software"),
        }
    }
}

/// 프로브 정의 — 명령 템플릿과 추출 패턴의 쌍
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSpec {
    /// 프로브 종류
    pub kind: ProbeKind,
    /// 소프트웨어 이름 (시스템 프로브는 식별용 이름)
    pub name: String,
    /// 명령 템플릿 (예: `"--version"`, `"cat /etc/os-release"`)
    pub command_template: String,
    /// 버전/배포판 추출 정규식
    pub pattern: String,
}

impl ProbeSpec {
    /// 시스템 프로브를 생성합니다.
    pub fn system(
        name: impl Into<String>,
        command_template: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            kind: ProbeKind::System,
            name: name.into(),
            command_template: command_template.into(),
            pattern: pattern.into(),
        }
    }

    /// 소프트웨어 프로브를 생성합니다.
    pub fn software(
        name: impl Into<String>,
        command_template: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            kind: ProbeKind::Software,
            name: name.into(),
            command_template: command_template.into(),
            pattern: pattern.into(),
        }
    }

    /// 컨테이너에서 실행할 전체 명령 문자열을 만듭니다.
    ///
    /// 소프트웨어 프로브는 `"<name> <template>"`, 시스템 프로브는 템플릿 그대로입니다.
    pub fn command(&self) -> String {
        match self.kind {
            ProbeKind::Software => format!("{} {}", self.name, self.command_template),
            ProbeKind::System => self.command_template.clone(),
        }
    }

    /// 명령 문자열을 셸 규칙(따옴표, 이스케이프)으로 나눈 컨테이너 entrypoint.
    ///
    /// 따옴표가 닫히지 않았거나 결과가 비어 있으면 `None`.
    pub fn entrypoint(&self) -> Option<Vec<String>> {
        shlex::split(&self.command()).filter(|argv| !argv.is_empty())
    }

    /// 추출 패턴을 컴파일합니다.
    pub fn compile(&self) -> Result<Regex, regex::Error> {
        Regex::new(&self.pattern)
    }
}

/// 소프트웨어 프로브 결과
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SoftwareFinding {
    /// 소프트웨어 이름
    pub software: String,
    /// 추출된 버전 문자열
    #[serde(rename = "ver")]
    pub version: String,
}

impl SoftwareFinding {
    /// 새 결과를 생성합니다.
    pub fn new(software: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            software: software.into(),
            version: version.into(),
        }
    }
}

/// 카탈로그에 제출되는 이미지 기술자
///
/// 제출 이후에는 변경하지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    /// 저장소 이름
    #[serde(rename = "repo_name")]
    pub repository: String,
    /// 검사한 태그
    pub tag: String,
    /// 저장소 설명
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 별 개수
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stars: Option<u64>,
    /// 풀 횟수
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulls: Option<u64>,
    /// 태그 크기 (바이트)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    /// 태그의 레지스트리 갱신 시각
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    /// 배포판 레이블
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distro: Option<String>,
    /// 발견된 소프트웨어 (이름 중복 없음)
    #[serde(default)]
    pub softwares: Vec<SoftwareFinding>,
    /// 스캔 완료 시각
    pub last_scan: DateTime<Utc>,
}

impl ImageDescriptor {
    /// `last_scan`을 제외한 내용이 같은지 비교합니다.
    pub fn same_content(&self, other: &Self) -> bool {
        self.repository == other.repository
            && self.tag == other.tag
            && self.description == other.description
            && self.stars == other.stars
            && self.pulls == other.pulls
            && self.size == other.size
            && self.last_updated == other.last_updated
            && self.distro == other.distro
            && self.softwares == other.softwares
    }

    /// 소프트웨어 이름으로 버전을 조회합니다.
    pub fn version_of(&self, software: &str) -> Option<&str> {
        self.softwares
            .iter()
            .find(|s| s.software == software)
            .map(|s| s.version.as_str())
    }
}

/// 카탈로그 상태로부터 도출한 스캔 판단
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanDecision {
    /// 카탈로그에 기록 없음
    New,
    /// 기록이 있으나 최신이 아님
    NeedsRescan,
    /// 기록이 최신
    UpToDate,
}

impl ScanDecision {
    /// 카탈로그 질의 결과로 판단을 만듭니다.
    ///
    /// `is_new`가 참이면 `must_rescan`은 보지 않습니다.
    pub fn from_catalog(is_new: bool, must_rescan: bool) -> Self {
        if is_new {
            Self::New
        } else if must_rescan {
            Self::NeedsRescan
        } else {
            Self::UpToDate
        }
    }

    /// 메트릭 레이블용 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::NeedsRescan => "needs_rescan",
            Self::UpToDate => "up_to_date",
        }
    }
}

impl fmt::Display for ScanDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 스캔 판단에 따른 실제 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanAction {
    /// 처리하지 않음
    Discard,
    /// 스캔 후 카탈로그에 생성
    Create,
    /// 스캔 후 카탈로그 갱신
    Update,
}

/// 스캔 판단표
///
/// | 태그 존재 | 카탈로그 상태 | 동작 |
/// |-----------|---------------|------|
/// | false     | (any)         | Discard |
/// | true      | New           | Create |
/// | true      | NeedsRescan   | Update |
/// | true      | UpToDate      | Discard |
pub fn plan_scan(tag_present: bool, decision: ScanDecision) -> ScanAction {
    if !tag_present {
        return ScanAction::Discard;
    }
    match decision {
        ScanDecision::New => ScanAction::Create,
        ScanDecision::NeedsRescan => ScanAction::Update,
        ScanDecision::UpToDate => ScanAction::Discard,
    }
}
