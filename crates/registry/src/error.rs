//! 레지스트리 클라이언트 에러 타입
//!
//! [`RegistryClientError`]는 레지스트리, 카탈로그, 프로브 카탈로그 HTTP 호출에서
//! 발생하는 에러를 표현합니다. `From<RegistryClientError> for DofinderError` 변환으로
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use dofinder_core::error::{CatalogError, ConfigError, DofinderError, RegistryError};

/// 레지스트리 클라이언트 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum RegistryClientError {
    /// 네트워크 전송 실패 (연결 거부, 타임아웃 등)
    #[error("http transport error: {0}")]
    Transport(String),

    /// 예상하지 못한 HTTP 상태 코드
    #[error("unexpected status {status} from {url}")]
    Status {
        /// 요청 URL
        url: String,
        /// HTTP 상태 코드
        status: u16,
    },

    /// 저장소 또는 태그가 존재하지 않음 (404)
    #[error("not found: {0}")]
    NotFound(String),

    /// 응답 본문 디코딩 실패
    #[error("invalid response from {url}: {reason}")]
    Decode {
        /// 요청 URL
        url: String,
        /// 디코딩 실패 사유
        reason: String,
    },

    /// 카탈로그 서비스 접근 불가
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// 카탈로그가 제출을 거부함
    #[error("catalog rejected request ({status}): {reason}")]
    CatalogRejected {
        /// HTTP 상태 코드
        status: u16,
        /// 응답 본문 또는 사유
        reason: String,
    },

    /// 프로브 목록 파일 로딩 실패
    #[error("probe file error: {path}: {reason}")]
    ProbeFile {
        /// 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 프로브 정의가 유효하지 않음
    #[error("invalid probe '{name}': {reason}")]
    InvalidProbe {
        /// 프로브 이름
        name: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl RegistryClientError {
    /// 같은 요청을 나중에 다시 시도하면 성공할 수 있는 에러인지 여부
    ///
    /// 전송 실패, 429, 5xx 응답이 해당합니다.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::CatalogUnavailable(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<RegistryClientError> for DofinderError {
    fn from(err: RegistryClientError) -> Self {
        match err {
            RegistryClientError::Transport(msg) => {
                DofinderError::Registry(RegistryError::Unavailable(msg))
            }
            status @ RegistryClientError::Status { .. } if status.is_transient() => {
                DofinderError::Registry(RegistryError::Unavailable(status.to_string()))
            }
            status @ RegistryClientError::Status { .. } => {
                DofinderError::Registry(RegistryError::InvalidResponse(status.to_string()))
            }
            RegistryClientError::NotFound(what) => {
                DofinderError::Registry(RegistryError::NotFound(what))
            }
            decode @ RegistryClientError::Decode { .. } => {
                DofinderError::Registry(RegistryError::InvalidResponse(decode.to_string()))
            }
            RegistryClientError::CatalogUnavailable(msg) => {
                DofinderError::Catalog(CatalogError::Unavailable(msg))
            }
            RegistryClientError::CatalogRejected { status, reason } => {
                DofinderError::Catalog(CatalogError::Rejected { status, reason })
            }
            RegistryClientError::ProbeFile { path, reason } => {
                DofinderError::Config(ConfigError::InvalidValue {
                    field: "catalog.probes_file".to_owned(),
                    reason: format!("{path}: {reason}"),
                })
            }
            RegistryClientError::InvalidProbe { name, reason } => {
                DofinderError::Config(ConfigError::InvalidValue {
                    field: format!("probe.{name}"),
                    reason,
                })
            }
            RegistryClientError::Config { field, reason } => {
                DofinderError::Config(ConfigError::InvalidValue { field, reason })
            }
        }
    }
}
