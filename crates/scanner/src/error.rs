//! 스캐너 에러 타입
//!
//! [`ScannerError`]는 컨테이너 런타임, 레지스트리, 카탈로그, 브로커 호출에서
//! 발생하는 에러를 표현합니다. [`ScannerError::is_fatal`]은 협력자에 더 이상
//! 도달할 수 없어 워커가 멈춰야 하는 상황을 구분합니다.

use dofinder_broker::BrokerClientError;
use dofinder_core::error::{CatalogError, ConfigError, DofinderError, RuntimeError};
use dofinder_registry::RegistryClientError;

/// 스캐너 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    /// 런타임 소켓 연결 실패
    #[error("docker connection error: {0}")]
    DockerConnection(String),

    /// 런타임 API 호출 실패
    #[error("docker api error: {0}")]
    DockerApi(String),

    /// 컨테이너 또는 이미지 없음
    #[error("not found: {0}")]
    NotFound(String),

    /// 레지스트리 조회 실패
    #[error("registry error: {0}")]
    Registry(#[from] RegistryClientError),

    /// 카탈로그 또는 프로브 카탈로그 호출 실패
    #[error("catalog error: {0}")]
    Catalog(RegistryClientError),

    /// 브로커 에러
    #[error("broker error: {0}")]
    Broker(#[from] BrokerClientError),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl ScannerError {
    /// 협력자(런타임 소켓, 브로커)에 도달할 수 없어 처리를 멈춰야 하는지 여부
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::DockerConnection(_) => true,
            Self::Broker(e) => e.is_fatal(),
            _ => false,
        }
    }
}

impl From<ScannerError> for DofinderError {
    fn from(err: ScannerError) -> Self {
        match err {
            ScannerError::DockerConnection(msg) => {
                DofinderError::Runtime(RuntimeError::Connection(msg))
            }
            ScannerError::DockerApi(msg) => DofinderError::Runtime(RuntimeError::Api(msg)),
            ScannerError::NotFound(msg) => DofinderError::Runtime(RuntimeError::NotFound(msg)),
            ScannerError::Registry(e) => e.into(),
            ScannerError::Catalog(RegistryClientError::CatalogRejected { status, reason }) => {
                DofinderError::Catalog(CatalogError::Rejected { status, reason })
            }
            ScannerError::Catalog(e) => {
                DofinderError::Catalog(CatalogError::Unavailable(e.to_string()))
            }
            ScannerError::Broker(e) => e.into(),
            ScannerError::Config { field, reason } => {
                DofinderError::Config(ConfigError::InvalidValue { field, reason })
            }
        }
    }
}
