//! 에러 타입 — 도메인별 에러 정의
//!
//! 각 크레이트는 자체 에러 enum을 갖고 `From<..> for DofinderError`를 구현하여
//! 상위 레이어에서 `?` 연산자로 전파합니다.

/// dofinder 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum DofinderError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 레지스트리 에러
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// 컨테이너 런타임 에러
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// 카탈로그 서비스 에러
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// 메시지 브로커 에러
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 이미지 레지스트리 에러
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// 레지스트리 접근 불가 (네트워크 오류, rate limit 등)
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    /// 저장소 또는 태그가 존재하지 않음
    #[error("not found: {0}")]
    NotFound(String),

    /// 응답 형식 오류
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// 컨테이너 런타임 에러
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// 런타임 소켓 연결 실패 (프로세스 치명적)
    #[error("runtime connection failed: {0}")]
    Connection(String),

    /// API 호출 실패
    #[error("runtime api error: {0}")]
    Api(String),

    /// 컨테이너 또는 이미지 없음
    #[error("not found: {0}")]
    NotFound(String),
}

/// 카탈로그 서비스 에러
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// 카탈로그 서비스 접근 불가
    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    /// 카탈로그가 요청을 거부함
    #[error("catalog rejected request ({status}): {reason}")]
    Rejected { status: u16, reason: String },
}

/// 메시지 브로커 에러
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// 브로커 연결 불가 (프로세스 치명적)
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// 메시지 발행 실패
    #[error("publish failed: {0}")]
    Publish(String),

    /// 메시지 디코딩 실패
    #[error("malformed message: {0}")]
    Decode(String),
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,
}
