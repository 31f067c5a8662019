//! dofinder 공통 크레이트
//!
//! 레지스트리 크롤러와 이미지 스캐너가 공유하는 도메인 타입, 에러,
//! 설정, 생명주기 trait, 이벤트, 메트릭 이름을 정의합니다.
//!
//! ```text
//! RegistryClient --> Crawler --> MessageBroker --> ScanWorkerPool --> CatalogClient
//!                                                      |
//!                                              VersionProbeEngine
//!                                                      |
//!                                               ContainerRuntime
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{
    BrokerError, CatalogError, ConfigError, DofinderError, PipelineError, RegistryError,
    RuntimeError,
};

// 설정
pub use config::DofinderConfig;

// 이벤트
pub use event::{ScanEvent, ScanOutcome};

// 파이프라인 trait
pub use pipeline::{HealthStatus, Pipeline};

// 도메인 타입
pub use types::{
    ImageDescriptor, ImageReference, ProbeKind, ProbeSpec, RepositoryMetadata, ScanAction,
    ScanDecision, SoftwareFinding, TagMetadata, plan_scan,
};
