//! # dofinder-scanner
//!
//! 디스커버리 메시지를 받아 이미지를 검사하고 카탈로그에 기록합니다.
//!
//! ```text
//! MessageConsumer ──▶ ScanWorkerPool ──▶ ImageScanner ──▶ CatalogClient
//!                                            │
//!                                     VersionProbeEngine
//!                                            │
//!                                     ContainerRuntime (bollard)
//! ```
//!
//! - [`docker`]: 컨테이너 런타임 추상화와 bollard 구현
//! - [`probe`]: 일회용 컨테이너로 버전/배포판을 추출하는 프로브 엔진
//! - [`descriptor`]: 이미지 기술자 조립
//! - [`scanner`]: 메시지 하나의 처리 상태 기계
//! - [`pool`]: N개 워커와 확인 정책

pub mod config;
pub mod descriptor;
pub mod docker;
pub mod error;
pub mod pool;
pub mod probe;
pub mod scanner;

pub use config::ScanPoolConfig;
pub use descriptor::assemble_descriptor;
pub use docker::{BollardRuntime, ContainerRuntime};
pub use error::ScannerError;
pub use pool::{ScanWorkerPool, ScanWorkerPoolBuilder};
pub use probe::{ProbeReport, VersionProbeEngine, extract_version};
pub use scanner::{ImageScanner, ScanHandler};
