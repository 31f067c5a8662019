//! # dofinder-crawler
//!
//! 레지스트리를 페이지 단위로 순회하여 검사 대상 이미지를 고르고
//! 디스커버리 토픽으로 발행합니다.
//!
//! ```text
//! RegistryClient ──▶ Crawler ──(is_eligible)──▶ ImageSink ──▶ MessageBroker
//! ```

pub mod crawler;
pub mod error;
pub mod filter;
pub mod fixture;

pub use crawler::{CrawlRequest, CrawlSummary, Crawler, ImageSink, PublishSink, StopReason, VecSink};
pub use error::CrawlerError;
pub use filter::{canonical_tag, is_eligible};
pub use fixture::{build_fixture, push_fixture};
