//! 레지스트리 크롤러
//!
//! [`Crawler::crawl`]은 시작 페이지부터 레지스트리 목록을 순회하며 선택 필터를
//! 통과한 저장소를 [`ImageSink`]로 하나씩 넘깁니다.
//!
//! # 종료 조건
//!
//! - `max_images`개를 넘겼을 때
//! - 레지스트리가 다음 페이지가 없다고 응답할 때
//! - 취소 토큰이 취소되었을 때 (진행 중인 항목 전달은 끝까지 완료)
//!
//! # 페이지 실패
//!
//! 페이지 하나의 읽기 실패는 경고 후 건너뜁니다. 연속 실패가
//! `max_page_failures`에 도달하면 [`CrawlerError::RegistryUnavailable`]로 중단합니다.
//! 저장소 하나의 태그 목록 읽기 실패는 필터 제외와 따로 `tag_failures`로 셉니다.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dofinder_broker::{MessageBroker, encode_image};
use dofinder_core::config::{CrawlerConfig, RegistryConfig};
use dofinder_core::metrics as m;
use dofinder_core::types::ImageReference;
use dofinder_registry::{RegistryClient, RegistryClientError, RepositoryPage};

use crate::error::CrawlerError;
use crate::filter::is_eligible;

/// 크롤링 범위
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlRequest {
    /// 시작 페이지 (1부터)
    pub from_page: u32,
    /// 페이지 크기
    pub page_size: u32,
    /// 최대 전달 이미지 수
    pub max_images: usize,
}

impl CrawlRequest {
    /// `[crawler]` 설정에서 생성합니다.
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            from_page: config.from_page,
            page_size: config.page_size,
            max_images: config.max_images,
        }
    }
}

/// 크롤링 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `max_images` 도달
    MaxImages,
    /// 레지스트리 목록 끝
    Exhausted,
    /// 외부 중단
    Cancelled,
}

/// 크롤링 결과 요약
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlSummary {
    /// 읽은 페이지 수
    pub pages_read: u32,
    /// 건너뛴 페이지 수
    pub pages_failed: u32,
    /// 필터에서 제외된 저장소 수
    pub rejected: usize,
    /// 태그 목록을 읽지 못해 건너뛴 저장소 수
    pub tag_failures: usize,
    /// 전달한 이미지 수
    pub published: usize,
    /// 다음에 읽을 페이지 (재시작 지점)
    pub next_page: u32,
    /// 종료 사유
    pub stop_reason: StopReason,
}

/// 크롤링 결과를 받는 쪽
///
/// `accept`가 반환되기 전에는 다음 항목이 전달되지 않습니다.
pub trait ImageSink: Send {
    /// 이미지 하나를 받습니다.
    fn accept(
        &mut self,
        image: ImageReference,
    ) -> impl Future<Output = Result<(), CrawlerError>> + Send;
}

/// 받은 이미지를 메모리에 모으는 sink
#[derive(Debug, Default)]
pub struct VecSink {
    /// 받은 순서대로 쌓인 이미지
    pub images: Vec<ImageReference>,
}

impl ImageSink for VecSink {
    async fn accept(&mut self, image: ImageReference) -> Result<(), CrawlerError> {
        self.images.push(image);
        Ok(())
    }
}

/// 받은 이미지를 디스커버리 메시지로 발행하는 sink
pub struct PublishSink<B> {
    broker: Arc<B>,
    route_key: String,
}

impl<B: MessageBroker> PublishSink<B> {
    /// `route_key`로 발행하는 sink를 생성합니다.
    pub fn new(broker: Arc<B>, route_key: impl Into<String>) -> Self {
        Self {
            broker,
            route_key: route_key.into(),
        }
    }
}

impl<B: MessageBroker> ImageSink for PublishSink<B> {
    async fn accept(&mut self, image: ImageReference) -> Result<(), CrawlerError> {
        let payload = encode_image(&image)?;
        self.broker.publish(&self.route_key, &payload).await?;
        metrics::counter!(m::CRAWLER_IMAGES_PUBLISHED_TOTAL).increment(1);
        debug!(repository = %image, route_key = %self.route_key, "image published");
        Ok(())
    }
}

/// 레지스트리 크롤러
pub struct Crawler<R> {
    registry: Arc<R>,
    canonical_tag: String,
    max_page_failures: u32,
}

impl<R: RegistryClient> Crawler<R> {
    /// `[registry]` 설정으로 크롤러를 생성합니다.
    pub fn new(registry: Arc<R>, config: &RegistryConfig) -> Self {
        Self {
            registry,
            canonical_tag: config.canonical_tag.clone(),
            max_page_failures: config.max_page_failures.max(1),
        }
    }

    /// 저장소 하나가 검사 대상인지 레지스트리에 질의합니다.
    ///
    /// 레지스트리에서 사라진 저장소는 대상이 아닙니다 (`Ok(false)`).
    /// 그 밖의 조회 실패는 에러로 돌려줍니다.
    pub async fn check_repository(&self, repository: &str) -> Result<bool, RegistryClientError> {
        match self.registry.list_tags(repository).await {
            Ok(tags) => Ok(is_eligible(&tags, &self.canonical_tag)),
            Err(RegistryClientError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// 크롤링을 실행합니다.
    pub async fn crawl<S: ImageSink>(
        &self,
        request: CrawlRequest,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<CrawlSummary, CrawlerError> {
        let mut summary = CrawlSummary {
            pages_read: 0,
            pages_failed: 0,
            rejected: 0,
            tag_failures: 0,
            published: 0,
            next_page: request.from_page.max(1),
            stop_reason: StopReason::Exhausted,
        };
        let mut yielded: HashSet<String> = HashSet::new();
        let mut consecutive_failures = 0u32;

        info!(
            from_page = summary.next_page,
            page_size = request.page_size,
            max_images = request.max_images,
            "crawl started"
        );

        'pages: loop {
            if summary.published >= request.max_images {
                summary.stop_reason = StopReason::MaxImages;
                break;
            }

            let page = summary.next_page;
            let listing = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    summary.stop_reason = StopReason::Cancelled;
                    break;
                }
                result = self.registry.list_repositories(page, request.page_size) => result,
            };

            let RepositoryPage { names, has_next } = match listing {
                Ok(listing) => {
                    consecutive_failures = 0;
                    summary.pages_read += 1;
                    listing
                }
                Err(e) => {
                    consecutive_failures += 1;
                    summary.pages_failed += 1;
                    summary.next_page = page.saturating_add(1);
                    metrics::counter!(m::CRAWLER_PAGE_FAILURES_TOTAL).increment(1);
                    warn!(page, consecutive_failures, error = %e, "registry page skipped");
                    if consecutive_failures >= self.max_page_failures {
                        return Err(CrawlerError::RegistryUnavailable {
                            failures: consecutive_failures,
                            page,
                            reason: e.to_string(),
                        });
                    }
                    continue;
                }
            };

            for repository in names {
                if summary.published >= request.max_images {
                    summary.stop_reason = StopReason::MaxImages;
                    break 'pages;
                }
                if cancel.is_cancelled() {
                    summary.stop_reason = StopReason::Cancelled;
                    break 'pages;
                }
                if yielded.contains(&repository) {
                    debug!(repository = %repository, "duplicate repository ignored");
                    continue;
                }

                match self.check_repository(&repository).await {
                    Ok(true) => {}
                    Ok(false) => {
                        summary.rejected += 1;
                        metrics::counter!(m::CRAWLER_REPOSITORIES_REJECTED_TOTAL).increment(1);
                        debug!(repository = %repository, "repository not eligible");
                        continue;
                    }
                    Err(e) => {
                        summary.tag_failures += 1;
                        metrics::counter!(m::CRAWLER_TAG_FAILURES_TOTAL).increment(1);
                        warn!(repository = %repository, error = %e, "tag listing failed, repository skipped");
                        continue;
                    }
                }

                sink.accept(ImageReference::new(repository.clone())).await?;
                debug!(repository = %repository, page, "repository selected");
                yielded.insert(repository);
                summary.published += 1;
            }

            summary.next_page = page.saturating_add(1);
            if !has_next {
                summary.stop_reason = StopReason::Exhausted;
                break;
            }
        }

        info!(
            published = summary.published,
            rejected = summary.rejected,
            tag_failures = summary.tag_failures,
            pages_read = summary.pages_read,
            pages_failed = summary.pages_failed,
            next_page = summary.next_page,
            stop_reason = ?summary.stop_reason,
            "crawl finished"
        );
        Ok(summary)
    }
}
