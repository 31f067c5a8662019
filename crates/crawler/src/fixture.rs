//! 테스트 픽스처 생성 및 재발행
//!
//! `build_fixture`는 검사 대상 이미지 N개를 크롤링해 파일로 저장하고,
//! `push_fixture`는 그 파일을 테스트 라우팅 키로 다시 발행합니다.

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::info;

use dofinder_broker::{MessageBroker, encode_image, load_fixture, save_fixture};
use dofinder_registry::RegistryClient;

use crate::crawler::{CrawlRequest, CrawlSummary, Crawler, VecSink};
use crate::error::CrawlerError;

/// 크롤링 결과를 픽스처 파일로 저장합니다.
pub async fn build_fixture<R: RegistryClient>(
    crawler: &Crawler<R>,
    request: CrawlRequest,
    path: impl AsRef<Path>,
    cancel: &CancellationToken,
) -> Result<CrawlSummary, CrawlerError> {
    let mut sink = VecSink::default();
    let summary = crawler.crawl(request, &mut sink, cancel).await?;
    save_fixture(path, &sink.images).await?;
    Ok(summary)
}

/// 픽스처 파일의 모든 항목을 `route_key`로 발행하고 발행 수를 돌려줍니다.
///
/// 취소되면 이미 발행한 수까지만 돌려줍니다.
pub async fn push_fixture<B: MessageBroker>(
    broker: &B,
    path: impl AsRef<Path>,
    route_key: &str,
    cancel: &CancellationToken,
) -> Result<usize, CrawlerError> {
    let path = path.as_ref();
    let images = load_fixture(path).await?;

    let mut pushed = 0usize;
    for image in &images {
        if cancel.is_cancelled() {
            break;
        }
        broker.publish(route_key, &encode_image(image)?).await?;
        pushed += 1;
    }

    info!(path = %path.display(), route_key, pushed, total = images.len(), "fixture pushed");
    Ok(pushed)
}
