//! 크롤러 통합 테스트 (mock 레지스트리 + 인메모리 브로커)

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use dofinder_broker::{InMemoryBroker, MessageBroker, Topology, decode_image};
use dofinder_core::config::{BrokerConfig, RegistryConfig};
use dofinder_core::types::{RepositoryMetadata, TagMetadata};
use dofinder_crawler::{
    CrawlRequest, Crawler, CrawlerError, ImageSink, PublishSink, StopReason, VecSink,
    build_fixture, push_fixture,
};
use dofinder_registry::{RegistryClient, RegistryClientError, RepositoryPage};

/// 페이지별 저장소 목록과 저장소별 태그를 돌려주는 mock 레지스트리
#[derive(Default)]
struct MockRegistry {
    pages: Vec<Vec<String>>,
    tags: HashMap<String, Vec<TagMetadata>>,
    failing_pages: HashSet<u32>,
    failing_tags: HashSet<String>,
    page_calls: AtomicU32,
}

impl MockRegistry {
    fn with_page(mut self, names: &[&str]) -> Self {
        self.pages
            .push(names.iter().map(|n| (*n).to_owned()).collect());
        self
    }

    fn with_tag(mut self, repository: &str, tag: &str, size: i64) -> Self {
        self.tags
            .entry(repository.to_owned())
            .or_default()
            .push(TagMetadata {
                tag: tag.to_owned(),
                size_bytes: size,
                last_updated: None,
            });
        self
    }

    fn with_failing_page(mut self, page: u32) -> Self {
        self.failing_pages.insert(page);
        self
    }

    fn with_failing_tags(mut self, repository: &str) -> Self {
        self.failing_tags.insert(repository.to_owned());
        self
    }
}

impl RegistryClient for MockRegistry {
    async fn list_repositories(
        &self,
        page: u32,
        _page_size: u32,
    ) -> Result<RepositoryPage, RegistryClientError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_pages.contains(&page) {
            return Err(RegistryClientError::Transport(format!("page {page} timed out")));
        }
        let index = (page - 1) as usize;
        let names = self.pages.get(index).cloned().unwrap_or_default();
        Ok(RepositoryPage {
            has_next: index + 1 < self.pages.len(),
            names,
        })
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<TagMetadata>, RegistryClientError> {
        if self.failing_tags.contains(repository) {
            return Err(RegistryClientError::Status {
                url: format!("/v2/repositories/{repository}/tags/"),
                status: 503,
            });
        }
        self.tags
            .get(repository)
            .cloned()
            .ok_or_else(|| RegistryClientError::NotFound(repository.to_owned()))
    }

    async fn tag_metadata(
        &self,
        repository: &str,
        tag: &str,
    ) -> Result<TagMetadata, RegistryClientError> {
        self.list_tags(repository)
            .await?
            .into_iter()
            .find(|t| t.tag == tag)
            .ok_or_else(|| RegistryClientError::NotFound(format!("{repository}:{tag}")))
    }

    async fn repository_metadata(
        &self,
        _repository: &str,
    ) -> Result<RepositoryMetadata, RegistryClientError> {
        Ok(RepositoryMetadata::default())
    }
}

fn crawler(registry: MockRegistry) -> Crawler<MockRegistry> {
    Crawler::new(Arc::new(registry), &RegistryConfig::default())
}

fn request(max_images: usize) -> CrawlRequest {
    CrawlRequest {
        from_page: 1,
        page_size: 10,
        max_images,
    }
}

fn names(sink: &VecSink) -> Vec<&str> {
    sink.images.iter().map(|i| i.repository.as_str()).collect()
}

#[tokio::test]
async fn only_eligible_repositories_are_yielded() {
    let registry = MockRegistry::default()
        .with_page(&["nginx", "empty/latest", "old/only", "acme/tool"])
        .with_tag("nginx", "latest", 100)
        .with_tag("empty/latest", "latest", 0)
        .with_tag("old/only", "1.0", 10)
        .with_tag("acme/tool", "latest", 12345);

    let mut sink = VecSink::default();
    let summary = crawler(registry)
        .crawl(request(100), &mut sink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(names(&sink), vec!["nginx", "acme/tool"]);
    assert_eq!(summary.rejected, 2);
    assert_eq!(summary.stop_reason, StopReason::Exhausted);
}

#[tokio::test]
async fn tag_read_failures_are_not_counted_as_rejections() {
    let registry = MockRegistry::default()
        .with_page(&["nginx", "flaky/one", "gone/repo", "old/only"])
        .with_tag("nginx", "latest", 100)
        .with_tag("old/only", "1.0", 10)
        .with_failing_tags("flaky/one");

    let mut sink = VecSink::default();
    let summary = crawler(registry)
        .crawl(request(100), &mut sink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(names(&sink), vec!["nginx"]);
    // gone/repo는 404라 일반 제외
    assert_eq!(summary.rejected, 2);
    assert_eq!(summary.tag_failures, 1);
}

#[tokio::test]
async fn max_images_bounds_the_crawl() {
    let registry = MockRegistry::default()
        .with_page(&["a", "b"])
        .with_page(&["c", "d"])
        .with_tag("a", "latest", 1)
        .with_tag("b", "latest", 1)
        .with_tag("c", "latest", 1)
        .with_tag("d", "latest", 1);

    let mut sink = VecSink::default();
    let summary = crawler(registry)
        .crawl(request(3), &mut sink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(names(&sink), vec!["a", "b", "c"]);
    assert_eq!(summary.published, 3);
    assert_eq!(summary.stop_reason, StopReason::MaxImages);
}

#[tokio::test]
async fn repositories_are_not_revisited_within_a_run() {
    let registry = MockRegistry::default()
        .with_page(&["a", "b"])
        .with_page(&["b", "a", "c"])
        .with_tag("a", "latest", 1)
        .with_tag("b", "latest", 1)
        .with_tag("c", "latest", 1);

    let mut sink = VecSink::default();
    crawler(registry)
        .crawl(request(100), &mut sink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(names(&sink), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn crawl_restarts_from_requested_page() {
    let registry = MockRegistry::default()
        .with_page(&["a"])
        .with_page(&["b"])
        .with_tag("a", "latest", 1)
        .with_tag("b", "latest", 1);

    let mut sink = VecSink::default();
    let summary = crawler(registry)
        .crawl(
            CrawlRequest {
                from_page: 2,
                ..request(10)
            },
            &mut sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(names(&sink), vec!["b"]);
    assert_eq!(summary.next_page, 3);
}

#[tokio::test]
async fn single_failing_page_is_skipped() {
    let registry = MockRegistry::default()
        .with_page(&["a"])
        .with_page(&["lost"])
        .with_page(&["c"])
        .with_tag("a", "latest", 1)
        .with_tag("lost", "latest", 1)
        .with_tag("c", "latest", 1)
        .with_failing_page(2);

    let mut sink = VecSink::default();
    let summary = crawler(registry)
        .crawl(request(10), &mut sink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(names(&sink), vec!["a", "c"]);
    assert_eq!(summary.pages_failed, 1);
}

#[tokio::test]
async fn repeated_page_failures_abort_the_crawl() {
    let registry = MockRegistry::default()
        .with_page(&["a"])
        .with_page(&["b"])
        .with_page(&["c"])
        .with_page(&["d"])
        .with_failing_page(1)
        .with_failing_page(2)
        .with_failing_page(3);

    let mut sink = VecSink::default();
    let err = crawler(registry)
        .crawl(request(10), &mut sink, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CrawlerError::RegistryUnavailable {
            failures: 3,
            page: 3,
            ..
        }
    ));
    assert!(sink.images.is_empty());
}

#[tokio::test]
async fn cancelled_crawl_reads_nothing() {
    let registry = Arc::new(MockRegistry::default().with_page(&["a"]).with_tag("a", "latest", 1));
    let crawler = Crawler::new(Arc::clone(&registry), &RegistryConfig::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut sink = VecSink::default();
    let summary = crawler.crawl(request(10), &mut sink, &cancel).await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::Cancelled);
    assert!(sink.images.is_empty());
    assert_eq!(registry.page_calls.load(Ordering::SeqCst), 0);
}

/// 두 번째 항목을 받은 직후 취소하는 sink
struct CancellingSink {
    cancel: CancellationToken,
    received: Arc<Mutex<Vec<String>>>,
}

impl ImageSink for CancellingSink {
    async fn accept(
        &mut self,
        image: dofinder_core::types::ImageReference,
    ) -> Result<(), CrawlerError> {
        let mut received = self.received.lock().unwrap();
        received.push(image.repository);
        if received.len() == 2 {
            self.cancel.cancel();
        }
        Ok(())
    }
}

#[tokio::test]
async fn cancellation_stops_after_current_item() {
    let registry = MockRegistry::default()
        .with_page(&["a", "b", "c"])
        .with_tag("a", "latest", 1)
        .with_tag("b", "latest", 1)
        .with_tag("c", "latest", 1);

    let cancel = CancellationToken::new();
    let received = Arc::new(Mutex::new(Vec::new()));
    let mut sink = CancellingSink {
        cancel: cancel.clone(),
        received: Arc::clone(&received),
    };
    let summary = crawler(registry)
        .crawl(request(10), &mut sink, &cancel)
        .await
        .unwrap();

    assert_eq!(summary.stop_reason, StopReason::Cancelled);
    assert_eq!(summary.published, 2);
    assert_eq!(*received.lock().unwrap(), vec!["a", "b"]);
}

#[tokio::test]
async fn publish_sink_emits_discovery_messages() {
    let registry = MockRegistry::default()
        .with_page(&["acme/tool"])
        .with_tag("acme/tool", "latest", 12345);
    let broker = Arc::new(InMemoryBroker::new(Topology::from_config(
        &BrokerConfig::default(),
    )));

    let mut sink = PublishSink::new(Arc::clone(&broker), "images.scan");
    crawler(registry)
        .crawl(request(10), &mut sink, &CancellationToken::new())
        .await
        .unwrap();

    let messages = broker.drain("images").await.unwrap();
    assert_eq!(messages, vec![br#"{"name":"acme/tool"}"#.to_vec()]);
}

#[tokio::test]
async fn fixture_build_then_push_targets_test_queue() {
    let registry = MockRegistry::default()
        .with_page(&["a", "b", "c"])
        .with_tag("a", "latest", 1)
        .with_tag("b", "latest", 1)
        .with_tag("c", "latest", 0);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("images.test.json");
    let cancel = CancellationToken::new();

    let summary = build_fixture(&crawler(registry), request(5), &path, &cancel)
        .await
        .unwrap();
    assert_eq!(summary.published, 2);

    let broker = InMemoryBroker::new(Topology::from_config(&BrokerConfig::default()));
    let pushed = push_fixture(&broker, &path, "images.test", &cancel)
        .await
        .unwrap();
    assert_eq!(pushed, 2);

    let replayed: Vec<String> = broker
        .drain("test")
        .await
        .unwrap()
        .iter()
        .map(|p| decode_image(p).unwrap().repository)
        .collect();
    assert_eq!(replayed, vec!["a", "b"]);
    assert!(broker.drain("images").await.unwrap().is_empty());
    broker.close().await.unwrap();
}
