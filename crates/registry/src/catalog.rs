//! Catalog service client.
//!
//! The catalog owns the freshness predicate: it answers whether a repository
//! is unknown (`is_new`) or stale (`must_rescan`) and stores the descriptors
//! the scanner submits.
//!
//! # HTTP contract
//!
//! ```text
//! GET  {images_url}/new?repo=<repository>     -> {"new": bool}
//! GET  {images_url}/rescan?repo=<repository>  -> {"rescan": bool}
//! POST {images_url}                           <- ImageDescriptor (create)
//! PUT  {images_url}                           <- ImageDescriptor (update)
//! ```

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use dofinder_core::config::CatalogConfig;
use dofinder_core::types::{ImageDescriptor, ScanDecision};

use crate::error::RegistryClientError;

/// Catalog operations used by the scanner.
pub trait CatalogClient: Send + Sync + 'static {
    /// Whether the catalog has no record for `repository`.
    fn is_new(
        &self,
        repository: &str,
    ) -> impl Future<Output = Result<bool, RegistryClientError>> + Send;

    /// Whether an existing record is stale and must be rescanned.
    fn must_rescan(
        &self,
        repository: &str,
    ) -> impl Future<Output = Result<bool, RegistryClientError>> + Send;

    /// Stores a descriptor for a new repository.
    fn create(
        &self,
        descriptor: &ImageDescriptor,
    ) -> impl Future<Output = Result<(), RegistryClientError>> + Send;

    /// Replaces the descriptor of a known repository.
    fn update(
        &self,
        descriptor: &ImageDescriptor,
    ) -> impl Future<Output = Result<(), RegistryClientError>> + Send;
}

/// Derives the [`ScanDecision`] for a repository.
///
/// `must_rescan` is only queried for repositories the catalog already knows.
pub async fn scan_decision<C: CatalogClient>(
    catalog: &C,
    repository: &str,
) -> Result<ScanDecision, RegistryClientError> {
    if catalog.is_new(repository).await? {
        return Ok(ScanDecision::New);
    }
    let must_rescan = catalog.must_rescan(repository).await?;
    Ok(ScanDecision::from_catalog(false, must_rescan))
}

#[derive(Debug, Deserialize)]
struct NewAnswer {
    new: bool,
}

#[derive(Debug, Deserialize)]
struct RescanAnswer {
    rescan: bool,
}

/// HTTP catalog client.
pub struct HttpCatalogClient {
    http: reqwest::Client,
    images_url: String,
}

impl HttpCatalogClient {
    /// Builds a client from the `[catalog]` config section.
    pub fn new(config: &CatalogConfig, timeout: Duration) -> Result<Self, RegistryClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryClientError::Config {
                field: "catalog".to_owned(),
                reason: format!("failed to build http client: {e}"),
            })?;
        Ok(Self {
            http,
            images_url: config.images_url.trim_end_matches('/').to_owned(),
        })
    }

    async fn query<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        repository: &str,
    ) -> Result<T, RegistryClientError> {
        let url = format!("{}/{endpoint}", self.images_url);
        let response = self
            .http
            .get(&url)
            .query(&[("repo", repository)])
            .send()
            .await
            .map_err(|e| RegistryClientError::CatalogUnavailable(format!("GET {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryClientError::Status {
                url,
                status: status.as_u16(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| RegistryClientError::Decode {
                url,
                reason: e.to_string(),
            })
    }

    async fn submit(
        &self,
        method: reqwest::Method,
        descriptor: &ImageDescriptor,
    ) -> Result<(), RegistryClientError> {
        let response = self
            .http
            .request(method.clone(), &self.images_url)
            .json(descriptor)
            .send()
            .await
            .map_err(|e| {
                RegistryClientError::CatalogUnavailable(format!(
                    "{method} {}: {e}",
                    self.images_url
                ))
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(RegistryClientError::CatalogUnavailable(format!(
                "{method} {} returned {status}",
                self.images_url
            )));
        }
        if !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            return Err(RegistryClientError::CatalogRejected {
                status: status.as_u16(),
                reason,
            });
        }

        debug!(repository = %descriptor.repository, %method, "descriptor submitted");
        Ok(())
    }
}

impl CatalogClient for HttpCatalogClient {
    async fn is_new(&self, repository: &str) -> Result<bool, RegistryClientError> {
        let answer: NewAnswer = self.query("new", repository).await?;
        Ok(answer.new)
    }

    async fn must_rescan(&self, repository: &str) -> Result<bool, RegistryClientError> {
        let answer: RescanAnswer = self.query("rescan", repository).await?;
        Ok(answer.rescan)
    }

    async fn create(&self, descriptor: &ImageDescriptor) -> Result<(), RegistryClientError> {
        self.submit(reqwest::Method::POST, descriptor).await
    }

    async fn update(&self, descriptor: &ImageDescriptor) -> Result<(), RegistryClientError> {
        self.submit(reqwest::Method::PUT, descriptor).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FixedCatalog {
        is_new: bool,
        must_rescan: bool,
        rescan_queries: AtomicUsize,
    }

    impl FixedCatalog {
        fn new(is_new: bool, must_rescan: bool) -> Self {
            Self {
                is_new,
                must_rescan,
                rescan_queries: AtomicUsize::new(0),
            }
        }
    }

    impl CatalogClient for FixedCatalog {
        async fn is_new(&self, _repository: &str) -> Result<bool, RegistryClientError> {
            Ok(self.is_new)
        }

        async fn must_rescan(&self, _repository: &str) -> Result<bool, RegistryClientError> {
            self.rescan_queries.fetch_add(1, Ordering::SeqCst);
            Ok(self.must_rescan)
        }

        async fn create(&self, _descriptor: &ImageDescriptor) -> Result<(), RegistryClientError> {
            Ok(())
        }

        async fn update(&self, _descriptor: &ImageDescriptor) -> Result<(), RegistryClientError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn new_repository_skips_rescan_query() {
        let catalog = FixedCatalog::new(true, true);
        let decision = scan_decision(&catalog, "acme/tool").await.unwrap();
        assert_eq!(decision, ScanDecision::New);
        assert_eq!(catalog.rescan_queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_repository_needs_rescan() {
        let catalog = FixedCatalog::new(false, true);
        let decision = scan_decision(&catalog, "acme/tool").await.unwrap();
        assert_eq!(decision, ScanDecision::NeedsRescan);
    }

    #[tokio::test]
    async fn fresh_repository_is_up_to_date() {
        let catalog = FixedCatalog::new(false, false);
        let decision = scan_decision(&catalog, "acme/tool").await.unwrap();
        assert_eq!(decision, ScanDecision::UpToDate);
        assert_eq!(catalog.rescan_queries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn answers_deserialize() {
        let new: NewAnswer = serde_json::from_str(r#"{"new": true}"#).unwrap();
        assert!(new.new);
        let rescan: RescanAnswer = serde_json::from_str(r#"{"rescan": false}"#).unwrap();
        assert!(!rescan.rescan);
    }

    #[tokio::test]
    async fn unreachable_catalog_is_unavailable() {
        let config = CatalogConfig {
            // 포트 9는 discard 서비스로, 로컬에서 연결이 거부됩니다.
            images_url: "http://127.0.0.1:9/api/images".to_owned(),
            ..CatalogConfig::default()
        };
        let client = HttpCatalogClient::new(&config, Duration::from_secs(2)).unwrap();
        let err = client.is_new("nginx").await.unwrap_err();
        assert!(matches!(err, RegistryClientError::CatalogUnavailable(_)));
        assert!(err.is_transient());
    }
}
