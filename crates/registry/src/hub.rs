//! Image registry abstraction and the Docker Hub implementation.
//!
//! The [`RegistryClient`] trait covers the four registry reads the pipeline
//! needs: paginated repository listing, tag listing, per-tag metadata and
//! per-repository metadata. [`HubRegistryClient`] talks to the Docker Hub v2
//! HTTP API with `reqwest`; tests in the crawler and scanner crates provide
//! their own in-memory implementations.
//!
//! # Endpoints
//!
//! ```text
//! GET {hub}/v2/search/repositories/?query=*&page=N&page_size=M
//! GET {hub}/v2/repositories/{namespace}/{name}/tags/?page_size=100
//! GET {hub}/v2/repositories/{namespace}/{name}/tags/{tag}/
//! GET {hub}/v2/repositories/{namespace}/{name}/
//! ```
//!
//! Bare repository names (`nginx`) are official images and are addressed as
//! `library/nginx` in API paths.

use std::borrow::Cow;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use dofinder_core::config::RegistryConfig;
use dofinder_core::types::{RepositoryMetadata, TagMetadata};

use crate::error::RegistryClientError;

/// Page size used when walking a repository's tag list.
const TAG_PAGE_SIZE: u32 = 100;

/// Upper bound on tag pages followed for one repository. A listing cut at
/// this bound is completed with a direct lookup of the canonical tag.
const MAX_TAG_PAGES: usize = 20;

/// One page of the repository listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryPage {
    /// Repository names in registry order.
    pub names: Vec<String>,
    /// Whether the registry reports a following page.
    pub has_next: bool,
}

/// Registry read operations used by the crawler and the scanner.
///
/// Implementations must be shareable across worker tasks.
pub trait RegistryClient: Send + Sync + 'static {
    /// Lists one page of repositories. Pages are 1-based.
    ///
    /// # Errors
    ///
    /// - `RegistryClientError::Transport` / `Status`: the page could not be read
    /// - `RegistryClientError::Decode`: the body was not a listing page
    fn list_repositories(
        &self,
        page: u32,
        page_size: u32,
    ) -> impl Future<Output = Result<RepositoryPage, RegistryClientError>> + Send;

    /// Lists every tag of a repository together with its metadata.
    ///
    /// # Errors
    ///
    /// - `RegistryClientError::NotFound`: the repository does not exist
    fn list_tags(
        &self,
        repository: &str,
    ) -> impl Future<Output = Result<Vec<TagMetadata>, RegistryClientError>> + Send;

    /// Fetches metadata for one tag.
    ///
    /// # Errors
    ///
    /// - `RegistryClientError::NotFound`: the tag does not exist
    fn tag_metadata(
        &self,
        repository: &str,
        tag: &str,
    ) -> impl Future<Output = Result<TagMetadata, RegistryClientError>> + Send;

    /// Fetches description, star and pull counts of a repository.
    fn repository_metadata(
        &self,
        repository: &str,
    ) -> impl Future<Output = Result<RepositoryMetadata, RegistryClientError>> + Send;
}

/// Returns the repository path used in registry API URLs.
///
/// ```ignore
/// assert_eq!(api_repository("nginx"), "library/nginx");
/// assert_eq!(api_repository("acme/tool"), "acme/tool");
/// ```
pub fn api_repository(repository: &str) -> Cow<'_, str> {
    if repository.contains('/') {
        Cow::Borrowed(repository)
    } else {
        Cow::Owned(format!("library/{repository}"))
    }
}

// ─── Docker Hub wire format ────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    repo_name: String,
}

#[derive(Debug, Deserialize)]
struct TagPage {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    results: Vec<HubTag>,
}

#[derive(Debug, Deserialize)]
struct HubTag {
    name: String,
    #[serde(default)]
    full_size: Option<i64>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

impl From<HubTag> for TagMetadata {
    fn from(tag: HubTag) -> Self {
        Self {
            tag: tag.name,
            size_bytes: tag.full_size.unwrap_or(0),
            last_updated: tag.last_updated,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HubRepository {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    star_count: Option<u64>,
    #[serde(default)]
    pull_count: Option<u64>,
}

impl From<HubRepository> for RepositoryMetadata {
    fn from(repo: HubRepository) -> Self {
        Self {
            description: repo.description.filter(|d| !d.is_empty()),
            stars: repo.star_count,
            pulls: repo.pull_count,
        }
    }
}

impl From<SearchPage> for RepositoryPage {
    fn from(page: SearchPage) -> Self {
        Self {
            has_next: page.next.is_some() && !page.results.is_empty(),
            names: page.results.into_iter().map(|r| r.repo_name).collect(),
        }
    }
}

/// Docker Hub v2 API client.
pub struct HubRegistryClient {
    http: reqwest::Client,
    base_url: String,
    canonical_tag: String,
}

impl HubRegistryClient {
    /// Builds a client from the `[registry]` config section.
    ///
    /// # Errors
    ///
    /// Returns `RegistryClientError::Config` if the HTTP client cannot be built.
    pub fn new(config: &RegistryConfig) -> Result<Self, RegistryClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("dofinder/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RegistryClientError::Config {
                field: "registry".to_owned(),
                reason: format!("failed to build http client: {e}"),
            })?;
        Ok(Self {
            http,
            base_url: config.hub_url.trim_end_matches('/').to_owned(),
            canonical_tag: config.canonical_tag.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, RegistryClientError> {
        debug!(url, "registry request");
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| RegistryClientError::Transport(format!("GET {url}: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryClientError::NotFound(url.to_owned()));
        }
        if !status.is_success() {
            return Err(RegistryClientError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| RegistryClientError::Decode {
                url: url.to_owned(),
                reason: e.to_string(),
            })
    }
}

impl RegistryClient for HubRegistryClient {
    async fn list_repositories(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<RepositoryPage, RegistryClientError> {
        let url = self.url("search/repositories/");
        let query = [
            ("query", "*".to_owned()),
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
        ];
        let body: SearchPage = self.get_json(&url, &query).await?;
        Ok(body.into())
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<TagMetadata>, RegistryClientError> {
        let mut url = self.url(&format!("repositories/{}/tags/", api_repository(repository)));
        let mut query = vec![("page_size", TAG_PAGE_SIZE.to_string())];
        let mut tags = Vec::new();
        let mut truncated = true;

        for _ in 0..MAX_TAG_PAGES {
            let page: TagPage = self.get_json(&url, &query).await?;
            tags.extend(page.results.into_iter().map(TagMetadata::from));
            match page.next {
                // `next` already carries page and page_size
                Some(next) => {
                    url = next;
                    query.clear();
                }
                None => {
                    truncated = false;
                    break;
                }
            }
        }

        if truncated && !tags.iter().any(|t| t.tag == self.canonical_tag) {
            warn!(
                repository,
                tags = tags.len(),
                max_pages = MAX_TAG_PAGES,
                "tag listing truncated, looking up canonical tag directly"
            );
            match self.tag_metadata(repository, &self.canonical_tag).await {
                Ok(tag) => tags.push(tag),
                Err(RegistryClientError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(tags)
    }

    async fn tag_metadata(
        &self,
        repository: &str,
        tag: &str,
    ) -> Result<TagMetadata, RegistryClientError> {
        let url = self.url(&format!(
            "repositories/{}/tags/{tag}/",
            api_repository(repository)
        ));
        let body: HubTag = self.get_json(&url, &[]).await?;
        Ok(body.into())
    }

    async fn repository_metadata(
        &self,
        repository: &str,
    ) -> Result<RepositoryMetadata, RegistryClientError> {
        let url = self.url(&format!("repositories/{}/", api_repository(repository)));
        let body: HubRepository = self.get_json(&url, &[]).await?;
        Ok(body.into())
    }
}
