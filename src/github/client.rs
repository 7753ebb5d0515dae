//! [`GitHubApi`] implemented on top of octocrab.
//!
//! Typed octocrab builders are used where octocrab has them; reactions and
//! file contents go through octocrab's raw `get`/`_delete` with our own serde
//! types. Every call is retried on transient errors except merges, which are
//! not idempotent.

use octocrab::Octocrab;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{PrNumber, PullRequestSummary, ReactionData, ReactionId, RepoRef};

use super::api::{GitHubApi, MergeOutcome};
use super::error::GitHubApiError;
use super::retry::{RetryConfig, RetryPolicy, retry_with_backoff};

/// Page size for list endpoints (GitHub's maximum).
const PAGE_SIZE: u8 = 100;

/// Safety limit against runaway pagination.
const MAX_PAGES: u32 = 50;

/// An authenticated octocrab session.
#[derive(Clone)]
pub struct OctocrabClient {
    client: Octocrab,
    retry: RetryConfig,
}

impl OctocrabClient {
    pub fn new(client: Octocrab) -> Self {
        Self {
            client,
            retry: RetryConfig::DEFAULT,
        }
    }

    /// Creates a client from a token, optionally against a GitHub Enterprise
    /// API base URL.
    pub fn from_token(token: impl Into<String>, base_uri: Option<&str>) -> Result<Self, octocrab::Error> {
        let mut builder = Octocrab::builder().personal_token(token.into());
        if let Some(uri) = base_uri {
            builder = builder.base_uri(uri)?;
        }
        Ok(Self::new(builder.build()?))
    }

    /// GETs every page of a list endpoint that returns a bare array.
    pub(crate) async fn get_all_pages<T: DeserializeOwned>(
        &self,
        route: &str,
    ) -> Result<Vec<T>, GitHubApiError> {
        self.get_all_pages_by(route, |items: Vec<T>| items).await
    }

    /// GETs every page of a list endpoint whose pages wrap their items, such
    /// as `{"total_count": .., "repositories": [..]}`.
    pub(crate) async fn get_all_pages_by<P, T>(
        &self,
        route: &str,
        items_of: impl Fn(P) -> Vec<T>,
    ) -> Result<Vec<T>, GitHubApiError>
    where
        P: DeserializeOwned,
    {
        let mut all = Vec::new();

        for page in 1..=MAX_PAGES {
            let params = PageParams {
                per_page: PAGE_SIZE,
                page,
            };
            let page: P = retry_with_backoff(self.retry, RetryPolicy::RetryTransient, || async {
                self.client
                    .get(route, Some(&params))
                    .await
                    .map_err(GitHubApiError::from_octocrab)
            })
            .await?;
            let items = items_of(page);

            let is_last_page = items.len() < usize::from(PAGE_SIZE);
            all.extend(items);
            if is_last_page {
                return Ok(all);
            }
        }

        warn!(route, pages = MAX_PAGES, "Stopped paginating at page limit");
        Ok(all)
    }

    /// POSTs to `route` without a body.
    pub(crate) async fn post_empty<T: DeserializeOwned>(&self, route: &str) -> Result<T, GitHubApiError> {
        retry_with_backoff(self.retry, RetryPolicy::RetryTransient, || async {
            self.client
                .post(route, None::<&()>)
                .await
                .map_err(GitHubApiError::from_octocrab)
        })
        .await
    }
}

impl std::fmt::Debug for OctocrabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctocrabClient")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct PageParams {
    per_page: u8,
    page: u32,
}

/// The subset of the contents API response we read.
#[derive(Debug, Deserialize)]
struct ContentFile {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
}

impl GitHubApi for OctocrabClient {
    async fn get_file_content(
        &self,
        repo: &RepoRef,
        path: &str,
    ) -> Result<Option<String>, GitHubApiError> {
        let route = format!("/repos/{}/{}/contents/{}", repo.owner, repo.name, path);
        let result: Result<ContentFile, _> =
            retry_with_backoff(self.retry, RetryPolicy::RetryTransient, || async {
                self.client
                    .get(&route, None::<&()>)
                    .await
                    .map_err(GitHubApiError::from_octocrab)
            })
            .await;

        match result {
            Ok(file) if file.kind == "file" => Ok(Some(file.content.unwrap_or_default())),
            Ok(file) => Err(GitHubApiError::permanent(format!(
                "{path} in {repo} is a {}, not a file",
                file.kind
            ))),
            Err(e) if e.is_not_found() => {
                debug!(repo = %repo, path, "File not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn list_open_pull_requests(
        &self,
        repo: &RepoRef,
    ) -> Result<Vec<PullRequestSummary>, GitHubApiError> {
        let mut all = Vec::new();

        for page in 1..=MAX_PAGES {
            let items = retry_with_backoff(self.retry, RetryPolicy::RetryTransient, || async {
                self.client
                    .pulls(&repo.owner, &repo.name)
                    .list()
                    .state(octocrab::params::State::Open)
                    .per_page(PAGE_SIZE)
                    .page(page)
                    .send()
                    .await
                    .map_err(GitHubApiError::from_octocrab)
            })
            .await?
            .items;

            let is_last_page = items.len() < usize::from(PAGE_SIZE);
            all.extend(items.into_iter().map(|pull| PullRequestSummary {
                number: PrNumber(pull.number),
                id: pull.id.0,
            }));
            if is_last_page {
                break;
            }
        }

        debug!(repo = %repo, count = all.len(), "Listed open pull requests");
        Ok(all)
    }

    async fn list_reactions(
        &self,
        repo: &RepoRef,
        pr: PrNumber,
    ) -> Result<Vec<ReactionData>, GitHubApiError> {
        let route = format!("/repos/{}/{}/issues/{}/reactions", repo.owner, repo.name, pr.0);
        self.get_all_pages(&route).await
    }

    async fn delete_reaction(
        &self,
        repo: &RepoRef,
        pr: PrNumber,
        reaction: ReactionId,
    ) -> Result<(), GitHubApiError> {
        let route = format!(
            "/repos/{}/{}/issues/{}/reactions/{}",
            repo.owner, repo.name, pr.0, reaction.0
        );

        retry_with_backoff(self.retry, RetryPolicy::RetryTransient, || async {
            let response = self
                .client
                ._delete(route.as_str(), None::<&()>)
                .await
                .map_err(GitHubApiError::from_octocrab)?;

            let status = response.status();
            // Already gone counts as deleted.
            if status.is_success() || status.as_u16() == 404 {
                Ok(())
            } else {
                Err(GitHubApiError::from_status(
                    status.as_u16(),
                    format!("failed to delete reaction {reaction} on {pr}"),
                ))
            }
        })
        .await
    }

    async fn merge_pull_request(
        &self,
        repo: &RepoRef,
        pr: PrNumber,
    ) -> Result<MergeOutcome, GitHubApiError> {
        let merge = retry_with_backoff(self.retry, RetryPolicy::NoRetry, || async {
            self.client
                .pulls(&repo.owner, &repo.name)
                .merge(pr.0)
                .send()
                .await
                .map_err(GitHubApiError::from_octocrab)
        })
        .await?;

        Ok(MergeOutcome {
            merged: merge.merged,
            sha: merge.sha,
            message: merge.message,
        })
    }

    async fn close_pull_request(&self, repo: &RepoRef, pr: PrNumber) -> Result<(), GitHubApiError> {
        retry_with_backoff(self.retry, RetryPolicy::RetryTransient, || async {
            self.client
                .issues(&repo.owner, &repo.name)
                .update(pr.0)
                .state(octocrab::models::IssueState::Closed)
                .send()
                .await
                .map(drop)
                .map_err(GitHubApiError::from_octocrab)
        })
        .await
    }
}
