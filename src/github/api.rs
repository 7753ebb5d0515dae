//! The GitHub operations the bot needs.
//!
//! Everything above this layer talks to GitHub only through [`GitHubApi`], so
//! tests can swap in an in-memory double. One value of an implementing type
//! is one authenticated session; it may address any repository the session
//! can see.
//!
//! # Example (mock for testing)
//!
//! ```ignore
//! struct NoPullRequests;
//!
//! impl GitHubApi for NoPullRequests {
//!     async fn list_open_pull_requests(&self, _: &RepoRef) -> Result<Vec<PullRequestSummary>, GitHubApiError> {
//!         Ok(vec![])
//!     }
//!     // ...
//! }
//! ```

use std::future::Future;

use crate::types::{PrNumber, PullRequestSummary, ReactionData, ReactionId, RepoRef};

use super::error::GitHubApiError;

/// Reply from the merge endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub merged: bool,
    /// The merge commit SHA, when GitHub reports one.
    pub sha: Option<String>,
    /// GitHub's explanation, mostly useful when `merged` is false.
    pub message: Option<String>,
}

/// GitHub API capability for one installation.
pub trait GitHubApi: Send + Sync {
    /// Fetches a file's base64-encoded content.
    ///
    /// Returns `Ok(None)` when the file does not exist. Any other failure,
    /// including a path that names a directory, is an error.
    fn get_file_content(
        &self,
        repo: &RepoRef,
        path: &str,
    ) -> impl Future<Output = Result<Option<String>, GitHubApiError>> + Send;

    /// Lists every open pull request, in the order GitHub returns them.
    fn list_open_pull_requests(
        &self,
        repo: &RepoRef,
    ) -> impl Future<Output = Result<Vec<PullRequestSummary>, GitHubApiError>> + Send;

    /// Lists every reaction on a pull request's conversation.
    fn list_reactions(
        &self,
        repo: &RepoRef,
        pr: PrNumber,
    ) -> impl Future<Output = Result<Vec<ReactionData>, GitHubApiError>> + Send;

    /// Deletes one reaction from a pull request.
    fn delete_reaction(
        &self,
        repo: &RepoRef,
        pr: PrNumber,
        reaction: ReactionId,
    ) -> impl Future<Output = Result<(), GitHubApiError>> + Send;

    /// Merges a pull request with the repository's default merge method.
    fn merge_pull_request(
        &self,
        repo: &RepoRef,
        pr: PrNumber,
    ) -> impl Future<Output = Result<MergeOutcome, GitHubApiError>> + Send;

    /// Sets a pull request's state to closed.
    fn close_pull_request(
        &self,
        repo: &RepoRef,
        pr: PrNumber,
    ) -> impl Future<Output = Result<(), GitHubApiError>> + Send;
}
