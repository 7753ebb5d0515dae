//! Vote counting.
//!
//! Tallying is destructive: every reaction read is deleted, so each cycle
//! starts from zero votes. Any failure aborts the tally; callers must not
//! act on a partial result.

use thiserror::Error;
use tracing::{debug, info};

use crate::github::{GitHubApi, GitHubApiError};
use crate::types::{Candidate, PrNumber, RepoRef, net_score};

#[derive(Debug, Error)]
pub enum TallyError {
    #[error("failed to list open pull requests: {0}")]
    ListPullRequests(#[source] GitHubApiError),

    #[error("failed to list reactions on {pr}: {source}")]
    ListReactions {
        pr: PrNumber,
        #[source]
        source: GitHubApiError,
    },

    #[error("failed to delete a reaction on {pr}: {source}")]
    DeleteReaction {
        pr: PrNumber,
        #[source]
        source: GitHubApiError,
    },
}

/// Scores every open pull request and resets its votes.
///
/// Returns candidates sorted ascending by score. The sort is stable, so
/// equal scores keep the order GitHub listed them in.
pub async fn tally<G: GitHubApi>(api: &G, repo: &RepoRef) -> Result<Vec<Candidate>, TallyError> {
    let pull_requests = api
        .list_open_pull_requests(repo)
        .await
        .map_err(TallyError::ListPullRequests)?;

    if pull_requests.is_empty() {
        debug!(repo = %repo, "No open pull requests");
        return Ok(Vec::new());
    }

    let mut candidates = Vec::with_capacity(pull_requests.len());
    for pull in pull_requests {
        let pr = pull.number;
        let reactions = api
            .list_reactions(repo, pr)
            .await
            .map_err(|source| TallyError::ListReactions { pr, source })?;

        let score = net_score(&reactions);

        for reaction in &reactions {
            api.delete_reaction(repo, pr, reaction.id)
                .await
                .map_err(|source| TallyError::DeleteReaction { pr, source })?;
        }

        debug!(repo = %repo, pr = %pr, score, reactions = reactions.len(), "Scored pull request");
        candidates.push(Candidate {
            number: pr,
            id: pull.id,
            net_score: score,
        });
    }

    candidates.sort_by_key(|c| c.net_score);

    info!(
        repo = %repo,
        scores = ?candidates.iter().map(|c| (c.number.0, c.net_score)).collect::<Vec<_>>(),
        "Tallied pull requests"
    );
    Ok(candidates)
}
