//! Acting on a tally: merge the winner, close everyone else.
//!
//! Planning is pure so the selection rule can be tested without GitHub.
//! Execution merges first; losers are only touched once the winner is in.

use thiserror::Error;
use tracing::{info, warn};

use crate::github::{GitHubApi, GitHubApiError};
use crate::types::{Candidate, PrNumber, RepoRef};

/// Which pull request wins, and which ones lose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub winner: Candidate,
    pub losers: Vec<Candidate>,
}

/// Picks the last candidate of an ascending-sorted tally as the winner.
///
/// Among equal top scores this is the one GitHub listed last. Returns `None`
/// when there are no candidates.
pub fn plan(mut ordered: Vec<Candidate>) -> Option<Resolution> {
    let winner = ordered.pop()?;
    Some(Resolution {
        winner,
        losers: ordered,
    })
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("failed to merge {pr}: {source}")]
    Api {
        pr: PrNumber,
        #[source]
        source: GitHubApiError,
    },

    #[error("GitHub did not merge {pr}: {message}")]
    NotMerged { pr: PrNumber, message: String },
}

/// A loser that could not be closed.
#[derive(Debug, Error)]
#[error("failed to close {pr}: {source}")]
pub struct CloseError {
    pub pr: PrNumber,
    #[source]
    pub source: GitHubApiError,
}

/// What happened when a resolution was carried out.
#[derive(Debug)]
pub struct ResolutionReport {
    pub merged: PrNumber,
    pub merge_sha: Option<String>,
    pub closed: Vec<PrNumber>,
    pub close_failures: Vec<CloseError>,
}

impl ResolutionReport {
    pub fn is_complete(&self) -> bool {
        self.close_failures.is_empty()
    }
}

/// Merges the winner, then closes each loser.
///
/// A failed merge returns [`MergeError`] with no loser touched. A failed
/// close is recorded in the report and the remaining losers are still
/// closed; nothing already done is undone.
pub async fn execute<G: GitHubApi>(
    api: &G,
    repo: &RepoRef,
    resolution: &Resolution,
) -> Result<ResolutionReport, MergeError> {
    let winner = resolution.winner.number;
    info!(repo = %repo, pr = %winner, score = resolution.winner.net_score, "Merging winner");

    let outcome = api
        .merge_pull_request(repo, winner)
        .await
        .map_err(|source| MergeError::Api { pr: winner, source })?;

    if !outcome.merged {
        return Err(MergeError::NotMerged {
            pr: winner,
            message: outcome.message.unwrap_or_else(|| "no reason given".to_string()),
        });
    }

    let mut report = ResolutionReport {
        merged: winner,
        merge_sha: outcome.sha,
        closed: Vec::new(),
        close_failures: Vec::new(),
    };

    for loser in &resolution.losers {
        let pr = loser.number;
        match api.close_pull_request(repo, pr).await {
            Ok(()) => {
                info!(repo = %repo, pr = %pr, score = loser.net_score, "Closed pull request");
                report.closed.push(pr);
            }
            Err(source) => {
                warn!(repo = %repo, pr = %pr, error = %source, "Failed to close pull request");
                report.close_failures.push(CloseError { pr, source });
            }
        }
    }

    Ok(report)
}
