//! Core domain types for the scheduled merge bot.

pub mod ids;
pub mod vote;

pub use ids::{InstallationId, PrNumber, ReactionId, RepoRef, RepositoryId};
pub use vote::{Candidate, PullRequestSummary, Reaction, ReactionData, net_score};
