//! Scheduled Merge Bot - a GitHub App that lets reactions pick which pull
//! request gets merged.
//!
//! On each repository's cron schedule the bot counts 👍 minus 👎 on every
//! open pull request, merges the highest-scoring one, closes the rest, and
//! clears the votes for the next round.

pub mod config;
pub mod cycle;
pub mod github;
pub mod registry;
pub mod resolve;
pub mod schedule;
pub mod server;
pub mod tally;
pub mod types;
pub mod webhooks;

#[cfg(test)]
pub(crate) mod test_utils;
