//! GitHub API access.
//!
//! - [`GitHubApi`] is the narrow set of operations the bot performs.
//! - [`OctocrabClient`] implements it against the real API, retrying
//!   transient failures with exponential backoff.
//! - [`Authenticator`] hands out API sessions per installation, either as a
//!   GitHub App ([`AppAuthenticator`]) or from one token
//!   ([`TokenAuthenticator`]).

mod api;
mod auth;
mod client;
mod error;
mod retry;

pub use api::{GitHubApi, MergeOutcome};
pub use auth::{AppAuthenticator, Authenticator, TOKEN_INSTALLATION, TokenAuthenticator};
pub use client::OctocrabClient;
pub use error::{GitHubApiError, GitHubErrorKind};
pub use retry::{RetryConfig, RetryPolicy, retry_with_backoff};
