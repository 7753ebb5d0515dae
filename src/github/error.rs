//! GitHub API error types.
//!
//! Errors are categorised so callers can make two decisions without string
//! matching:
//!
//! - **Transient** errors (5xx, rate limits, network failures) are retried
//!   with backoff.
//! - **NotFound** (HTTP 404) is an expected outcome for some calls, e.g. a
//!   repository that has no configuration file.
//! - **Permanent** errors are everything else and are surfaced as-is.

use std::fmt;
use thiserror::Error;

/// The kind of GitHub API error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitHubErrorKind {
    /// Safe to retry with backoff.
    Transient,

    /// The resource does not exist (HTTP 404).
    NotFound,

    /// Requires human intervention; retrying will not help.
    Permanent,
}

impl GitHubErrorKind {
    /// Returns true if this error is retriable.
    pub fn is_retriable(&self) -> bool {
        matches!(self, GitHubErrorKind::Transient)
    }
}

/// A GitHub API error with categorization for retry decisions.
#[derive(Debug, Error)]
pub struct GitHubApiError {
    pub kind: GitHubErrorKind,

    /// The HTTP status code, if available.
    pub status_code: Option<u16>,

    pub message: String,

    #[source]
    pub source: Option<octocrab::Error>,
}

impl fmt::Display for GitHubApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "GitHub API error (HTTP {}): {}", code, self.message),
            None => write!(f, "GitHub API error: {}", self.message),
        }
    }
}

impl GitHubApiError {
    /// Creates an error from a bare HTTP status, for calls that inspect the
    /// raw response instead of going through octocrab's typed errors.
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            kind: kind_for_status(status_code, ""),
            status_code: Some(status_code),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a permanent error without an octocrab source.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: GitHubErrorKind::Permanent,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a transient error without an octocrab source.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: GitHubErrorKind::Transient,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Categorizes an octocrab error.
    ///
    /// API errors carry their status code; everything else (connection resets,
    /// timeouts, TLS failures) is treated as transient when the message looks
    /// like a network problem, permanent otherwise.
    pub fn from_octocrab(err: octocrab::Error) -> Self {
        let (status_code, message) = match &err {
            octocrab::Error::GitHub { source, .. } => {
                (Some(source.status_code.as_u16()), source.message.clone())
            }
            other => (None, other.to_string()),
        };

        let kind = match status_code {
            Some(code) => kind_for_status(code, &message),
            None if is_network_error(&message) => GitHubErrorKind::Transient,
            None => GitHubErrorKind::Permanent,
        };

        Self {
            kind,
            status_code,
            message,
            source: Some(err),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == GitHubErrorKind::NotFound
    }
}

fn kind_for_status(code: u16, message: &str) -> GitHubErrorKind {
    match code {
        404 => GitHubErrorKind::NotFound,
        429 => GitHubErrorKind::Transient,
        403 if is_rate_limit_error(message) => GitHubErrorKind::Transient,
        500..=599 => GitHubErrorKind::Transient,
        _ => GitHubErrorKind::Permanent,
    }
}

fn is_rate_limit_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("rate limit") || lower.contains("abuse detection")
}

fn is_network_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["timed out", "timeout", "connection", "dns", "broken pipe", "hyper"]
        .iter()
        .any(|needle| lower.contains(needle))
}
