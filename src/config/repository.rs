//! Per-repository configuration, read from `.github/scheduled-merge.yml`.
//!
//! The file is optional. Only its `cron` key is read:
//!
//! ```yaml
//! cron: "0 0 18 * * Fri"
//! ```
//!
//! A missing file, an empty file, or a document without `cron` all give the
//! default schedule. A file that exists but cannot be decoded or parsed is an
//! error, so a typo never silently falls back to the default.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::github::{GitHubApi, GitHubApiError};
use crate::types::RepoRef;

/// Location of the configuration file within a repository.
pub const CONFIG_PATH: &str = ".github/scheduled-merge.yml";

/// Schedule used when a repository does not configure one: every second
/// of Sunday (UTC).
pub const DEFAULT_CRON: &str = "* * * * * 7";

/// Errors resolving a repository's configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to fetch repository config: {0}")]
    Fetch(#[source] GitHubApiError),

    #[error("repository config is not valid base64 UTF-8: {reason}")]
    Decode { reason: String },

    #[error("repository config is not valid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Settings for one repository. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Passed to the scheduler verbatim.
    pub cron: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        RepositoryConfig {
            cron: DEFAULT_CRON.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    cron: Option<String>,
}

/// Parses the YAML text of a configuration file.
pub fn parse_config(text: &str) -> Result<RepositoryConfig, ConfigError> {
    if text.trim().is_empty() {
        return Ok(RepositoryConfig::default());
    }

    let raw: Option<RawConfig> = serde_yaml::from_str(text)?;
    Ok(match raw.and_then(|r| r.cron) {
        Some(cron) => RepositoryConfig { cron },
        None => RepositoryConfig::default(),
    })
}

/// Decodes the base64 payload of the contents API.
///
/// GitHub wraps the encoding with newlines, which are stripped first.
fn decode_content(encoded: &str) -> Result<String, ConfigError> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD.decode(compact).map_err(|e| ConfigError::Decode {
        reason: e.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|e| ConfigError::Decode {
        reason: e.to_string(),
    })
}

/// Fetches and parses a repository's configuration.
///
/// Not-found gives the default; every other failure is returned.
pub async fn resolve_config<G: GitHubApi>(api: &G, repo: &RepoRef) -> Result<RepositoryConfig, ConfigError> {
    let Some(encoded) = api
        .get_file_content(repo, CONFIG_PATH)
        .await
        .map_err(ConfigError::Fetch)?
    else {
        debug!(repo = %repo, "No config file; using default schedule");
        return Ok(RepositoryConfig::default());
    };

    let config = parse_config(&decode_content(&encoded)?)?;
    debug!(repo = %repo, cron = %config.cron, "Resolved repository config");
    Ok(config)
}
