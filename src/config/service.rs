//! Process settings, read from the environment.
//!
//! The bot normally runs as a GitHub App (`GITHUB_APP_ID` plus
//! `GITHUB_APP_PRIVATE_KEY`). Running on a plain token is opt-in and needs an
//! explicit repository allowlist.

use std::net::SocketAddr;

use secrecy::SecretString;
use thiserror::Error;

pub const APP_ID_VAR: &str = "GITHUB_APP_ID";
pub const APP_PRIVATE_KEY_VAR: &str = "GITHUB_APP_PRIVATE_KEY";
pub const TOKEN_VAR: &str = "GITHUB_TOKEN";
pub const WEBHOOK_SECRET_VAR: &str = "SCHEDULED_MERGE_WEBHOOK_SECRET";
pub const BIND_VAR: &str = "SCHEDULED_MERGE_BIND";
pub const REPOSITORIES_VAR: &str = "SCHEDULED_MERGE_REPOSITORIES";
pub const API_URL_VAR: &str = "GITHUB_API_URL";

pub const DEFAULT_BIND: &str = "0.0.0.0:3000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("no credentials: set GITHUB_APP_ID and GITHUB_APP_PRIVATE_KEY, or GITHUB_TOKEN with SCHEDULED_MERGE_REPOSITORIES")]
    MissingCredentials,

    #[error("GITHUB_APP_ID is not a number: {value}")]
    InvalidAppId { value: String },

    #[error("{var} is not a valid socket address: {value}")]
    InvalidBind { var: &'static str, value: String },

    #[error("{var} entry {entry:?} is not an owner/name repository")]
    InvalidRepository { var: &'static str, entry: String },
}

/// How the bot authenticates to GitHub.
pub enum Credentials {
    /// Acts for every installation of a GitHub App.
    App { app_id: u64, private_key: SecretString },
    /// Acts with one token, on the listed `owner/name` repositories only.
    Token {
        token: SecretString,
        repositories: Vec<String>,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::App { app_id, .. } => f.debug_struct("App").field("app_id", app_id).finish_non_exhaustive(),
            Credentials::Token { repositories, .. } => f
                .debug_struct("Token")
                .field("repositories", repositories)
                .finish_non_exhaustive(),
        }
    }
}

/// Settings for the whole service.
pub struct ServiceConfig {
    pub credentials: Credentials,
    pub webhook_secret: String,
    pub bind: SocketAddr,
    /// API base URL for GitHub Enterprise.
    pub api_url: Option<String>,
}

// Secrets stay out of logs.
impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("credentials", &self.credentials)
            .field("bind", &self.bind)
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl ServiceConfig {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`. Empty values count as unset.
    ///
    /// App credentials win when both kinds are present.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let credentials = match (get(APP_ID_VAR), get(TOKEN_VAR)) {
            (Some(app_id), _) => {
                let app_id = app_id
                    .trim()
                    .parse()
                    .map_err(|_| SettingsError::InvalidAppId { value: app_id.clone() })?;
                let private_key = get(APP_PRIVATE_KEY_VAR).ok_or(SettingsError::Missing(APP_PRIVATE_KEY_VAR))?;
                Credentials::App {
                    app_id,
                    private_key: SecretString::from(unescape_newlines(&private_key)),
                }
            }
            (None, Some(token)) => {
                let list = get(REPOSITORIES_VAR).ok_or(SettingsError::Missing(REPOSITORIES_VAR))?;
                let repositories = parse_repository_list(&list)?;
                if repositories.is_empty() {
                    return Err(SettingsError::Missing(REPOSITORIES_VAR));
                }
                Credentials::Token {
                    token: SecretString::from(token),
                    repositories,
                }
            }
            (None, None) => return Err(SettingsError::MissingCredentials),
        };

        let webhook_secret = get(WEBHOOK_SECRET_VAR).ok_or(SettingsError::Missing(WEBHOOK_SECRET_VAR))?;

        let bind_value = get(BIND_VAR).unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_value
            .trim()
            .parse()
            .map_err(|_| SettingsError::InvalidBind {
                var: BIND_VAR,
                value: bind_value.clone(),
            })?;

        Ok(ServiceConfig {
            credentials,
            webhook_secret,
            bind,
            api_url: get(API_URL_VAR),
        })
    }
}

/// `.env` files often carry a PEM on one line with literal `\n` separators.
fn unescape_newlines(pem: &str) -> String {
    pem.replace("\\n", "\n")
}

fn parse_repository_list(list: &str) -> Result<Vec<String>, SettingsError> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(entry.to_string())
            }
            _ => Err(SettingsError::InvalidRepository {
                var: REPOSITORIES_VAR,
                entry: entry.to_string(),
            }),
        })
        .collect()
}
