//! Configuration: per-repository settings fetched from GitHub, and process
//! settings read from the environment.

mod repository;
mod service;

pub use repository::{
    CONFIG_PATH, ConfigError, DEFAULT_CRON, RepositoryConfig, parse_config, resolve_config,
};
pub use service::{Credentials, ServiceConfig, SettingsError};
