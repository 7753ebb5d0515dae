//! Webhook events the bot acts on.
//!
//! Only installation changes matter: they decide which repositories are
//! subscribed. Everything else GitHub delivers is ignored.

use serde::{Deserialize, Serialize};

use crate::types::{InstallationId, RepoRef};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionEvent {
    /// The app gained access to these repositories (`installation.created`
    /// or `installation_repositories.added`).
    Subscribe {
        installation: InstallationId,
        repositories: Vec<RepoRef>,
    },

    /// The app lost access to these repositories (`installation.deleted` or
    /// `installation_repositories.removed`).
    Unsubscribe {
        installation: InstallationId,
        repositories: Vec<RepoRef>,
    },
}

impl SubscriptionEvent {
    pub fn installation(&self) -> InstallationId {
        match self {
            SubscriptionEvent::Subscribe { installation, .. }
            | SubscriptionEvent::Unsubscribe { installation, .. } => *installation,
        }
    }

    pub fn repositories(&self) -> &[RepoRef] {
        match self {
            SubscriptionEvent::Subscribe { repositories, .. }
            | SubscriptionEvent::Unsubscribe { repositories, .. } => repositories,
        }
    }
}
