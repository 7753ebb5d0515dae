//! Newtype wrappers for GitHub identifiers.
//!
//! These keep repository ids, installation ids, pull request numbers and
//! reaction ids from being mixed up at call sites.

use serde::{Deserialize, Serialize};
use std::fmt;

/// GitHub's stable numeric id for a repository.
///
/// Unlike `owner/name`, this survives renames and transfers, so it is the key
/// the subscription registry uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryId(pub u64);

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RepositoryId {
    fn from(n: u64) -> Self {
        RepositoryId(n)
    }
}

/// A GitHub App installation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstallationId(pub u64);

impl fmt::Display for InstallationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for InstallationId {
    fn from(n: u64) -> Self {
        InstallationId(n)
    }
}

/// A pull request number within a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrNumber(pub u64);

impl fmt::Display for PrNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for PrNumber {
    fn from(n: u64) -> Self {
        PrNumber(n)
    }
}

/// A reaction id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReactionId(pub u64);

impl fmt::Display for ReactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything needed to address a repository in API calls.
///
/// Equality and hashing include the name, but the registry keys on
/// [`RepoRef::id`] alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub id: RepositoryId,
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(id: impl Into<RepositoryId>, owner: impl Into<String>, name: impl Into<String>) -> Self {
        RepoRef {
            id: id.into(),
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Builds a `RepoRef` from GitHub's `owner/name` full name.
    ///
    /// Returns `None` unless the input has exactly one `/` with non-empty
    /// parts on both sides.
    pub fn from_full_name(id: impl Into<RepositoryId>, full_name: &str) -> Option<Self> {
        let (owner, name) = full_name.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(RepoRef::new(id, owner, name))
    }

    /// Returns `owner/name`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
