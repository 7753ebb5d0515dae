//! Webhook payload parsing.
//!
//! The event type comes from the `X-GitHub-Event` header. Event types and
//! actions the bot does not handle parse to `Ok(None)`; a handled event with
//! a malformed payload is an error.

use serde::Deserialize;
use thiserror::Error;

use crate::types::{InstallationId, RepoRef, RepositoryId};

use super::events::SubscriptionEvent;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid field value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Parses a delivery into a [`SubscriptionEvent`], if it is one.
///
/// ```
/// use scheduled_merge::webhooks::{SubscriptionEvent, parse_webhook};
///
/// let payload = br#"{
///     "action": "created",
///     "installation": { "id": 7 },
///     "repositories": [{ "id": 1, "name": "hello", "full_name": "octocat/hello" }]
/// }"#;
///
/// let event = parse_webhook("installation", payload).unwrap().unwrap();
/// assert!(matches!(event, SubscriptionEvent::Subscribe { .. }));
/// assert!(parse_webhook("ping", b"{}").unwrap().is_none());
/// ```
pub fn parse_webhook(event_type: &str, payload: &[u8]) -> Result<Option<SubscriptionEvent>, ParseError> {
    match event_type {
        "installation" => parse_installation(payload),
        "installation_repositories" => parse_installation_repositories(payload),
        _ => Ok(None),
    }
}

#[derive(Debug, Deserialize)]
struct RawInstallation {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    id: u64,
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct RawInstallationPayload {
    action: String,
    installation: RawInstallation,
    #[serde(default)]
    repositories: Option<Vec<RawRepository>>,
}

#[derive(Debug, Deserialize)]
struct RawInstallationRepositoriesPayload {
    action: String,
    installation: RawInstallation,
    #[serde(default)]
    repositories_added: Vec<RawRepository>,
    #[serde(default)]
    repositories_removed: Vec<RawRepository>,
}

fn convert_repositories(raw: Vec<RawRepository>) -> Result<Vec<RepoRef>, ParseError> {
    raw.into_iter()
        .map(|r| {
            RepoRef::from_full_name(RepositoryId(r.id), &r.full_name).ok_or(ParseError::InvalidField {
                field: "full_name",
                value: r.full_name,
            })
        })
        .collect()
}

fn parse_installation(payload: &[u8]) -> Result<Option<SubscriptionEvent>, ParseError> {
    let raw: RawInstallationPayload = serde_json::from_slice(payload)?;
    let installation = InstallationId(raw.installation.id);
    let repositories = convert_repositories(raw.repositories.unwrap_or_default())?;

    Ok(match raw.action.as_str() {
        "created" => Some(SubscriptionEvent::Subscribe {
            installation,
            repositories,
        }),
        "deleted" => Some(SubscriptionEvent::Unsubscribe {
            installation,
            repositories,
        }),
        _ => None,
    })
}

fn parse_installation_repositories(payload: &[u8]) -> Result<Option<SubscriptionEvent>, ParseError> {
    let raw: RawInstallationRepositoriesPayload = serde_json::from_slice(payload)?;
    let installation = InstallationId(raw.installation.id);

    Ok(match raw.action.as_str() {
        "added" => Some(SubscriptionEvent::Subscribe {
            installation,
            repositories: convert_repositories(raw.repositories_added)?,
        }),
        "removed" => Some(SubscriptionEvent::Unsubscribe {
            installation,
            repositories: convert_repositories(raw.repositories_removed)?,
        }),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bytes(value: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    fn installation_payload(action: &str) -> Vec<u8> {
        bytes(json!({
            "action": action,
            "installation": { "id": 42, "account": { "login": "octocat" } },
            "repositories": [
                { "id": 1, "name": "hello-world", "full_name": "octocat/hello-world", "private": false },
                { "id": 2, "name": "spoon-knife", "full_name": "octocat/spoon-knife", "private": true }
            ],
            "sender": { "login": "octocat" }
        }))
    }

    #[test]
    fn installation_created_subscribes_every_repository() {
        let event = parse_webhook("installation", &installation_payload("created"))
            .unwrap()
            .unwrap();

        assert_eq!(
            event,
            SubscriptionEvent::Subscribe {
                installation: InstallationId(42),
                repositories: vec![
                    RepoRef::new(1, "octocat", "hello-world"),
                    RepoRef::new(2, "octocat", "spoon-knife"),
                ],
            }
        );
    }

    #[test]
    fn installation_deleted_unsubscribes() {
        let event = parse_webhook("installation", &installation_payload("deleted"))
            .unwrap()
            .unwrap();
        assert!(matches!(event, SubscriptionEvent::Unsubscribe { .. }));
        assert_eq!(event.repositories().len(), 2);
        assert_eq!(event.installation(), InstallationId(42));
    }

    #[test]
    fn other_installation_actions_are_ignored() {
        for action in ["suspend", "unsuspend", "new_permissions_accepted"] {
            assert_eq!(
                parse_webhook("installation", &installation_payload(action)).unwrap(),
                None,
                "{action}"
            );
        }
    }

    #[test]
    fn installation_without_repository_list_has_none() {
        let payload = bytes(json!({ "action": "deleted", "installation": { "id": 3 } }));
        let event = parse_webhook("installation", &payload).unwrap().unwrap();
        assert!(event.repositories().is_empty());
    }

    #[test]
    fn repositories_added_and_removed() {
        let payload = bytes(json!({
            "action": "added",
            "installation": { "id": 9 },
            "repository_selection": "selected",
            "repositories_added": [{ "id": 5, "name": "a", "full_name": "org/a" }],
            "repositories_removed": []
        }));
        let event = parse_webhook("installation_repositories", &payload).unwrap().unwrap();
        assert_eq!(
            event,
            SubscriptionEvent::Subscribe {
                installation: InstallationId(9),
                repositories: vec![RepoRef::new(5, "org", "a")],
            }
        );

        let payload = bytes(json!({
            "action": "removed",
            "installation": { "id": 9 },
            "repositories_added": [],
            "repositories_removed": [{ "id": 5, "name": "a", "full_name": "org/a" }]
        }));
        let event = parse_webhook("installation_repositories", &payload).unwrap().unwrap();
        assert!(matches!(event, SubscriptionEvent::Unsubscribe { .. }));
    }

    #[test]
    fn unknown_event_types_are_ignored() {
        assert!(parse_webhook("pull_request", b"not even json").unwrap().is_none());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            parse_webhook("installation", b"{"),
            Err(ParseError::Json(_))
        ));
    }

    #[test]
    fn missing_installation_is_an_error() {
        let payload = bytes(json!({ "action": "created", "repositories": [] }));
        assert!(parse_webhook("installation", &payload).is_err());
    }

    #[test]
    fn malformed_full_name_is_an_error() {
        let payload = bytes(json!({
            "action": "created",
            "installation": { "id": 1 },
            "repositories": [{ "id": 1, "name": "x", "full_name": "no-slash" }]
        }));
        assert!(matches!(
            parse_webhook("installation", &payload),
            Err(ParseError::InvalidField { field: "full_name", .. })
        ));
    }
}
