//! Webhook endpoint handler.
//!
//! Verifies and parses a delivery, then hands any subscription change to a
//! spawned task and returns 202 Accepted. The response never waits on the
//! GitHub API.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AppState;
use crate::github::Authenticator;
use crate::registry::SubscriptionRegistry;
use crate::webhooks::{ParseError, SubscriptionEvent, parse_webhook};

const HEADER_EVENT: &str = "x-github-event";
const HEADER_DELIVERY: &str = "x-github-delivery";
const HEADER_SIGNATURE: &str = "x-hub-signature-256";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] ParseError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingHeader(_) => StatusCode::BAD_REQUEST,
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
        };

        (status, self.to_string()).into_response()
    }
}

/// Webhook handler.
///
/// # Response
///
/// - 202 Accepted: verified; any subscription change is applied in the
///   background
/// - 400 Bad Request: missing header or malformed payload
/// - 401 Unauthorized: invalid signature
pub async fn webhook_handler<A: Authenticator>(
    State(app_state): State<AppState<A>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let event_type = get_header(&headers, HEADER_EVENT)?;
    let delivery_id = get_header(&headers, HEADER_DELIVERY)?;
    let signature_header = get_header(&headers, HEADER_SIGNATURE)?;

    debug!(delivery_id = %delivery_id, event_type = %event_type, "Received webhook");

    // Nothing is parsed before the signature checks out.
    if !app_state.webhook_secret().verify(&body, &signature_header) {
        warn!(delivery_id = %delivery_id, "Invalid webhook signature");
        return Err(WebhookError::InvalidSignature);
    }

    let Some(event) = parse_webhook(&event_type, &body)? else {
        debug!(delivery_id = %delivery_id, event_type = %event_type, "Ignoring event");
        return Ok((StatusCode::ACCEPTED, "Accepted"));
    };

    info!(
        delivery_id = %delivery_id,
        installation = %event.installation(),
        repositories = event.repositories().len(),
        "Applying subscription change"
    );
    tokio::spawn(apply_event(Arc::clone(app_state.registry()), event));

    Ok((StatusCode::ACCEPTED, "Accepted"))
}

/// Applies a subscription change to the registry.
///
/// Failures are logged per repository; one repository failing does not stop
/// the others.
pub async fn apply_event<A: Authenticator>(registry: Arc<SubscriptionRegistry<A>>, event: SubscriptionEvent) {
    match event {
        SubscriptionEvent::Subscribe {
            installation,
            repositories,
        } => {
            for repo in repositories {
                let name = repo.full_name();
                if let Err(e) = registry.add(repo, installation).await {
                    warn!(repo = %name, error = %e, "Failed to subscribe repository");
                }
            }
        }
        SubscriptionEvent::Unsubscribe { repositories, .. } => {
            for repo in repositories {
                registry.remove(repo.id).await;
            }
        }
    }
}

fn get_header(headers: &HeaderMap, name: &'static str) -> Result<String, WebhookError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or(WebhookError::MissingHeader(name))
}
