//! HTTP server for the scheduled merge bot.
//!
//! # Endpoints
//!
//! - `POST /webhook` - GitHub webhook deliveries (returns 202 Accepted)
//! - `GET /api/v1/subscriptions` - Subscribed repositories as JSON
//! - `GET /api/v1/subscriptions/{repository_id}` - One subscription
//! - `GET /health` - Returns 200 if the server is running

use std::sync::Arc;

use crate::github::Authenticator;
use crate::registry::SubscriptionRegistry;
use crate::webhooks::WebhookSecret;

pub mod health;
pub mod subscriptions;
pub mod webhook;

pub use health::health_handler;
pub use subscriptions::{subscription_handler, subscriptions_handler};
pub use webhook::{apply_event, webhook_handler};

/// Shared application state, passed to handlers via axum's `State`.
pub struct AppState<A: Authenticator> {
    inner: Arc<AppStateInner<A>>,
}

struct AppStateInner<A: Authenticator> {
    registry: Arc<SubscriptionRegistry<A>>,
    webhook_secret: WebhookSecret,
}

// Manual impl: cloning shares the inner state and needs no `A: Clone`.
impl<A: Authenticator> Clone for AppState<A> {
    fn clone(&self) -> Self {
        AppState {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: Authenticator> AppState<A> {
    pub fn new(registry: Arc<SubscriptionRegistry<A>>, webhook_secret: WebhookSecret) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                registry,
                webhook_secret,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry<A>> {
        &self.inner.registry
    }

    pub fn webhook_secret(&self) -> &WebhookSecret {
        &self.inner.webhook_secret
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router<A: Authenticator>(app_state: AppState<A>) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook", post(webhook_handler::<A>))
        .route("/api/v1/subscriptions", get(subscriptions_handler::<A>))
        .route("/api/v1/subscriptions/{repository_id}", get(subscription_handler::<A>))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
