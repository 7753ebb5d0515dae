//! Read-only view of the subscription registry.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::AppState;
use crate::github::Authenticator;
use crate::registry::SubscriptionInfo;
use crate::types::RepositoryId;

/// `GET /api/v1/subscriptions`
pub async fn subscriptions_handler<A: Authenticator>(
    State(app_state): State<AppState<A>>,
) -> Json<Vec<SubscriptionInfo>> {
    Json(app_state.registry().subscriptions().await)
}

/// `GET /api/v1/subscriptions/{repository_id}`; 404 when not subscribed.
pub async fn subscription_handler<A: Authenticator>(
    State(app_state): State<AppState<A>>,
    Path(repository_id): Path<u64>,
) -> Response {
    let id = RepositoryId(repository_id);
    match app_state
        .registry()
        .subscriptions()
        .await
        .into_iter()
        .find(|info| info.repository_id == id)
    {
        Some(info) => Json(info).into_response(),
        None => (StatusCode::NOT_FOUND, format!("repository {id} is not subscribed")).into_response(),
    }
}
