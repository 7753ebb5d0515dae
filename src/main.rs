use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scheduled_merge::config::{Credentials, ServiceConfig};
use scheduled_merge::github::{AppAuthenticator, Authenticator, OctocrabClient, TokenAuthenticator};
use scheduled_merge::registry::SubscriptionRegistry;
use scheduled_merge::server::{AppState, build_router};
use scheduled_merge::webhooks::WebhookSecret;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is normal in production.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scheduled_merge=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::from_env().context("reading configuration")?;
    info!(?config, "Starting scheduled merge bot");

    let ServiceConfig {
        credentials,
        webhook_secret,
        bind,
        api_url,
    } = config;
    let secret = WebhookSecret::new(webhook_secret);

    match credentials {
        Credentials::App { app_id, private_key } => {
            let auth = AppAuthenticator::new(app_id, &private_key, api_url.as_deref())
                .context("reading the GitHub App private key")?;
            serve(auth, secret, bind).await
        }
        Credentials::Token { token, repositories } => {
            warn!(
                repositories = ?repositories,
                "Running on a token; only the listed repositories are subscribed"
            );
            let client = OctocrabClient::from_token(token.expose_secret(), api_url.as_deref())
                .context("building GitHub client")?;
            serve(TokenAuthenticator::new(client, repositories), secret, bind).await
        }
    }
}

async fn serve<A: Authenticator>(auth: A, secret: WebhookSecret, bind: SocketAddr) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let registry = Arc::new(SubscriptionRegistry::new_with_shutdown(
        Arc::new(auth),
        shutdown.child_token(),
    ));

    // Startup reconciliation runs alongside the server so a slow GitHub
    // does not delay accepting webhooks.
    tokio::spawn({
        let registry = Arc::clone(&registry);
        async move {
            if let Err(e) = registry.reconcile().await {
                warn!(error = %e, "Startup reconciliation failed");
            }
        }
    });

    let app = build_router(AppState::new(Arc::clone(&registry), secret));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!("listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Failed to listen for ctrl-c");
                }
                info!("Shutdown signal received");
                shutdown.cancel();
            }
        })
        .await
        .context("serving HTTP")?;

    registry.shutdown_all().await;
    info!("Stopped");
    Ok(())
}
