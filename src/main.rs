//! Tea shop storefront binary
//!
//! Wires configuration, the connection pool, migrations, the payment
//! gateway, and the HTTP router. Running `teashop remove-orphaned-carts`
//! performs the cart cleanup pass instead of serving.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use teashop::config::Config;
use teashop::events::Publisher;
use teashop::payments::{StripeGateway, WebhookVerifier};
use teashop::{cart, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("connecting to postgres")?;
    sqlx::migrate!("./migrations").run(&db).await?;

    if std::env::args().nth(1).as_deref() == Some("remove-orphaned-carts") {
        let (expired, orphaned) = cart::remove_orphaned_carts(&db).await?;
        tracing::info!(expired, orphaned, "removed orphaned carts");
        return Ok(());
    }

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, order events disabled");
                None
            }
        },
        None => None,
    };

    let port = config.port;
    let state = AppState {
        gateway: Arc::new(StripeGateway::new(
            config.stripe_secret_key.clone(),
            config.stripe_api_base.clone(),
        )),
        webhooks: WebhookVerifier::new(config.stripe_webhook_secret.clone()),
        events: Publisher::new(nats),
        db,
        config,
    };
    let app = teashop::router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("🚀 Tea shop listening on 0.0.0.0:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
