//! Tea shop storefront service
//!
//! Backend for a small tea store: catalog browsing, shopping carts tied
//! to anonymous sessions and logged-in users, and checkout against the
//! Stripe payment-intent API, reconciled from signed webhooks.
//!
//! ## Features
//! - Product catalog with categories and product types
//! - Session carts merged into user carts at login
//! - Resumable checkout with immutable priced snapshots
//! - Webhook-driven order status reconciliation
//! - Order lifecycle events over NATS

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod payments;
pub mod session;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::events::Publisher;
use crate::payments::{PaymentGateway, WebhookVerifier};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub gateway: Arc<dyn PaymentGateway>,
    pub webhooks: WebhookVerifier,
    pub events: Publisher,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/products", get(catalog::list_products))
        .route("/api/v1/products/featured", get(catalog::featured_products))
        .route("/api/v1/products/:slug", get(catalog::get_product))
        .route("/api/v1/categories", get(catalog::list_categories))
        .route("/api/v1/categories/:slug", get(catalog::get_category))
        .route("/api/v1/product-types", get(catalog::list_product_types))
        .route("/api/v1/product-types/:slug", get(catalog::get_product_type))
        .route("/api/v1/cart", get(cart::get_cart).post(cart::post_cart))
        .route("/api/v1/checkout", get(checkout::get_checkout))
        .route("/api/v1/checkout/details", post(checkout::post_details))
        .route("/api/v1/checkout/cancel", post(checkout::post_cancel))
        .route("/api/v1/checkout/complete", get(checkout::get_complete))
        .route("/api/v1/webhooks/payments", post(checkout::post_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy", "service": "teashop" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    // Lazy pool: never connects unless a handler actually hits the
    // database, so routing-level checks run without Postgres.
    fn test_state() -> AppState {
        let db = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/teashop_test")
            .unwrap();
        AppState {
            db,
            config: Config {
                database_url: "postgres://localhost/teashop_test".into(),
                port: 0,
                currency: "AUD".into(),
                stripe_secret_key: "sk_test_123".into(),
                stripe_public_key: "pk_test_123".into(),
                stripe_webhook_secret: "whsec_test".into(),
                stripe_api_base: "https://api.stripe.com".into(),
                nats_url: None,
                session_order_history_max: 10,
                session_ttl_days: 14,
            },
            gateway: Arc::new(payments::test_support::MockGateway::default()),
            webhooks: WebhookVerifier::new("whsec_test"),
            events: Publisher::disabled(),
        }
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(test_state())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cart_requires_session_token() {
        let response = router(test_state())
            .oneshot(Request::builder().uri("/api/v1/cart").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_checkout_requires_session_token() {
        let response = router(test_state())
            .oneshot(Request::builder().uri("/api/v1/checkout").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unsigned_webhook_rejected() {
        let response = router(test_state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/webhooks/payments")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
