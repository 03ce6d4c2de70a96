//! Error taxonomy for the storefront

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShopError {
    /// Malformed form input, reported per field.
    #[error("validation failed")]
    Validation(#[from] validator::ValidationErrors),

    /// Stale client secret, wrong order status, or a concurrent
    /// modification. Always surfaced generically so callers probing
    /// checkout URLs learn nothing about order state.
    #[error("state conflict")]
    StateConflict,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Payment processor unreachable or it rejected the request.
    #[error("payment gateway error: {0}")]
    Gateway(String),

    /// Invariant breach (dual ownership, duplicate product line).
    #[error("integrity violation: {0}")]
    Integrity(&'static str),

    /// Webhook payload failed signature verification. Rejected outright,
    /// never processed.
    #[error("webhook signature rejected")]
    SignatureRejected,

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, ShopError>;

impl IntoResponse for ShopError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ShopError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({ "errors": errors }),
            ),
            ShopError::StateConflict => (
                StatusCode::CONFLICT,
                serde_json::json!({ "error": "Please refresh the page and try again." }),
            ),
            ShopError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({ "error": format!("{what} not found") }),
            ),
            ShopError::Gateway(reason) => {
                tracing::error!(%reason, "payment gateway failure");
                (
                    StatusCode::BAD_GATEWAY,
                    serde_json::json!({ "error": "Payment system unavailable, please try again." }),
                )
            }
            ShopError::Integrity(what) => {
                tracing::error!(%what, "integrity violation");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": "Internal error" }),
                )
            }
            ShopError::SignatureRejected => {
                tracing::warn!("rejected webhook with bad signature");
                (
                    StatusCode::BAD_REQUEST,
                    serde_json::json!({ "error": "invalid signature" }),
                )
            }
            ShopError::Database(e) => {
                tracing::error!(error = %e, "database failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": "Internal error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_generic() {
        let resp = ShopError::StateConflict.into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_not_found_status() {
        let resp = ShopError::NotFound("product").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
