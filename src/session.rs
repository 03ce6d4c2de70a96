//! Session and identity adapter
//!
//! Authentication lives upstream. The contract here is narrow: every
//! shopper request carries an opaque `x-session-token`, and the auth
//! layer adds `x-user-id` once the visitor is logged in. Alongside that
//! we keep a small per-token key-value record (current cart, in-flight
//! checkout order, bounded order history) in Postgres.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sqlx::PgExecutor;
use uuid::Uuid;
use validator::{ValidationError, ValidationErrors};

use crate::domain::identity::{Owner, SessionData};
use crate::error::{Result, ShopError};

/// The identity context of one request.
#[derive(Clone, Debug)]
pub struct Identity {
    pub session_token: String,
    pub user_id: Option<Uuid>,
}

impl Identity {
    pub fn owner(&self) -> Owner {
        match self.user_id {
            Some(id) => Owner::User(id),
            None => Owner::Session(self.session_token.clone()),
        }
    }
}

fn header_error(field: &'static str) -> ShopError {
    let mut errors = ValidationErrors::new();
    errors.add(field, ValidationError::new("invalid"));
    ShopError::Validation(errors)
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ShopError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let session_token = parts
            .headers
            .get("x-session-token")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| header_error("x-session-token"))?;

        let user_id = match parts.headers.get("x-user-id") {
            None => None,
            Some(raw) => {
                let parsed = raw.to_str().ok().and_then(|v| Uuid::parse_str(v).ok());
                Some(parsed.ok_or_else(|| header_error("x-user-id"))?)
            }
        };

        Ok(Identity { session_token, user_id })
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    cart_id: Option<Uuid>,
    checkout_order_id: Option<Uuid>,
    order_history: Vec<Uuid>,
}

/// Load the session record, treating expired rows as absent.
pub async fn load_session<'e, E: PgExecutor<'e>>(executor: E, token: &str) -> Result<SessionData> {
    let row = sqlx::query_as::<_, SessionRow>(
        "SELECT cart_id, checkout_order_id, order_history FROM sessions \
         WHERE token = $1 AND expires_at > NOW()",
    )
    .bind(token)
    .fetch_optional(executor)
    .await?;
    Ok(row
        .map(|r| SessionData {
            cart_id: r.cart_id,
            checkout_order_id: r.checkout_order_id,
            order_history: r.order_history,
        })
        .unwrap_or_default())
}

/// Upsert the session record, sliding its expiry forward.
pub async fn save_session<'e, E: PgExecutor<'e>>(
    executor: E,
    token: &str,
    data: &SessionData,
    ttl_days: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO sessions (token, cart_id, checkout_order_id, order_history, expires_at, updated_at) \
         VALUES ($1, $2, $3, $4, NOW() + make_interval(days => $5), NOW()) \
         ON CONFLICT (token) DO UPDATE SET \
           cart_id = EXCLUDED.cart_id, \
           checkout_order_id = EXCLUDED.checkout_order_id, \
           order_history = EXCLUDED.order_history, \
           expires_at = EXCLUDED.expires_at, \
           updated_at = NOW()",
    )
    .bind(token)
    .bind(data.cart_id)
    .bind(data.checkout_order_id)
    .bind(&data.order_history)
    .bind(i32::try_from(ttl_days).unwrap_or(14))
    .execute(executor)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(req: Request<()>) -> Result<Identity> {
        let (mut parts, _) = req.into_parts();
        Identity::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_session_token_required() {
        let req = Request::builder().uri("/api/v1/cart").body(()).unwrap();
        assert!(extract(req).await.is_err());
    }

    #[tokio::test]
    async fn test_anonymous_identity() {
        let req = Request::builder()
            .uri("/api/v1/cart")
            .header("x-session-token", "tok-123")
            .body(())
            .unwrap();
        let identity = extract(req).await.unwrap();
        assert_eq!(identity.session_token, "tok-123");
        assert_eq!(identity.user_id, None);
        assert_eq!(identity.owner(), Owner::Session("tok-123".into()));
    }

    #[tokio::test]
    async fn test_authenticated_identity() {
        let user = Uuid::new_v4();
        let req = Request::builder()
            .uri("/api/v1/cart")
            .header("x-session-token", "tok-123")
            .header("x-user-id", user.to_string())
            .body(())
            .unwrap();
        let identity = extract(req).await.unwrap();
        assert_eq!(identity.owner(), Owner::User(user));
    }

    #[tokio::test]
    async fn test_malformed_user_id_rejected() {
        let req = Request::builder()
            .uri("/api/v1/cart")
            .header("x-session-token", "tok-123")
            .header("x-user-id", "not-a-uuid")
            .body(())
            .unwrap();
        assert!(extract(req).await.is_err());
    }
}
