//! Cart engine: storage and HTTP surface
//!
//! Carts are owned by exactly one of a session token or a user id. The
//! session side of that link lives in the session record; the user side
//! is a unique nullable column. Every multi-step mutation locks the cart
//! rows it touches (`FOR UPDATE`) and runs in one transaction, so a
//! mid-merge failure leaves neither cart partially modified and two tabs
//! posting "add to cart" at once cannot lose an update.

use axum::extract::State;
use axum::{Form, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::cart::{AddOutcome, Cart, CartLine, RemoveOutcome};
use crate::domain::identity::{Owner, SessionData};
use crate::error::{Result, ShopError};
use crate::session::{self, Identity};
use crate::{catalog, AppState};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartRecord {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartRecord {
    fn owner(&self, identity: &Identity) -> Owner {
        match self.user_id {
            Some(id) => Owner::User(id),
            None => Owner::Session(identity.session_token.clone()),
        }
    }
}

async fn cart_for_update(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<CartRecord>> {
    Ok(
        sqlx::query_as::<_, CartRecord>("SELECT * FROM carts WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?,
    )
}

async fn user_cart_for_update(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<Option<CartRecord>> {
    Ok(
        sqlx::query_as::<_, CartRecord>("SELECT * FROM carts WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await?,
    )
}

async fn insert_cart(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Option<Uuid>,
) -> Result<CartRecord> {
    Ok(sqlx::query_as::<_, CartRecord>(
        "INSERT INTO carts (id, user_id, created_at, updated_at) \
         VALUES ($1, $2, NOW(), NOW()) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .fetch_one(&mut **tx)
    .await?)
}

async fn load_lines(tx: &mut Transaction<'_, Postgres>, cart_id: Uuid) -> Result<Vec<CartLine>> {
    #[derive(sqlx::FromRow)]
    struct LineRow {
        product_id: Uuid,
        quantity: i32,
    }
    let rows = sqlx::query_as::<_, LineRow>(
        "SELECT product_id, quantity FROM cart_lines WHERE cart_id = $1",
    )
    .bind(cart_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| CartLine { product_id: r.product_id, quantity: r.quantity })
        .collect())
}

async fn load_domain_cart(
    tx: &mut Transaction<'_, Postgres>,
    record: &CartRecord,
    identity: &Identity,
) -> Result<Cart> {
    let mut cart = Cart::new(record.id, record.owner(identity));
    cart.lines = load_lines(tx, record.id).await?;
    cart.updated_at = record.updated_at;
    Ok(cart)
}

async fn touch_cart(tx: &mut Transaction<'_, Postgres>, cart_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
        .bind(cart_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn replace_lines(
    tx: &mut Transaction<'_, Postgres>,
    cart_id: Uuid,
    lines: &[CartLine],
) -> Result<()> {
    sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1")
        .bind(cart_id)
        .execute(&mut **tx)
        .await?;
    for line in lines {
        sqlx::query(
            "INSERT INTO cart_lines (id, cart_id, product_id, quantity) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::now_v7())
        .bind(cart_id)
        .bind(line.product_id)
        .bind(line.quantity)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Absorb `source` into `target` and delete `source`, all inside the
/// caller's transaction.
async fn merge_carts(
    tx: &mut Transaction<'_, Postgres>,
    target: CartRecord,
    source: CartRecord,
    identity: &Identity,
) -> Result<CartRecord> {
    if target.id == source.id {
        return Ok(target);
    }
    let mut merged = load_domain_cart(tx, &target, identity).await?;
    let incoming = load_domain_cart(tx, &source, identity).await?;
    merged.merge_from(incoming);
    replace_lines(tx, target.id, &merged.lines).await?;
    sqlx::query("DELETE FROM carts WHERE id = $1")
        .bind(source.id)
        .execute(&mut **tx)
        .await?;
    touch_cart(tx, target.id).await?;
    Ok(target)
}

/// Resolve the cart for this identity context, merging or adopting a
/// session cart at login. Creates a cart only when `create` is set;
/// reads never materialize an empty cart.
pub async fn resolve_request_cart(
    tx: &mut Transaction<'_, Postgres>,
    identity: &Identity,
    session_data: &mut SessionData,
    create: bool,
) -> Result<Option<CartRecord>> {
    let mut session_cart = match session_data.cart_id {
        Some(id) => cart_for_update(tx, id).await?,
        None => None,
    };
    if session_data.cart_id.is_some() && session_cart.is_none() {
        // dangling pointer, e.g. the cart was cleared on payment
        session_data.cart_id = None;
    }
    // a cart the session points at that already belongs to a user is
    // stale state from a previous login; drop the pointer, not the cart
    if session_cart.as_ref().is_some_and(|c| c.user_id.is_some() && identity.user_id.is_none()) {
        session_data.cart_id = None;
        session_cart = None;
    }

    let Some(user_id) = identity.user_id else {
        if session_cart.is_some() {
            return Ok(session_cart);
        }
        if !create {
            return Ok(None);
        }
        let cart = insert_cart(tx, None).await?;
        session_data.cart_id = Some(cart.id);
        return Ok(Some(cart));
    };

    let user_cart = user_cart_for_update(tx, user_id).await?;
    let resolved = match (user_cart, session_cart) {
        (Some(user_cart), Some(session_cart)) => {
            let merged = merge_carts(tx, user_cart, session_cart, identity).await?;
            session_data.cart_id = None;
            Some(merged)
        }
        (None, Some(session_cart)) => {
            if session_cart.user_id.is_some_and(|owner| owner != user_id) {
                return Err(ShopError::Integrity("cart already owned by another user"));
            }
            let adopted = sqlx::query_as::<_, CartRecord>(
                "UPDATE carts SET user_id = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
            )
            .bind(user_id)
            .bind(session_cart.id)
            .fetch_one(&mut **tx)
            .await?;
            session_data.cart_id = None;
            Some(adopted)
        }
        (Some(user_cart), None) => Some(user_cart),
        (None, None) => None,
    };

    match resolved {
        Some(cart) => Ok(Some(cart)),
        None if create => Ok(Some(insert_cart(tx, Some(user_id)).await?)),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------
// HTTP surface
// ---------------------------------------------------------------------

/// One POST body drives add, set-quantity and remove, mirroring the
/// single cart form the storefront renders per product.
#[derive(Debug, Deserialize)]
pub struct CartItemForm {
    pub product_slug: String,
    pub quantity: Option<i32>,
    #[serde(default)]
    pub set_quantity: bool,
    #[serde(default)]
    pub remove_from_cart: bool,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CartLineView {
    pub product_id: Uuid,
    pub slug: String,
    pub name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub id: Option<Uuid>,
    pub lines: Vec<CartLineView>,
    pub total_cents: i64,
    pub currency: String,
}

async fn render_cart(pool: &PgPool, cart_id: Option<Uuid>, currency: &str) -> Result<CartView> {
    let Some(cart_id) = cart_id else {
        return Ok(CartView {
            id: None,
            lines: Vec::new(),
            total_cents: 0,
            currency: currency.to_string(),
        });
    };
    let lines = sqlx::query_as::<_, CartLineView>(
        "SELECT p.id AS product_id, p.slug, p.name, cl.quantity, p.price_cents AS unit_price_cents, \
                p.price_cents * cl.quantity AS line_total_cents \
         FROM cart_lines cl JOIN products p ON p.id = cl.product_id \
         WHERE cl.cart_id = $1 ORDER BY p.name",
    )
    .bind(cart_id)
    .fetch_all(pool)
    .await?;
    let total_cents = lines.iter().map(|l| l.line_total_cents).sum();
    Ok(CartView {
        id: Some(cart_id),
        lines,
        total_cents,
        currency: currency.to_string(),
    })
}

pub async fn get_cart(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<CartView>> {
    let mut tx = state.db.begin().await?;
    let mut session_data = session::load_session(&mut *tx, &identity.session_token).await?;
    let record = resolve_request_cart(&mut tx, &identity, &mut session_data, false).await?;
    session::save_session(
        &mut *tx,
        &identity.session_token,
        &session_data,
        state.config.session_ttl_days,
    )
    .await?;
    tx.commit().await?;
    let view = render_cart(&state.db, record.map(|c| c.id), &state.config.currency).await?;
    Ok(Json(view))
}

pub async fn post_cart(
    State(state): State<AppState>,
    identity: Identity,
    Form(form): Form<CartItemForm>,
) -> Result<Json<CartView>> {
    let product = catalog::published_product_by_slug(&state.db, &form.product_slug).await?;

    let mut tx = state.db.begin().await?;
    let mut session_data = session::load_session(&mut *tx, &identity.session_token).await?;

    let cart_id = if form.remove_from_cart {
        remove_product(&mut tx, &identity, &mut session_data, product.id).await?
    } else {
        let record = resolve_request_cart(&mut tx, &identity, &mut session_data, true)
            .await?
            .ok_or(ShopError::Integrity("cart creation failed"))?;
        let mut cart = load_domain_cart(&mut tx, &record, &identity).await?;
        match cart.add_product(product.id, form.quantity.unwrap_or(1), form.set_quantity) {
            AddOutcome::Upserted(quantity) => {
                sqlx::query(
                    "INSERT INTO cart_lines (id, cart_id, product_id, quantity) \
                     VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (cart_id, product_id) DO UPDATE SET quantity = $4",
                )
                .bind(Uuid::now_v7())
                .bind(record.id)
                .bind(product.id)
                .bind(quantity)
                .execute(&mut *tx)
                .await?;
                touch_cart(&mut tx, record.id).await?;
            }
            AddOutcome::Ignored => {}
        }
        Some(record.id)
    };

    session::save_session(
        &mut *tx,
        &identity.session_token,
        &session_data,
        state.config.session_ttl_days,
    )
    .await?;
    tx.commit().await?;
    let view = render_cart(&state.db, cart_id, &state.config.currency).await?;
    Ok(Json(view))
}

async fn remove_product(
    tx: &mut Transaction<'_, Postgres>,
    identity: &Identity,
    session_data: &mut SessionData,
    product_id: Uuid,
) -> Result<Option<Uuid>> {
    let Some(record) = resolve_request_cart(tx, identity, session_data, false).await? else {
        return Ok(None);
    };
    let mut cart = load_domain_cart(tx, &record, identity).await?;
    match cart.remove_product(product_id) {
        RemoveOutcome::CartEmptied => {
            // empty carts never linger
            sqlx::query("DELETE FROM carts WHERE id = $1")
                .bind(record.id)
                .execute(&mut **tx)
                .await?;
            if session_data.cart_id == Some(record.id) {
                session_data.cart_id = None;
            }
            Ok(None)
        }
        RemoveOutcome::LineRemoved => {
            sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1 AND product_id = $2")
                .bind(record.id)
                .bind(product_id)
                .execute(&mut **tx)
                .await?;
            touch_cart(tx, record.id).await?;
            Ok(Some(record.id))
        }
        RemoveOutcome::NotPresent => Ok(Some(record.id)),
    }
}

// ---------------------------------------------------------------------
// Maintenance
// ---------------------------------------------------------------------

/// Delete carts tied to expired sessions, the expired session rows, and
/// anonymous carts no live session references. Run from the binary's
/// `remove-orphaned-carts` maintenance mode.
pub async fn remove_orphaned_carts(pool: &PgPool) -> Result<(u64, u64)> {
    let mut tx = pool.begin().await?;
    let expired_carts = sqlx::query(
        "DELETE FROM carts WHERE user_id IS NULL AND id IN \
         (SELECT cart_id FROM sessions WHERE expires_at <= NOW() AND cart_id IS NOT NULL)",
    )
    .execute(&mut *tx)
    .await?
    .rows_affected();
    sqlx::query("DELETE FROM sessions WHERE expires_at <= NOW()")
        .execute(&mut *tx)
        .await?;
    let orphaned_carts = sqlx::query(
        "DELETE FROM carts c WHERE c.user_id IS NULL AND NOT EXISTS \
         (SELECT 1 FROM sessions s WHERE s.cart_id = c.id)",
    )
    .execute(&mut *tx)
    .await?
    .rows_affected();
    tx.commit().await?;
    Ok((expired_carts, orphaned_carts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_defaults() {
        let form: CartItemForm =
            serde_json::from_value(serde_json::json!({ "product_slug": "best-oolong" })).unwrap();
        assert_eq!(form.quantity, None);
        assert!(!form.set_quantity);
        assert!(!form.remove_from_cart);
    }

    #[test]
    fn test_cart_record_owner() {
        let identity = Identity { session_token: "tok".into(), user_id: None };
        let record = CartRecord {
            id: Uuid::new_v4(),
            user_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(record.owner(&identity), Owner::Session("tok".into()));
        let user = Uuid::new_v4();
        let record = CartRecord { user_id: Some(user), ..record };
        assert_eq!(record.owner(&identity), Owner::User(user));
    }
}
