//! Checkout and order reconciliation
//!
//! Checkout snapshots a live cart into a frozen, priced copy, pins a
//! payment intent to that total, and then reconciles order status from
//! signed processor webhooks. Resuming checkout never mutates an old
//! snapshot: a diverged cart gets a fresh snapshot and the superseded
//! one is deleted in the same transaction that repoints the order.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Form, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;
use validator::Validate;

use crate::domain::identity::SessionData;
use crate::domain::order::{self, OrderStatus, PricedLine, ResumePlan, Snapshot};
use crate::error::{Result, ShopError};
use crate::events::OrderEvent;
use crate::session::{self, Identity};
use crate::{cart, AppState};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderRecord {
    pub id: Uuid,
    pub payment_intent: String,
    pub client_secret: String,
    pub status: String,
    pub user_id: Option<Uuid>,
    pub email: String,
    pub cart_id: Option<Uuid>,
    pub frozen_cart_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    pub fn status(&self) -> Result<OrderStatus> {
        OrderStatus::parse(&self.status).ok_or(ShopError::Integrity("unknown order status"))
    }
}

// ---------------------------------------------------------------------
// Snapshot storage
// ---------------------------------------------------------------------

/// Live cart lines joined with current catalog data, the input to both
/// snapshotting and the divergence check.
async fn priced_lines(tx: &mut Transaction<'_, Postgres>, cart_id: Uuid) -> Result<Vec<PricedLine>> {
    #[derive(sqlx::FromRow)]
    struct Row {
        product_id: Uuid,
        name: String,
        description: String,
        unit_price_cents: i64,
        quantity: i32,
    }
    let rows = sqlx::query_as::<_, Row>(
        "SELECT cl.product_id, p.name, p.description, p.price_cents AS unit_price_cents, cl.quantity \
         FROM cart_lines cl JOIN products p ON p.id = cl.product_id \
         WHERE cl.cart_id = $1 ORDER BY p.name",
    )
    .bind(cart_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| PricedLine {
            product_id: r.product_id,
            name: r.name,
            description: r.description,
            unit_price_cents: r.unit_price_cents,
            quantity: r.quantity,
        })
        .collect())
}

async fn insert_snapshot(
    tx: &mut Transaction<'_, Postgres>,
    snapshot: &Snapshot,
    currency: &str,
) -> Result<Uuid> {
    let frozen_cart_id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO frozen_carts (id, total_cents, currency, cart_updated_at, created_at) \
         VALUES ($1, $2, $3, $4, NOW())",
    )
    .bind(frozen_cart_id)
    .bind(snapshot.total_cents)
    .bind(currency)
    .bind(snapshot.cart_updated_at)
    .execute(&mut **tx)
    .await?;
    for line in &snapshot.lines {
        sqlx::query(
            "INSERT INTO frozen_cart_items \
             (id, frozen_cart_id, product_id, name, description, unit_price_cents, quantity) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(Uuid::now_v7())
        .bind(frozen_cart_id)
        .bind(line.product_id)
        .bind(&line.name)
        .bind(&line.description)
        .bind(line.unit_price_cents)
        .bind(line.quantity)
        .execute(&mut **tx)
        .await?;
    }
    Ok(frozen_cart_id)
}

async fn load_snapshot(tx: &mut Transaction<'_, Postgres>, frozen_cart_id: Uuid) -> Result<Snapshot> {
    #[derive(sqlx::FromRow)]
    struct CartRow {
        total_cents: i64,
        cart_updated_at: DateTime<Utc>,
    }
    #[derive(sqlx::FromRow)]
    struct ItemRow {
        product_id: Option<Uuid>,
        name: String,
        description: String,
        unit_price_cents: i64,
        quantity: i32,
    }
    let head = sqlx::query_as::<_, CartRow>(
        "SELECT total_cents, cart_updated_at FROM frozen_carts WHERE id = $1",
    )
    .bind(frozen_cart_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(ShopError::Integrity("order snapshot missing"))?;
    let items = sqlx::query_as::<_, ItemRow>(
        "SELECT product_id, name, description, unit_price_cents, quantity \
         FROM frozen_cart_items WHERE frozen_cart_id = $1 ORDER BY name",
    )
    .bind(frozen_cart_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(Snapshot {
        lines: items
            .into_iter()
            .map(|r| order::FrozenLine {
                product_id: r.product_id,
                name: r.name,
                description: r.description,
                unit_price_cents: r.unit_price_cents,
                quantity: r.quantity,
            })
            .collect(),
        total_cents: head.total_cents,
        cart_updated_at: head.cart_updated_at,
    })
}

// ---------------------------------------------------------------------
// Order lookups
// ---------------------------------------------------------------------

async fn order_for_update_by_id(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<OrderRecord>> {
    Ok(
        sqlx::query_as::<_, OrderRecord>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?,
    )
}

async fn order_for_update_by_intent(
    tx: &mut Transaction<'_, Postgres>,
    payment_intent: &str,
) -> Result<Option<OrderRecord>> {
    Ok(sqlx::query_as::<_, OrderRecord>(
        "SELECT * FROM orders WHERE payment_intent = $1 FOR UPDATE",
    )
    .bind(payment_intent)
    .fetch_optional(&mut **tx)
    .await?)
}

/// The order this identity context is mid-checkout on: the session's
/// pointer first, else the user's most recent Created order.
async fn find_checkout_order(
    tx: &mut Transaction<'_, Postgres>,
    identity: &Identity,
    session_data: &SessionData,
) -> Result<Option<OrderRecord>> {
    if let Some(order_id) = session_data.checkout_order_id {
        if let Some(order) = order_for_update_by_id(tx, order_id).await? {
            return Ok(Some(order));
        }
    }
    let Some(user_id) = identity.user_id else {
        return Ok(None);
    };
    Ok(sqlx::query_as::<_, OrderRecord>(
        "SELECT * FROM orders WHERE user_id = $1 AND status = 'created' \
         ORDER BY created_at DESC LIMIT 1 FOR UPDATE",
    )
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?)
}

// ---------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AddressRecord {
    pub id: Uuid,
    #[serde(skip)]
    pub user_id: Option<Uuid>,
    #[serde(skip)]
    pub order_id: Option<Uuid>,
    pub name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

async fn saved_user_address(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<Option<AddressRecord>> {
    Ok(
        sqlx::query_as::<_, AddressRecord>("SELECT * FROM addresses WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await?,
    )
}

async fn upsert_order_address(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    form: &OrderDetailsForm,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO addresses (id, order_id, name, line1, line2, city, state, postal_code, country) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (order_id) WHERE order_id IS NOT NULL DO UPDATE SET \
           name = EXCLUDED.name, line1 = EXCLUDED.line1, line2 = EXCLUDED.line2, \
           city = EXCLUDED.city, state = EXCLUDED.state, \
           postal_code = EXCLUDED.postal_code, country = EXCLUDED.country",
    )
    .bind(Uuid::now_v7())
    .bind(order_id)
    .bind(&form.name)
    .bind(&form.line1)
    .bind(&form.line2)
    .bind(&form.city)
    .bind(&form.state)
    .bind(&form.postal_code)
    .bind(&form.country)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_user_address(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    form: &OrderDetailsForm,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO addresses (id, user_id, name, line1, line2, city, state, postal_code, country) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (user_id) WHERE user_id IS NOT NULL DO UPDATE SET \
           name = EXCLUDED.name, line1 = EXCLUDED.line1, line2 = EXCLUDED.line2, \
           city = EXCLUDED.city, state = EXCLUDED.state, \
           postal_code = EXCLUDED.postal_code, country = EXCLUDED.country",
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .bind(&form.name)
    .bind(&form.line1)
    .bind(&form.line2)
    .bind(&form.city)
    .bind(&form.state)
    .bind(&form.postal_code)
    .bind(&form.country)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------
// Begin or resume checkout
// ---------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct CheckoutItemView {
    pub product_id: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct CheckoutView {
    pub order_id: Uuid,
    pub payment_intent: String,
    pub client_secret: String,
    pub public_key: String,
    pub total_cents: i64,
    pub currency: String,
    pub items: Vec<CheckoutItemView>,
    pub saved_address: Option<AddressRecord>,
}

fn items_from_snapshot(snapshot: &Snapshot) -> Vec<CheckoutItemView> {
    snapshot
        .lines
        .iter()
        .map(|l| CheckoutItemView {
            product_id: l.product_id,
            name: l.name.clone(),
            description: l.description.clone(),
            quantity: l.quantity,
            unit_price_cents: l.unit_price_cents,
            line_total_cents: l.unit_price_cents * i64::from(l.quantity),
        })
        .collect()
}

/// GET checkout: idempotent begin-or-resume.
///
/// An empty or missing cart redirects back to the cart view instead of
/// erroring.
pub async fn get_checkout(State(state): State<AppState>, identity: Identity) -> Result<Response> {
    let mut tx = state.db.begin().await?;
    let mut session_data = session::load_session(&mut *tx, &identity.session_token).await?;

    let Some(cart_record) =
        cart::resolve_request_cart(&mut tx, &identity, &mut session_data, false).await?
    else {
        session::save_session(
            &mut *tx,
            &identity.session_token,
            &session_data,
            state.config.session_ttl_days,
        )
        .await?;
        tx.commit().await?;
        return Ok(Redirect::to("/api/v1/cart").into_response());
    };
    let live = priced_lines(&mut tx, cart_record.id).await?;
    if live.is_empty() {
        session::save_session(
            &mut *tx,
            &identity.session_token,
            &session_data,
            state.config.session_ttl_days,
        )
        .await?;
        tx.commit().await?;
        return Ok(Redirect::to("/api/v1/cart").into_response());
    }

    let existing = find_checkout_order(&mut tx, &identity, &session_data).await?;
    let resumable = match existing {
        Some(order) if order.status()? == OrderStatus::Created => Some(order),
        _ => None,
    };

    let mut created_event = None;
    let (order, snapshot) = match resumable {
        Some(order) => {
            let snapshot = load_snapshot(&mut tx, order.frozen_cart_id).await?;
            match order::plan_resume(&snapshot, &live, cart_record.updated_at) {
                ResumePlan::Reuse => {
                    let order = if order.cart_id == Some(cart_record.id) {
                        order
                    } else {
                        // cart was merged or recreated since the order began
                        sqlx::query_as::<_, OrderRecord>(
                            "UPDATE orders SET cart_id = $2, updated_at = NOW() \
                             WHERE id = $1 RETURNING *",
                        )
                        .bind(order.id)
                        .bind(cart_record.id)
                        .fetch_one(&mut *tx)
                        .await?
                    };
                    (order, snapshot)
                }
                ResumePlan::Replace { new_total_cents, amount_changed } => {
                    let client_secret = if amount_changed {
                        state
                            .gateway
                            .modify(&order.payment_intent, new_total_cents)
                            .await?
                    } else {
                        order.client_secret.clone()
                    };
                    let fresh = Snapshot::capture(&live, cart_record.updated_at);
                    let new_frozen_id = insert_snapshot(&mut tx, &fresh, &state.config.currency).await?;
                    let old_frozen_id = order.frozen_cart_id;
                    let order = sqlx::query_as::<_, OrderRecord>(
                        "UPDATE orders SET frozen_cart_id = $2, client_secret = $3, \
                         cart_id = $4, updated_at = NOW() WHERE id = $1 RETURNING *",
                    )
                    .bind(order.id)
                    .bind(new_frozen_id)
                    .bind(&client_secret)
                    .bind(cart_record.id)
                    .fetch_one(&mut *tx)
                    .await?;
                    sqlx::query("DELETE FROM frozen_carts WHERE id = $1")
                        .bind(old_frozen_id)
                        .execute(&mut *tx)
                        .await?;
                    (order, fresh)
                }
            }
        }
        None => {
            let snapshot = Snapshot::capture(&live, cart_record.updated_at);
            let intent = state
                .gateway
                .create(snapshot.total_cents, &state.config.currency)
                .await?;
            let frozen_id = insert_snapshot(&mut tx, &snapshot, &state.config.currency).await?;
            let order = sqlx::query_as::<_, OrderRecord>(
                "INSERT INTO orders \
                 (id, payment_intent, client_secret, status, user_id, email, cart_id, frozen_cart_id, created_at, updated_at) \
                 VALUES ($1, $2, $3, 'created', $4, '', $5, $6, NOW(), NOW()) RETURNING *",
            )
            .bind(Uuid::now_v7())
            .bind(&intent.id)
            .bind(&intent.client_secret)
            .bind(identity.user_id)
            .bind(cart_record.id)
            .bind(frozen_id)
            .fetch_one(&mut *tx)
            .await?;
            created_event = Some(OrderEvent::OrderCreated {
                order_id: order.id,
                payment_intent: order.payment_intent.clone(),
                total_cents: snapshot.total_cents,
                currency: state.config.currency.clone(),
            });
            (order, snapshot)
        }
    };

    session_data.remember_order(order.id, state.config.session_order_history_max);
    let saved_address = match identity.user_id {
        Some(user_id) => saved_user_address(&mut tx, user_id).await?,
        None => None,
    };
    session::save_session(
        &mut *tx,
        &identity.session_token,
        &session_data,
        state.config.session_ttl_days,
    )
    .await?;
    tx.commit().await?;

    if let Some(event) = created_event {
        state.events.publish(event).await;
    }

    Ok(Json(CheckoutView {
        order_id: order.id,
        payment_intent: order.payment_intent,
        client_secret: order.client_secret,
        public_key: state.config.stripe_public_key.clone(),
        total_cents: snapshot.total_cents,
        currency: state.config.currency.clone(),
        items: items_from_snapshot(&snapshot),
        saved_address,
    })
    .into_response())
}

// ---------------------------------------------------------------------
// Details update
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct OrderDetailsForm {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 2, max = 10))]
    pub country: String,
    #[validate(length(min = 1, max = 10))]
    pub postal_code: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub line1: String,
    #[validate(length(max = 100))]
    pub line2: Option<String>,
    /// The client secret the browser is holding, checked against the
    /// order's recorded secret before anything is mutated.
    #[validate(length(min = 1, max = 200))]
    pub payment_intent: String,
    #[serde(default)]
    pub save_address: bool,
}

/// POST checkout details: email and shipping address, gated on the
/// client secret and the order still being Created.
pub async fn post_details(
    State(state): State<AppState>,
    identity: Identity,
    Form(form): Form<OrderDetailsForm>,
) -> Result<Json<serde_json::Value>> {
    form.validate()?;

    let mut tx = state.db.begin().await?;
    let session_data = session::load_session(&mut *tx, &identity.session_token).await?;
    let order = find_checkout_order(&mut tx, &identity, &session_data)
        .await?
        .ok_or(ShopError::StateConflict)?;

    if !order::details_update_allowed(order.status()?, &order.client_secret, &form.payment_intent) {
        return Err(ShopError::StateConflict);
    }

    sqlx::query(
        "UPDATE orders SET email = $2, status = 'pending', user_id = COALESCE($3, user_id), \
         updated_at = NOW() WHERE id = $1",
    )
    .bind(order.id)
    .bind(&form.email)
    .bind(identity.user_id)
    .execute(&mut *tx)
    .await?;
    upsert_order_address(&mut tx, order.id, &form).await?;
    if let Some(user_id) = identity.user_id {
        if form.save_address {
            upsert_user_address(&mut tx, user_id, &form).await?;
        }
    }
    tx.commit().await?;

    Ok(Json(serde_json::json!({ "status": "pending" })))
}

// ---------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------

pub async fn post_cancel(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<serde_json::Value>> {
    let mut tx = state.db.begin().await?;
    let mut session_data = session::load_session(&mut *tx, &identity.session_token).await?;
    let order = find_checkout_order(&mut tx, &identity, &session_data)
        .await?
        .ok_or(ShopError::StateConflict)?;
    if !order.status()?.can_transition(OrderStatus::Canceled) {
        return Err(ShopError::StateConflict);
    }

    state.gateway.cancel(&order.payment_intent).await?;
    sqlx::query("UPDATE orders SET status = 'canceled', updated_at = NOW() WHERE id = $1")
        .bind(order.id)
        .execute(&mut *tx)
        .await?;
    session_data.forget_checkout_order();
    session::save_session(
        &mut *tx,
        &identity.session_token,
        &session_data,
        state.config.session_ttl_days,
    )
    .await?;
    tx.commit().await?;

    state
        .events
        .publish(OrderEvent::OrderCanceled {
            order_id: order.id,
            payment_intent: order.payment_intent.clone(),
        })
        .await;
    Ok(Json(serde_json::json!({ "status": "canceled" })))
}

// ---------------------------------------------------------------------
// Webhook reconciliation
// ---------------------------------------------------------------------

/// POST from the payment processor. Signature is verified before the
/// payload is even parsed; events are deduplicated by id, and the
/// status guard makes replays harmless on top of that.
pub async fn post_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(ShopError::SignatureRejected)?;
    let event = state.webhooks.verify_and_parse(body.as_bytes(), signature)?;

    let mut tx = state.db.begin().await?;
    let fresh = sqlx::query(
        "INSERT INTO processed_payment_events (event_id, received_at) VALUES ($1, NOW()) \
         ON CONFLICT (event_id) DO NOTHING",
    )
    .bind(&event.id)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if fresh == 0 {
        tx.commit().await?;
        tracing::info!(event_id = %event.id, "skipping already processed webhook event");
        return Ok(Json(serde_json::json!({ "received": true })));
    }

    let mut lifecycle_event = None;
    match event.kind.as_str() {
        "payment_intent.succeeded" => {
            let Some(order) = order_for_update_by_intent(&mut tx, &event.data.object.id).await?
            else {
                tracing::warn!(payment_intent = %event.data.object.id, "webhook for unknown order");
                tx.commit().await?;
                return Ok(Json(serde_json::json!({ "received": true })));
            };
            if order::mark_paid(order.status()?).is_some() {
                sqlx::query("UPDATE orders SET status = 'success', updated_at = NOW() WHERE id = $1")
                    .bind(order.id)
                    .execute(&mut *tx)
                    .await?;
                // the single point where a live cart is cleared on payment
                if let Some(cart_id) = order.cart_id {
                    sqlx::query("DELETE FROM carts WHERE id = $1")
                        .bind(cart_id)
                        .execute(&mut *tx)
                        .await?;
                }
                lifecycle_event = Some(OrderEvent::OrderPaid {
                    order_id: order.id,
                    payment_intent: order.payment_intent.clone(),
                });
            }
        }
        "payment_intent.canceled" => {
            if let Some(order) = order_for_update_by_intent(&mut tx, &event.data.object.id).await? {
                if order.status()?.can_transition(OrderStatus::Canceled) {
                    sqlx::query(
                        "UPDATE orders SET status = 'canceled', updated_at = NOW() WHERE id = $1",
                    )
                    .bind(order.id)
                    .execute(&mut *tx)
                    .await?;
                    lifecycle_event = Some(OrderEvent::OrderCanceled {
                        order_id: order.id,
                        payment_intent: order.payment_intent.clone(),
                    });
                }
            }
        }
        other => {
            tracing::info!(kind = %other, "acknowledging unrecognized webhook event type");
        }
    }
    tx.commit().await?;

    if let Some(event) = lifecycle_event {
        state.events.publish(event).await;
    }
    Ok(Json(serde_json::json!({ "received": true })))
}

// ---------------------------------------------------------------------
// Success confirmation
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CompleteParams {
    pub payment_intent: String,
    pub payment_intent_client_secret: String,
}

/// GET after the processor redirects back. Valid only when the
/// remembered order is Success and the supplied secret matches; a
/// still-Pending order gets a "processing" response because the webhook
/// can lag the redirect. Which check failed is never revealed.
pub async fn get_complete(
    State(state): State<AppState>,
    identity: Identity,
    Query(params): Query<CompleteParams>,
) -> Result<Json<serde_json::Value>> {
    let mut tx = state.db.begin().await?;
    let mut session_data = session::load_session(&mut *tx, &identity.session_token).await?;
    let order_id = session_data.checkout_order_id.ok_or(ShopError::StateConflict)?;
    let order = order_for_update_by_id(&mut tx, order_id)
        .await?
        .ok_or(ShopError::StateConflict)?;

    if order.payment_intent != params.payment_intent
        || !order::secrets_match(&order.client_secret, &params.payment_intent_client_secret)
    {
        return Err(ShopError::StateConflict);
    }

    match order.status()? {
        OrderStatus::Success => {
            let snapshot = load_snapshot(&mut tx, order.frozen_cart_id).await?;
            session_data.forget_checkout_order();
            session::save_session(
                &mut *tx,
                &identity.session_token,
                &session_data,
                state.config.session_ttl_days,
            )
            .await?;
            tx.commit().await?;
            Ok(Json(serde_json::json!({
                "status": "success",
                "order_id": order.id,
                "email": order.email,
                "total_cents": snapshot.total_cents,
                "currency": state.config.currency,
            })))
        }
        OrderStatus::Created | OrderStatus::Pending => {
            tx.commit().await?;
            Ok(Json(serde_json::json!({ "status": "processing" })))
        }
        OrderStatus::Canceled => Err(ShopError::StateConflict),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_form() -> OrderDetailsForm {
        OrderDetailsForm {
            email: "dtm@alldoggos.com".into(),
            name: "Doggo Tea Master".into(),
            country: "AU".into(),
            postal_code: "2000".into(),
            state: "NSW".into(),
            city: "Sydney".into(),
            line1: "1 Tea St".into(),
            line2: None,
            payment_intent: "pi_123_secret_456".into(),
            save_address: false,
        }
    }

    #[test]
    fn test_details_form_accepts_valid_input() {
        assert!(valid_form().validate().is_ok());
    }

    #[test]
    fn test_details_form_rejects_bad_email() {
        let form = OrderDetailsForm { email: "not-an-email".into(), ..valid_form() };
        assert!(form.validate().is_err());
    }

    #[test]
    fn test_details_form_rejects_empty_address() {
        let form = OrderDetailsForm { line1: String::new(), ..valid_form() };
        assert!(form.validate().is_err());
    }

    #[test]
    fn test_unknown_status_is_integrity_error() {
        let record = OrderRecord {
            id: Uuid::new_v4(),
            payment_intent: "pi_1".into(),
            client_secret: "secret".into(),
            status: "refunded".into(),
            user_id: None,
            email: String::new(),
            cart_id: None,
            frozen_cart_id: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(record.status().is_err());
    }

    #[test]
    fn test_snapshot_view_totals() {
        let snapshot = Snapshot {
            lines: vec![order::FrozenLine {
                product_id: Some(Uuid::new_v4()),
                name: "The best oolong tea".into(),
                description: "Sooo fragrant".into(),
                unit_price_cents: 500,
                quantity: 3,
            }],
            total_cents: 1500,
            cart_updated_at: Utc::now(),
        };
        let items = items_from_snapshot(&snapshot);
        assert_eq!(items[0].line_total_cents, 1500);
        assert_eq!(order::total_cents(&[]), 0);
    }
}
