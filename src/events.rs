//! Order lifecycle events
//!
//! Published to NATS when a broker is configured. Publishing is
//! fire-and-forget: a broker outage must never fail a checkout.

use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    OrderCreated {
        order_id: Uuid,
        payment_intent: String,
        total_cents: i64,
        currency: String,
    },
    OrderPaid {
        order_id: Uuid,
        payment_intent: String,
    },
    OrderCanceled {
        order_id: Uuid,
        payment_intent: String,
    },
}

impl OrderEvent {
    fn subject(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated { .. } => "teashop.orders.created",
            OrderEvent::OrderPaid { .. } => "teashop.orders.paid",
            OrderEvent::OrderCanceled { .. } => "teashop.orders.canceled",
        }
    }
}

#[derive(Clone)]
pub struct Publisher {
    client: Option<async_nats::Client>,
}

impl Publisher {
    pub fn new(client: Option<async_nats::Client>) -> Self {
        Self { client }
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub async fn publish(&self, event: OrderEvent) {
        let Some(client) = &self.client else { return };
        let payload = match serde_json::to_vec(&event) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize order event");
                return;
            }
        };
        if let Err(e) = client.publish(event.subject(), payload.into()).await {
            tracing::warn!(error = %e, subject = event.subject(), "failed to publish order event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_payload_shape() {
        let event = OrderEvent::OrderPaid {
            order_id: Uuid::nil(),
            payment_intent: "pi_123".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "order_paid");
        assert_eq!(value["payment_intent"], "pi_123");
        assert_eq!(event.subject(), "teashop.orders.paid");
    }

    #[tokio::test]
    async fn test_disabled_publisher_is_silent() {
        Publisher::disabled()
            .publish(OrderEvent::OrderCanceled {
                order_id: Uuid::nil(),
                payment_intent: "pi_123".into(),
            })
            .await;
    }
}
