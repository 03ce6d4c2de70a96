//! Payment processor adapter
//!
//! The checkout engine talks to the processor through [`PaymentGateway`],
//! injected at construction so tests can swap in a double. The real
//! implementation speaks the Stripe payment-intent API over HTTP with
//! bounded retries; inbound webhooks are authenticated with the
//! `t=<ts>,v1=<hex hmac>` signature header before anything is parsed.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::{Result, ShopError};

/// Seconds a webhook timestamp may lag before the event is rejected.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;
const MAX_ATTEMPTS: u32 = 3;

#[derive(Clone, Debug, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a transaction sized to `amount_cents`.
    async fn create(&self, amount_cents: i64, currency: &str) -> Result<PaymentIntent>;

    /// Re-size an existing transaction. The gateway issues a fresh
    /// client secret which callers must propagate to the client.
    async fn modify(&self, intent_id: &str, amount_cents: i64) -> Result<String>;

    async fn cancel(&self, intent_id: &str) -> Result<()>;
}

pub struct StripeGateway {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeGateway {
    pub fn new(secret_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: secret_key.into(),
            api_base: api_base.into(),
        }
    }

    /// POST a form to the processor, retrying transport errors and 5xx
    /// responses with a short backoff before giving up.
    async fn post_form(&self, path: &str, form: &[(&str, String)]) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.api_base, path);
        let mut last_error = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            let sent = self
                .http
                .post(&url)
                .bearer_auth(&self.secret_key)
                .form(form)
                .send()
                .await;
            match sent {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json()
                        .await
                        .map_err(|e| ShopError::Gateway(format!("malformed response: {e}")));
                }
                Ok(resp) if resp.status().is_server_error() => {
                    last_error = format!("processor returned {}", resp.status());
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(ShopError::Gateway(format!(
                        "processor rejected request ({status}): {body}"
                    )));
                }
                Err(e) => last_error = e.to_string(),
            }
            if attempt < MAX_ATTEMPTS {
                tracing::warn!(%url, attempt, error = %last_error, "gateway call failed, retrying");
                tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
            }
        }
        Err(ShopError::Gateway(last_error))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create(&self, amount_cents: i64, currency: &str) -> Result<PaymentIntent> {
        let body = self
            .post_form(
                "/v1/payment_intents",
                &[
                    ("amount", amount_cents.to_string()),
                    ("currency", currency.to_lowercase()),
                    ("automatic_payment_methods[enabled]", "true".to_string()),
                ],
            )
            .await?;
        serde_json::from_value(body)
            .map_err(|e| ShopError::Gateway(format!("malformed intent: {e}")))
    }

    async fn modify(&self, intent_id: &str, amount_cents: i64) -> Result<String> {
        let body = self
            .post_form(
                &format!("/v1/payment_intents/{intent_id}"),
                &[("amount", amount_cents.to_string())],
            )
            .await?;
        body.get("client_secret")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ShopError::Gateway("intent response missing client_secret".into()))
    }

    async fn cancel(&self, intent_id: &str) -> Result<()> {
        self.post_form(&format!("/v1/payment_intents/{intent_id}/cancel"), &[])
            .await
            .map(|_| ())
    }
}

// ---------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------

/// A parsed webhook event. Only the envelope is modeled; each handler
/// digs further into `data.object` as needed.
#[derive(Clone, Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: WebhookData,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WebhookData {
    pub object: WebhookObject,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WebhookObject {
    pub id: String,
}

#[derive(Clone, Debug)]
pub struct WebhookVerifier {
    secret: String,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    /// Verify `signature_header` against the raw payload, then parse the
    /// event. Nothing in the payload is trusted before this passes.
    pub fn verify_and_parse(&self, payload: &[u8], signature_header: &str) -> Result<WebhookEvent> {
        self.verify(payload, signature_header, chrono::Utc::now().timestamp())?;
        serde_json::from_slice(payload).map_err(|_| ShopError::SignatureRejected)
    }

    fn verify(&self, payload: &[u8], signature_header: &str, now: i64) -> Result<()> {
        let mut timestamp: Option<i64> = None;
        let mut signatures: Vec<&str> = Vec::new();
        for part in signature_header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }
        let timestamp = timestamp.ok_or(ShopError::SignatureRejected)?;
        if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
            return Err(ShopError::SignatureRejected);
        }

        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes())
            .map_err(|_| ShopError::SignatureRejected)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = mac.finalize().into_bytes();

        let matched = signatures.iter().any(|sig| {
            hex::decode(sig)
                .map(|raw| raw.as_slice() == expected.as_slice())
                .unwrap_or(false)
        });
        if matched {
            Ok(())
        } else {
            Err(ShopError::SignatureRejected)
        }
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum GatewayCall {
        Create { amount_cents: i64, currency: String },
        Modify { intent_id: String, amount_cents: i64 },
        Cancel { intent_id: String },
    }

    /// In-memory gateway double recording every call.
    #[derive(Default)]
    pub struct MockGateway {
        pub calls: Mutex<Vec<GatewayCall>>,
    }

    impl MockGateway {
        pub fn calls(&self) -> Vec<GatewayCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PaymentGateway for MockGateway {
        async fn create(&self, amount_cents: i64, currency: &str) -> Result<PaymentIntent> {
            self.calls.lock().unwrap().push(GatewayCall::Create {
                amount_cents,
                currency: currency.to_string(),
            });
            let id = format!("pi_{}", uuid::Uuid::new_v4().simple());
            Ok(PaymentIntent {
                client_secret: format!("{id}_secret_{amount_cents}"),
                id,
            })
        }

        async fn modify(&self, intent_id: &str, amount_cents: i64) -> Result<String> {
            self.calls.lock().unwrap().push(GatewayCall::Modify {
                intent_id: intent_id.to_string(),
                amount_cents,
            });
            Ok(format!("{intent_id}_secret_{amount_cents}"))
        }

        async fn cancel(&self, intent_id: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(GatewayCall::Cancel { intent_id: intent_id.to_string() });
            Ok(())
        }
    }
}
