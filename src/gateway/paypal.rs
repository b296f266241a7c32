use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::gateway::{format_amount, generate_external_reference, CheckoutDraft};

/// Refresh the cached token this long before PayPal says it expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() + TOKEN_EXPIRY_MARGIN < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// A link in PayPal's HATEOAS response.
#[derive(Clone, Debug, Deserialize)]
pub struct PayPalLink {
    pub href: String,
    pub rel: String,
}

/// A created (not yet captured) PayPal order.
#[derive(Clone, Debug, Deserialize)]
pub struct PayPalOrder {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub links: Vec<PayPalLink>,
}

impl PayPalOrder {
    /// URL the storefront should redirect the customer to for approval.
    pub fn approve_url(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|link| link.rel == "approve" || link.rel == "payer-action")
            .map(|link| link.href.as_str())
    }
}

/// Outcome of capturing an approved order.
#[derive(Clone, Debug)]
pub struct PayPalCapture {
    pub order_id: String,
    /// The capture id, which is the payment id we deduplicate on.
    pub capture_id: String,
    pub status: String,
    pub payer_email: Option<String>,
    pub payer_name: Option<String>,
    /// Full provider payload, persisted as order metadata.
    pub raw: Value,
}

/// PayPal REST client. Authenticates with client-credentials OAuth and
/// caches the bearer token until shortly before expiry.
#[derive(Clone)]
pub struct PayPalClient {
    http: reqwest::Client,
    base_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

impl PayPalClient {
    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.gateway_timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::ConfigError(format!("Failed to build PayPal HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            base_url: config.paypal_api_base(),
            client_id: config.paypal_client_id.clone(),
            client_secret: config.paypal_client_secret.clone(),
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Credentials check happens before any network traffic: a missing
    /// secret is a deployment problem, not a transient gateway failure.
    fn credentials(&self) -> Result<(&str, &str), ServiceError> {
        match (self.client_id.as_deref(), self.client_secret.as_deref()) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Ok((id, secret)),
            _ => Err(ServiceError::ConfigError(
                "PayPal credentials are not configured".to_string(),
            )),
        }
    }

    async fn access_token(&self) -> Result<String, ServiceError> {
        let (client_id, client_secret) = self.credentials()?;

        {
            let cache = self.token_cache.read().await;
            if let Some(token) = cache.as_ref().filter(|t| t.is_valid()) {
                return Ok(token.access_token.clone());
            }
        }

        debug!("Requesting fresh PayPal access token");
        let basic = BASE64.encode(format!("{}:{}", client_id, client_secret));
        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .header("Authorization", format!("Basic {}", basic))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| {
                ServiceError::GatewayUnavailable(format!("PayPal token request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::GatewayUnavailable(format!(
                "PayPal token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            ServiceError::GatewayUnavailable(format!("Invalid PayPal token response: {}", e))
        })?;

        let cached = CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        };
        *self.token_cache.write().await = Some(cached);

        Ok(token.access_token)
    }

    /// Creates a CAPTURE-intent order for the drafted checkout.
    #[instrument(skip(self, draft))]
    pub async fn create_order(&self, draft: &CheckoutDraft) -> Result<PayPalOrder, ServiceError> {
        let token = self.access_token().await?;
        let payload = order_payload(draft);

        let response = self
            .http
            .post(format!("{}/v2/checkout/orders", self.base_url))
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                ServiceError::GatewayUnavailable(format!("PayPal create order failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::GatewayUnavailable(format!(
                "PayPal create order returned {}: {}",
                status, body
            )));
        }

        let order: PayPalOrder = response.json().await.map_err(|e| {
            ServiceError::GatewayUnavailable(format!("Invalid PayPal order response: {}", e))
        })?;

        info!(paypal_order_id = %order.id, status = %order.status, "PayPal order created");
        Ok(order)
    }

    /// Captures an approved PayPal order.
    #[instrument(skip(self))]
    pub async fn capture_order(&self, order_id: &str) -> Result<PayPalCapture, ServiceError> {
        let token = self.access_token().await?;

        let response = self
            .http
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.base_url, order_id
            ))
            .bearer_auth(&token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| {
                ServiceError::GatewayUnavailable(format!("PayPal capture failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::GatewayUnavailable(format!(
                "PayPal capture returned {}: {}",
                status, body
            )));
        }

        let raw: Value = response.json().await.map_err(|e| {
            ServiceError::GatewayUnavailable(format!("Invalid PayPal capture response: {}", e))
        })?;

        parse_capture(order_id, raw)
    }
}

/// Builds the create-order payload. Pure: same draft, same JSON.
pub fn order_payload(draft: &CheckoutDraft) -> Value {
    let items: Vec<Value> = draft
        .items
        .iter()
        .map(|item| {
            json!({
                "name": item.name,
                "sku": item.id,
                "quantity": item.quantity.to_string(),
                "unit_amount": {
                    "currency_code": draft.currency,
                    "value": format_amount(item.effective_unit_price()),
                },
            })
        })
        .collect();

    json!({
        "intent": "CAPTURE",
        "purchase_units": [{
            "reference_id": generate_external_reference(),
            "amount": {
                "currency_code": draft.currency,
                "value": format_amount(draft.totals.total),
                "breakdown": {
                    "item_total": {
                        "currency_code": draft.currency,
                        "value": format_amount(draft.totals.subtotal),
                    },
                    "tax_total": {
                        "currency_code": draft.currency,
                        "value": format_amount(draft.totals.tax),
                    },
                    "shipping": {
                        "currency_code": draft.currency,
                        "value": format_amount(draft.totals.shipping),
                    },
                    "discount": {
                        "currency_code": draft.currency,
                        "value": format_amount(draft.totals.discount),
                    },
                },
            },
            "items": items,
        }],
        "application_context": {
            "return_url": draft.return_urls.success,
            "cancel_url": draft.return_urls.failure,
            "user_action": "PAY_NOW",
        },
    })
}

fn parse_capture(order_id: &str, raw: Value) -> Result<PayPalCapture, ServiceError> {
    let status = raw
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("UNKNOWN")
        .to_string();

    let capture_id = raw
        .pointer("/purchase_units/0/payments/captures/0/id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            ServiceError::GatewayUnavailable(
                "PayPal capture response is missing a capture id".to_string(),
            )
        })?;

    let payer_email = raw
        .pointer("/payer/email_address")
        .and_then(Value::as_str)
        .map(str::to_string);

    let payer_name = match (
        raw.pointer("/payer/name/given_name").and_then(Value::as_str),
        raw.pointer("/payer/name/surname").and_then(Value::as_str),
    ) {
        (Some(given), Some(surname)) => Some(format!("{} {}", given, surname)),
        (Some(given), None) => Some(given.to_string()),
        _ => None,
    };

    Ok(PayPalCapture {
        order_id: order_id.to_string(),
        capture_id,
        status,
        payer_email,
        payer_name,
        raw,
    })
}
