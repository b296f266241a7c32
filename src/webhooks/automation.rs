use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::Event;
use crate::webhooks::compute_signature;

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF_MS: u64 = 500;

/// Delivers order and payment events to the optional external automation
/// endpoints (fulfillment bots, CRM hooks). Delivery is fire-and-forget:
/// failures are logged and retried a few times, never surfaced to the
/// request that triggered them.
#[derive(Clone)]
pub struct AutomationForwarder {
    http: reqwest::Client,
    order_url: Option<String>,
    payment_url: Option<String>,
    secret: Option<String>,
}

impl AutomationForwarder {
    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.gateway_timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::ConfigError(format!(
                    "Failed to build automation HTTP client: {}",
                    e
                ))
            })?;

        Ok(Self {
            http,
            order_url: config.automation_order_webhook_url.clone(),
            payment_url: config.automation_payment_webhook_url.clone(),
            secret: config.automation_webhook_secret.clone(),
        })
    }

    /// Whether any automation endpoint is configured at all.
    pub fn is_configured(&self) -> bool {
        self.order_url.is_some() || self.payment_url.is_some()
    }

    /// Forwards an order-placed event, if an order endpoint is configured.
    pub fn forward_order_event(&self, event: &Event) {
        if let Some(url) = self.order_url.clone() {
            self.send_async(url, event);
        }
    }

    /// Forwards a payment-captured event, if a payment endpoint is configured.
    pub fn forward_payment_event(&self, event: &Event) {
        if let Some(url) = self.payment_url.clone() {
            self.send_async(url, event);
        }
    }

    /// Spawns the delivery in the background; the caller never waits.
    fn send_async(&self, url: String, event: &Event) {
        let payload = match serde_json::to_value(event) {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to serialize automation payload: {}", e);
                return;
            }
        };

        let forwarder = self.clone();
        tokio::spawn(async move {
            if let Err(e) = forwarder.deliver_with_retries(&url, &payload).await {
                error!(url = %url, "Automation delivery gave up: {}", e);
            }
        });
    }

    async fn deliver_with_retries(&self, url: &str, payload: &Value) -> Result<(), ServiceError> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| ServiceError::SerializationError(e.to_string()))?;

        let mut last_error = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.deliver_once(url, &body).await {
                Ok(()) => {
                    info!(url = %url, attempt, "Automation webhook delivered");
                    return Ok(());
                }
                Err(e) => {
                    warn!(url = %url, attempt, "Automation delivery failed: {}", e);
                    last_error = Some(e);
                    if attempt < MAX_ATTEMPTS {
                        let backoff = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                        tokio::time::sleep(Duration::from_millis(backoff)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ServiceError::InternalError("Automation delivery failed without error".to_string())
        }))
    }

    async fn deliver_once(&self, url: &str, body: &[u8]) -> Result<(), ServiceError> {
        let mut request = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .body(body.to_vec());

        if let Some(secret) = &self.secret {
            let timestamp = Utc::now().timestamp().to_string();
            let signature = compute_signature(secret, &timestamp, body);
            request = request
                .header("x-timestamp", timestamp)
                .header("x-signature", signature);
        }

        let response = request.send().await.map_err(|e| {
            ServiceError::GatewayUnavailable(format!("Automation endpoint unreachable: {}", e))
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(url = %url, %status, "Automation endpoint acknowledged");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ServiceError::GatewayUnavailable(format!(
                "Automation endpoint returned {}: {}",
                status, body
            )))
        }
    }
}

/// Builds the forwarder from config, returning `None` when no endpoint is
/// configured so callers can skip the machinery entirely.
pub fn forwarder_from_config(config: &AppConfig) -> Result<Option<Arc<AutomationForwarder>>, ServiceError> {
    let forwarder = AutomationForwarder::from_config(config)?;
    if forwarder.is_configured() {
        Ok(Some(Arc::new(forwarder)))
    } else {
        Ok(None)
    }
}
