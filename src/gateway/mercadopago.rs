use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, instrument};

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::gateway::{format_amount, generate_external_reference, CheckoutDraft};

/// A created MercadoPago checkout preference.
#[derive(Clone, Debug, Deserialize)]
pub struct Preference {
    pub id: String,
    /// Hosted checkout URL for live credentials.
    pub init_point: Option<String>,
    /// Hosted checkout URL for sandbox credentials.
    pub sandbox_init_point: Option<String>,
    pub external_reference: Option<String>,
}

/// A MercadoPago payment as reported by `/v1/payments/{id}`.
#[derive(Clone, Debug)]
pub struct MercadoPagoPayment {
    pub id: String,
    pub status: String,
    pub transaction_amount: Option<Decimal>,
    pub currency_id: Option<String>,
    pub payer_email: Option<String>,
    pub external_reference: Option<String>,
    /// Full provider payload, persisted as order metadata.
    pub raw: Value,
}

impl MercadoPagoPayment {
    pub fn is_approved(&self) -> bool {
        self.status == "approved"
    }
}

/// MercadoPago REST client. Uses the long-lived access token from
/// configuration; no token exchange involved.
#[derive(Clone)]
pub struct MercadoPagoClient {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
    notification_url: Option<String>,
}

impl MercadoPagoClient {
    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.gateway_timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::ConfigError(format!(
                    "Failed to build MercadoPago HTTP client: {}",
                    e
                ))
            })?;

        Ok(Self {
            http,
            base_url: config.mercadopago_api_base(),
            access_token: config.mercadopago_access_token.clone(),
            notification_url: config.mercadopago_notification_url(),
        })
    }

    /// Token check happens before any network traffic.
    fn token(&self) -> Result<&str, ServiceError> {
        self.access_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                ServiceError::ConfigError(
                    "MercadoPago access token is not configured".to_string(),
                )
            })
    }

    /// Creates a hosted-checkout preference for the drafted cart.
    #[instrument(skip(self, draft))]
    pub async fn create_preference(
        &self,
        draft: &CheckoutDraft,
    ) -> Result<Preference, ServiceError> {
        let token = self.token()?;
        let external_reference = generate_external_reference();
        let payload = preference_payload(draft, self.notification_url.as_deref(), &external_reference);

        let response = self
            .http
            .post(format!("{}/checkout/preferences", self.base_url))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                ServiceError::GatewayUnavailable(format!(
                    "MercadoPago create preference failed: {}",
                    e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::GatewayUnavailable(format!(
                "MercadoPago create preference returned {}: {}",
                status, body
            )));
        }

        let preference: Preference = response.json().await.map_err(|e| {
            ServiceError::GatewayUnavailable(format!(
                "Invalid MercadoPago preference response: {}",
                e
            ))
        })?;

        info!(preference_id = %preference.id, "MercadoPago preference created");
        Ok(preference)
    }

    /// Looks up a payment by provider id, used by both the payment-status
    /// endpoint and the webhook reconciler.
    #[instrument(skip(self))]
    pub async fn get_payment(&self, payment_id: &str) -> Result<MercadoPagoPayment, ServiceError> {
        let token = self.token()?;

        let response = self
            .http
            .get(format!("{}/v1/payments/{}", self.base_url, payment_id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                ServiceError::GatewayUnavailable(format!(
                    "MercadoPago payment lookup failed: {}",
                    e
                ))
            })?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(ServiceError::NotFound(format!(
                "MercadoPago payment {} not found",
                payment_id
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::GatewayUnavailable(format!(
                "MercadoPago payment lookup returned {}: {}",
                status, body
            )));
        }

        let raw: Value = response.json().await.map_err(|e| {
            ServiceError::GatewayUnavailable(format!(
                "Invalid MercadoPago payment response: {}",
                e
            ))
        })?;

        Ok(parse_payment(raw))
    }
}

/// Builds the preference payload. Pure: same inputs, same JSON.
pub fn preference_payload(
    draft: &CheckoutDraft,
    notification_url: Option<&str>,
    external_reference: &str,
) -> Value {
    let items: Vec<Value> = draft
        .items
        .iter()
        .map(|item| {
            json!({
                "id": item.id,
                "title": item.name,
                "quantity": item.quantity,
                "unit_price": format_amount(item.effective_unit_price()),
                "currency_id": draft.currency,
            })
        })
        .collect();

    let mut payload = json!({
        "items": items,
        "payer": {
            "email": draft.customer.email,
            "name": draft.customer.name,
        },
        "back_urls": {
            "success": draft.return_urls.success,
            "failure": draft.return_urls.failure,
            "pending": draft.return_urls.pending.as_deref().unwrap_or(&draft.return_urls.success),
        },
        "auto_return": "approved",
        "external_reference": external_reference,
    });

    if let Some(url) = notification_url {
        payload["notification_url"] = json!(url);
    }

    payload
}

fn parse_payment(raw: Value) -> MercadoPagoPayment {
    let id = match raw.get("id") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    };

    let transaction_amount = raw
        .get("transaction_amount")
        .and_then(|v| serde_json::from_value::<Decimal>(v.clone()).ok());

    MercadoPagoPayment {
        id,
        status: raw
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        transaction_amount,
        currency_id: raw
            .get("currency_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        payer_email: raw
            .pointer("/payer/email")
            .and_then(Value::as_str)
            .map(str::to_string),
        external_reference: raw
            .get("external_reference")
            .and_then(Value::as_str)
            .map(str::to_string),
        raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{CartItem, CartTotals};
    use crate::gateway::{CustomerInfo, ReturnUrls};
    use rust_decimal_macros::dec;

    fn draft() -> CheckoutDraft {
        CheckoutDraft {
            items: vec![CartItem {
                id: "aretes-07".into(),
                name: "Pearl earrings".into(),
                unit_price: dec!(35.5),
                sale_price: None,
                quantity: 1,
                selected_size: None,
                selected_material: Some("silver".into()),
            }],
            totals: CartTotals {
                subtotal: dec!(35.5),
                discount: dec!(0),
                shipping: dec!(9.99),
                tax: dec!(6.39),
                total: dec!(51.88),
                applied_promo_code: None,
            },
            currency: "PEN".into(),
            customer: CustomerInfo {
                email: "cliente@example.com".into(),
                name: "Ana Torres".into(),
                phone: None,
            },
            shipping_address: None,
            return_urls: ReturnUrls {
                success: "https://shop.example/gracias".into(),
                failure: "https://shop.example/error".into(),
                pending: None,
            },
        }
    }

    #[test]
    fn preference_payload_shape() {
        let payload = preference_payload(
            &draft(),
            Some("https://shop.example/api/v1/webhooks/mercadopago"),
            "1724660000000-1234",
        );

        assert_eq!(payload["items"][0]["unit_price"], "35.50");
        assert_eq!(payload["items"][0]["currency_id"], "PEN");
        assert_eq!(payload["auto_return"], "approved");
        assert_eq!(payload["external_reference"], "1724660000000-1234");
        assert_eq!(
            payload["notification_url"],
            "https://shop.example/api/v1/webhooks/mercadopago"
        );
        // pending falls back to the success URL when not provided
        assert_eq!(payload["back_urls"]["pending"], "https://shop.example/gracias");
    }

    #[test]
    fn preference_payload_omits_notification_url_when_unset() {
        let payload = preference_payload(&draft(), None, "ref");
        assert!(payload.get("notification_url").is_none());
    }

    #[test]
    fn payment_parsing_handles_numeric_ids() {
        let raw = serde_json::json!({
            "id": 123456789,
            "status": "approved",
            "transaction_amount": 51.88,
            "currency_id": "PEN",
            "payer": { "email": "cliente@example.com" },
            "external_reference": "1724660000000-1234",
        });

        let payment = parse_payment(raw);
        assert_eq!(payment.id, "123456789");
        assert!(payment.is_approved());
        assert_eq!(payment.currency_id.as_deref(), Some("PEN"));
        assert_eq!(payment.payer_email.as_deref(), Some("cliente@example.com"));
    }
}
