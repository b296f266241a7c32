use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::{info, instrument, warn};

use crate::errors::ServiceError;
use crate::events::Event;
use crate::gateway::PaymentProvider;
use crate::handlers::AppState;
use crate::services::orders::{OrderItemDraft, PaidOrderDraft};
use crate::webhooks::{verify_signature, DEFAULT_TIMESTAMP_TOLERANCE_SECS};

/// Validates the shared-secret signature when one is configured.
/// Without a configured secret the check is skipped entirely.
fn verify_webhook(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<(), ServiceError> {
    let Some(secret) = state.config.payment_webhook_secret.as_deref() else {
        return Ok(());
    };

    let timestamp = headers
        .get("x-timestamp")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::Unauthorized("Missing x-timestamp header".to_string()))?;
    let signature = headers
        .get("x-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::Unauthorized("Missing x-signature header".to_string()))?;

    let tolerance = state
        .config
        .payment_webhook_tolerance_secs
        .unwrap_or(DEFAULT_TIMESTAMP_TOLERANCE_SECS);

    verify_signature(secret, timestamp, body, signature, tolerance)
}

fn parse_body(body: &[u8]) -> Result<Value, ServiceError> {
    serde_json::from_slice(body)
        .map_err(|e| ServiceError::BadRequest(format!("Invalid webhook body: {}", e)))
}

/// A reconciler can only see the payment, not the original cart, so an
/// order created from a webhook carries a single summary line. The capture
/// endpoint creates the detailed order when it wins the race.
fn summary_draft(
    provider: PaymentProvider,
    payment_id: String,
    amount: Decimal,
    currency: String,
    customer_email: String,
    customer_name: String,
    metadata: Value,
) -> PaidOrderDraft {
    let item = OrderItemDraft {
        product_id: format!("{}-payment", provider.as_str()),
        name: format!("Reconciled {} payment {}", provider, payment_id),
        quantity: 1,
        unit_price: amount,
        total_price: amount,
        selected_size: None,
        selected_material: None,
    };

    PaidOrderDraft {
        provider,
        payment_id,
        customer_email,
        customer_name,
        customer_phone: None,
        shipping_street: None,
        shipping_city: None,
        shipping_state: None,
        shipping_postal_code: None,
        shipping_country: None,
        subtotal: amount,
        discount: Decimal::ZERO,
        shipping_cost: Decimal::ZERO,
        tax: Decimal::ZERO,
        total: amount,
        currency,
        items: vec![item],
        metadata: Some(metadata),
    }
}

fn ack(result: &str) -> Json<Value> {
    Json(json!({ "received": true, "result": result }))
}

/// PayPal event webhook
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/paypal",
    request_body = String,
    responses(
        (status = 200, description = "Event acknowledged"),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 400, description = "Malformed payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Webhooks"
)]
#[instrument(skip(state, headers, body))]
pub async fn paypal_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ServiceError> {
    verify_webhook(&state, &headers, &body)?;
    let payload = parse_body(&body)?;

    let event_type = payload
        .get("event_type")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    if let Some(sender) = &state.event_sender {
        sender.send(Event::WebhookReceived {
            provider: PaymentProvider::PayPal,
            event_type: event_type.clone(),
        });
    }

    match event_type.as_str() {
        "PAYMENT.CAPTURE.COMPLETED" => {
            let capture_id = payload
                .pointer("/resource/id")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ServiceError::BadRequest("Capture event without resource id".to_string())
                })?
                .to_string();

            let amount = payload
                .pointer("/resource/amount/value")
                .and_then(Value::as_str)
                .and_then(|v| Decimal::from_str(v).ok())
                .ok_or_else(|| {
                    ServiceError::BadRequest("Capture event without amount".to_string())
                })?;
            let currency = payload
                .pointer("/resource/amount/currency_code")
                .and_then(Value::as_str)
                .unwrap_or(&state.config.default_currency)
                .to_string();

            let payer_email = payload
                .pointer("/resource/payer/email_address")
                .and_then(Value::as_str)
                .unwrap_or("unknown@paypal")
                .to_string();

            let draft = summary_draft(
                PaymentProvider::PayPal,
                capture_id.clone(),
                amount,
                currency,
                payer_email,
                "PayPal customer".to_string(),
                payload.clone(),
            );

            let outcome = state.orders.upsert_paid_order(draft).await?;
            if outcome.created {
                info!(order_id = %outcome.order.id, "Order created from PayPal webhook");
                if let Some(sender) = &state.event_sender {
                    sender.send(Event::PaymentCaptured {
                        provider: PaymentProvider::PayPal,
                        payment_id: capture_id,
                        order_id: outcome.order.id,
                        payload,
                    });
                }
                Ok(ack("created"))
            } else {
                Ok(ack("duplicate"))
            }
        }
        // Approved but not yet captured: acknowledged, nothing persisted.
        "CHECKOUT.ORDER.APPROVED" => Ok(ack("ignored")),
        other => {
            warn!(event_type = %other, "Unhandled PayPal event type");
            Ok(ack("ignored"))
        }
    }
}

/// MercadoPago notification webhook
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/mercadopago",
    request_body = String,
    responses(
        (status = 200, description = "Notification acknowledged"),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment lookup failed", body = crate::errors::ErrorResponse)
    ),
    tag = "Webhooks"
)]
#[instrument(skip(state, headers, body))]
pub async fn mercadopago_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ServiceError> {
    verify_webhook(&state, &headers, &body)?;
    let payload = parse_body(&body)?;

    let notification_type = payload
        .get("type")
        .or_else(|| payload.get("topic"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    if let Some(sender) = &state.event_sender {
        sender.send(Event::WebhookReceived {
            provider: PaymentProvider::MercadoPago,
            event_type: notification_type.clone(),
        });
    }

    if notification_type != "payment" {
        return Ok(ack("ignored"));
    }

    let payment_id = match payload.pointer("/data/id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(ServiceError::BadRequest(
                "Payment notification without data.id".to_string(),
            ))
        }
    };

    // The notification only carries the id; the source of truth is the
    // payment lookup. A lookup failure propagates so the provider retries.
    let payment = state.mercadopago.get_payment(&payment_id).await?;

    if !payment.is_approved() {
        info!(payment_id = %payment.id, status = %payment.status, "Payment not approved; ignoring");
        return Ok(ack("ignored"));
    }

    let amount = payment.transaction_amount.unwrap_or(Decimal::ZERO);
    let currency = payment
        .currency_id
        .clone()
        .unwrap_or_else(|| state.config.default_currency.clone());
    let email = payment
        .payer_email
        .clone()
        .unwrap_or_else(|| "unknown@mercadopago".to_string());

    let draft = summary_draft(
        PaymentProvider::MercadoPago,
        payment.id.clone(),
        amount,
        currency,
        email,
        "MercadoPago customer".to_string(),
        payment.raw.clone(),
    );

    let outcome = state.orders.upsert_paid_order(draft).await?;
    if outcome.created {
        info!(order_id = %outcome.order.id, "Order created from MercadoPago webhook");
        if let Some(sender) = &state.event_sender {
            sender.send(Event::PaymentCaptured {
                provider: PaymentProvider::MercadoPago,
                payment_id: payment.id,
                order_id: outcome.order.id,
                payload: payment.raw,
            });
        }
        Ok(ack("created"))
    } else {
        Ok(ack("duplicate"))
    }
}

/// Webhook routes, mounted under /webhooks
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/paypal", post(paypal_webhook))
        .route("/mercadopago", post(mercadopago_webhook))
}
