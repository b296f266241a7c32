use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use validator::Validate;

use crate::cart::{CartCalculator, CartItem, CartTotals};
use crate::errors::ServiceError;
use crate::events::Event;
use crate::gateway::{
    CheckoutDraft, CustomerInfo, PaymentProvider, ReturnUrls, ShippingAddress,
};
use crate::handlers::AppState;
use crate::services::orders::{OrderItemDraft, OrderResponse, PaidOrderDraft};
use crate::services::shipping_settings::ShippingConfig;
use crate::ApiResponse;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct QuoteRequest {
    pub items: Vec<CartItem>,
    /// Optional promo code from the built-in table
    pub promo_code: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuoteResponse {
    pub totals: CartTotals,
    pub currency: String,
    pub free_shipping_threshold: Decimal,
    /// Set when shipping settings could not be loaded and defaults were used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings_fallback: Option<String>,
}

/// Full checkout context: the cart plus who is buying and where the
/// provider should send them afterwards.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    pub items: Vec<CartItem>,
    pub promo_code: Option<String>,
    #[validate]
    pub customer: CustomerInfo,
    pub shipping_address: Option<ShippingAddress>,
    pub return_urls: ReturnUrls,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PayPalOrderResponse {
    pub id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approve_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CaptureResponse {
    pub order: OrderResponse,
    /// False when this payment had already been reconciled
    pub created: bool,
    pub capture_status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PreferenceResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_point: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox_init_point: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MercadoPagoPaymentResponse {
    pub id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,
}

/// Resolves settings and prices the cart. Shared by the quote endpoint and
/// both provider flows so every path sees identical totals.
async fn price_cart(
    state: &AppState,
    items: &[CartItem],
    promo_code: Option<&str>,
) -> Result<(CartTotals, ShippingConfig, Option<String>), ServiceError> {
    let tax_rate = Decimal::from_f64(state.config.tax_rate).ok_or_else(|| {
        ServiceError::ConfigError(format!("Invalid tax rate: {}", state.config.tax_rate))
    })?;

    let resolution = state.shipping_settings.resolve().await;
    let calculator = CartCalculator::new(tax_rate, resolution.config.rates());
    let totals = calculator.totals(items, promo_code)?;

    Ok((totals, resolution.config, resolution.fallback_reason))
}

fn build_draft(
    request: CheckoutRequest,
    totals: CartTotals,
    currency: String,
) -> CheckoutDraft {
    CheckoutDraft {
        items: request.items,
        totals,
        currency,
        customer: request.customer,
        shipping_address: request.shipping_address,
        return_urls: request.return_urls,
    }
}

/// Preview cart totals without touching any payment provider
#[utoipa::path(
    post,
    path = "/api/v1/checkout/quote",
    request_body = QuoteRequest,
    responses(
        (status = 200, description = "Cart totals", body = ApiResponse<QuoteResponse>),
        (status = 400, description = "Invalid cart or promo code", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn quote(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<ApiResponse<QuoteResponse>>, ServiceError> {
    let (totals, config, fallback) =
        price_cart(&state, &request.items, request.promo_code.as_deref()).await?;

    Ok(Json(ApiResponse::success(QuoteResponse {
        totals,
        currency: config.currency,
        free_shipping_threshold: config.free_shipping_threshold,
        settings_fallback: fallback,
    })))
}

/// Create a PayPal order for the drafted checkout
#[utoipa::path(
    post,
    path = "/api/v1/checkout/paypal/orders",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "PayPal order created", body = ApiResponse<PayPalOrderResponse>),
        (status = 400, description = "Invalid checkout", body = crate::errors::ErrorResponse),
        (status = 502, description = "PayPal unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn create_paypal_order(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PayPalOrderResponse>>), ServiceError> {
    request.validate()?;

    let (totals, config, _) =
        price_cart(&state, &request.items, request.promo_code.as_deref()).await?;
    let draft = build_draft(request, totals, config.currency);

    let order = state.paypal.create_order(&draft).await?;
    let response = PayPalOrderResponse {
        approve_url: order.approve_url().map(str::to_string),
        id: order.id,
        status: order.status,
    };

    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

/// Capture an approved PayPal order and persist the resulting storefront order
#[utoipa::path(
    post,
    path = "/api/v1/checkout/paypal/orders/{id}/capture",
    params(("id" = String, Path, description = "PayPal order id")),
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Payment captured and order persisted", body = ApiResponse<CaptureResponse>),
        (status = 400, description = "Invalid checkout", body = crate::errors::ErrorResponse),
        (status = 502, description = "PayPal unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn capture_paypal_order(
    State(state): State<AppState>,
    Path(paypal_order_id): Path<String>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<ApiResponse<CaptureResponse>>, ServiceError> {
    request.validate()?;

    let (totals, config, _) =
        price_cart(&state, &request.items, request.promo_code.as_deref()).await?;

    let capture = state.paypal.capture_order(&paypal_order_id).await?;
    if capture.status != "COMPLETED" {
        return Err(ServiceError::InvalidOperation(format!(
            "PayPal capture for order {} is {}, not COMPLETED",
            paypal_order_id, capture.status
        )));
    }

    let shipping = request.shipping_address.clone();
    let draft = PaidOrderDraft {
        provider: PaymentProvider::PayPal,
        payment_id: capture.capture_id.clone(),
        customer_email: request.customer.email.clone(),
        customer_name: request.customer.name.clone(),
        customer_phone: request.customer.phone.clone(),
        shipping_street: shipping.as_ref().map(|a| a.street.clone()),
        shipping_city: shipping.as_ref().map(|a| a.city.clone()),
        shipping_state: shipping.as_ref().and_then(|a| a.state.clone()),
        shipping_postal_code: shipping.as_ref().and_then(|a| a.postal_code.clone()),
        shipping_country: shipping.as_ref().map(|a| a.country.clone()),
        subtotal: totals.subtotal,
        discount: totals.discount,
        shipping_cost: totals.shipping,
        tax: totals.tax,
        total: totals.total,
        currency: config.currency,
        items: request.items.iter().map(OrderItemDraft::from).collect(),
        metadata: Some(capture.raw.clone()),
    };

    let outcome = state.orders.upsert_paid_order(draft).await?;

    if outcome.created {
        if let Some(sender) = &state.event_sender {
            sender.send(Event::PaymentCaptured {
                provider: PaymentProvider::PayPal,
                payment_id: capture.capture_id.clone(),
                order_id: outcome.order.id,
                payload: json!({
                    "order_number": outcome.order.order_number,
                    "total": outcome.order.total_amount,
                    "currency": outcome.order.currency,
                    "capture": capture.raw,
                }),
            });
        }
    }

    Ok(Json(ApiResponse::success(CaptureResponse {
        order: OrderResponse::from(outcome.order),
        created: outcome.created,
        capture_status: capture.status,
    })))
}

/// Create a MercadoPago checkout preference
#[utoipa::path(
    post,
    path = "/api/v1/checkout/mercadopago/preferences",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Preference created", body = ApiResponse<PreferenceResponse>),
        (status = 400, description = "Invalid checkout", body = crate::errors::ErrorResponse),
        (status = 502, description = "MercadoPago unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn create_mercadopago_preference(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PreferenceResponse>>), ServiceError> {
    request.validate()?;

    let (totals, config, _) =
        price_cart(&state, &request.items, request.promo_code.as_deref()).await?;
    let draft = build_draft(request, totals, config.currency);

    let preference = state.mercadopago.create_preference(&draft).await?;
    let response = PreferenceResponse {
        id: preference.id,
        init_point: preference.init_point,
        sandbox_init_point: preference.sandbox_init_point,
        external_reference: preference.external_reference,
    };

    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

/// Look up a MercadoPago payment by provider id
#[utoipa::path(
    get,
    path = "/api/v1/payments/mercadopago/{payment_id}",
    params(("payment_id" = String, Path, description = "MercadoPago payment id")),
    responses(
        (status = 200, description = "Payment details", body = ApiResponse<MercadoPagoPaymentResponse>),
        (status = 404, description = "Payment not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "MercadoPago unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn get_mercadopago_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<Json<ApiResponse<MercadoPagoPaymentResponse>>, ServiceError> {
    let payment = state.mercadopago.get_payment(&payment_id).await?;

    Ok(Json(ApiResponse::success(MercadoPagoPaymentResponse {
        id: payment.id,
        status: payment.status,
        transaction_amount: payment.transaction_amount,
        currency_id: payment.currency_id,
        payer_email: payment.payer_email,
        external_reference: payment.external_reference,
    })))
}

/// Checkout routes, mounted under /checkout
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/quote", post(quote))
        .route("/paypal/orders", post(create_paypal_order))
        .route("/paypal/orders/:id/capture", post(capture_paypal_order))
        .route("/mercadopago/preferences", post(create_mercadopago_preference))
}

/// Payment lookup routes, mounted under /payments
pub fn payment_routes() -> Router<AppState> {
    Router::new().route("/mercadopago/:payment_id", get(get_mercadopago_payment))
}
