use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Alhaja API",
        version = "0.1.0",
        description = r#"
# Alhaja Storefront API

Checkout, payment and order reconciliation backend for the Alhaja jewelry
storefront.

## Features

- **Cart quoting**: Server-side totals with promo codes, shipping and tax
- **PayPal checkout**: Order creation and capture via the REST v2 API
- **MercadoPago checkout**: Preference creation and payment lookup
- **Order persistence**: Idempotent order creation keyed by payment id
- **Webhook reconciliation**: Provider webhooks converge on the same orders

## Error Handling

The API uses consistent error response formats with appropriate HTTP status codes:

```json
{
  "error": "Bad Request",
  "message": "Validation failed",
  "timestamp": "2026-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Checkout", description = "Cart quoting and provider checkout flows"),
        (name = "Payments", description = "Payment lookup endpoints"),
        (name = "Orders", description = "Order read endpoints"),
        (name = "Shipping settings", description = "Shipping configuration"),
        (name = "Webhooks", description = "Inbound provider webhooks")
    ),
    paths(
        // Checkout
        crate::handlers::checkout::quote,
        crate::handlers::checkout::create_paypal_order,
        crate::handlers::checkout::capture_paypal_order,
        crate::handlers::checkout::create_mercadopago_preference,
        crate::handlers::checkout::get_mercadopago_payment,

        // Orders
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::get_order_by_number,
        crate::handlers::orders::get_order_items,

        // Shipping settings
        crate::handlers::shipping_settings::get_shipping_settings,
        crate::handlers::shipping_settings::update_shipping_settings,

        // Webhooks
        crate::handlers::webhooks::paypal_webhook,
        crate::handlers::webhooks::mercadopago_webhook,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::PaginatedResponse<serde_json::Value>,

            // Cart types
            crate::cart::CartItem,
            crate::cart::CartTotals,

            // Checkout types
            crate::gateway::PaymentProvider,
            crate::gateway::CustomerInfo,
            crate::gateway::ShippingAddress,
            crate::gateway::ReturnUrls,
            crate::handlers::checkout::QuoteRequest,
            crate::handlers::checkout::QuoteResponse,
            crate::handlers::checkout::CheckoutRequest,
            crate::handlers::checkout::PayPalOrderResponse,
            crate::handlers::checkout::CaptureResponse,
            crate::handlers::checkout::PreferenceResponse,
            crate::handlers::checkout::MercadoPagoPaymentResponse,

            // Order types
            crate::services::orders::OrderResponse,
            crate::handlers::orders::OrderItemResponse,

            // Shipping settings types
            crate::services::shipping_settings::ShippingConfig,
            crate::services::shipping_settings::SettingsResolution,
            crate::services::shipping_settings::UpdateShippingSettingsRequest,
            crate::handlers::shipping_settings::ShippingSettingsResponse,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_includes_checkout_paths() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Alhaja API"));
        assert!(json.contains("/api/v1/checkout/quote"));
        assert!(json.contains("/api/v1/webhooks/mercadopago"));
    }

    #[test]
    fn webhook_paths_declare_an_explicit_request_body() {
        // The webhook handlers read raw bytes for signature checks, so their
        // request body is declared in the macro instead of inferred from the
        // extractor.
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_value(&openapi).unwrap();

        for provider in ["paypal", "mercadopago"] {
            let pointer = format!("/paths/~1api~1v1~1webhooks~1{}/post/requestBody", provider);
            assert!(
                json.pointer(&pointer).is_some(),
                "missing requestBody for {} webhook",
                provider
            );
        }
    }
}
