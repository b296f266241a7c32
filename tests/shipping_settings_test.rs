mod common;

use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use serde_json::json;

use common::{body_json, TestApp};

fn parse_decimal(value: &serde_json::Value) -> rust_decimal::Decimal {
    value
        .as_str()
        .expect("decimal field serialized as string")
        .parse()
        .expect("decimal field parses")
}

#[tokio::test]
async fn resolution_falls_back_when_no_row_exists() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/shipping-settings", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    assert_eq!(body["data"]["config"]["free_shipping_threshold"], "50");
    assert_eq!(body["data"]["config"]["standard_shipping_cost"], "9.99");
    assert_eq!(body["data"]["config"]["currency"], "PEN");
    assert!(body["data"]["fallback_reason"].is_string());
}

#[tokio::test]
async fn update_without_loaded_settings_is_invalid() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::PUT,
            "/api/v1/shipping-settings",
            Some(json!({ "free_shipping_threshold": "75" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap_or_default()
        .contains("no settings loaded"));
}

#[tokio::test]
async fn seeded_settings_resolve_without_fallback() {
    let app = TestApp::new().await;
    app.state
        .shipping_settings
        .seed_defaults()
        .await
        .expect("seed");

    let response = app.request(Method::GET, "/api/v1/shipping-settings", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["data"]["fallback_reason"].is_null());
}

#[tokio::test]
async fn updated_settings_drive_checkout_pricing() {
    let app = TestApp::new().await;
    app.state
        .shipping_settings
        .seed_defaults()
        .await
        .expect("seed");

    let response = app
        .request(
            Method::PUT,
            "/api/v1/shipping-settings",
            Some(json!({
                "free_shipping_threshold": "200",
                "standard_shipping_cost": "15"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(parse_decimal(&body["data"]["free_shipping_threshold"]), dec!(200));

    // 100 used to ship free at the default threshold of 50; not anymore.
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/quote",
            Some(json!({
                "items": [{
                    "id": "ring-01",
                    "name": "Silver ring",
                    "unit_price": "100",
                    "quantity": 1
                }]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(parse_decimal(&body["data"]["totals"]["shipping"]), dec!(15));
}

#[tokio::test]
async fn negative_rates_are_rejected() {
    let app = TestApp::new().await;
    app.state
        .shipping_settings
        .seed_defaults()
        .await
        .expect("seed");

    let response = app
        .request(
            Method::PUT,
            "/api/v1/shipping-settings",
            Some(json!({ "standard_shipping_cost": "-1" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn free_shipping_helpers_follow_threshold() {
    let app = TestApp::new().await;
    app.state
        .shipping_settings
        .seed_defaults()
        .await
        .expect("seed");

    assert!(app.state.shipping_settings.is_free_shipping(dec!(50)).await);
    assert!(!app.state.shipping_settings.is_free_shipping(dec!(49.99)).await);
    assert_eq!(
        app.state
            .shipping_settings
            .amount_needed_for_free_shipping(dec!(30))
            .await,
        dec!(20)
    );
    assert_eq!(
        app.state
            .shipping_settings
            .amount_needed_for_free_shipping(dec!(80))
            .await,
        dec!(0)
    );
}
