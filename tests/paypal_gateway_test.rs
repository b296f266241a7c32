mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{body_json, TestApp};

fn checkout_body() -> serde_json::Value {
    json!({
        "items": [{
            "id": "ring-01",
            "name": "Silver ring",
            "unit_price": "100",
            "sale_price": "80",
            "quantity": 3
        }],
        "customer": { "email": "cliente@example.com", "name": "Ana Torres" },
        "return_urls": {
            "success": "https://shop.example/checkout/success",
            "failure": "https://shop.example/checkout/failure"
        }
    })
}

async fn app_against(server: &MockServer) -> TestApp {
    let base_url = server.uri();
    TestApp::with_config(move |cfg| {
        cfg.paypal_base_url = Some(base_url);
        cfg.paypal_client_id = Some("test-client".to_string());
        cfg.paypal_client_secret = Some("test-secret".to_string());
    })
    .await
}

fn mock_token() -> Mock {
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .and(body_string_contains("client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A21AAtest",
            "token_type": "Bearer",
            "expires_in": 32400
        })))
}

#[tokio::test]
async fn create_order_sends_capture_intent_and_returns_approve_url() {
    let server = MockServer::start().await;

    mock_token().expect(1).mount(&server).await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders"))
        .and(header("authorization", "Bearer A21AAtest"))
        .and(body_string_contains("CAPTURE"))
        .and(body_string_contains("283.20"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "5O190127TN364715T",
            "status": "CREATED",
            "links": [
                { "href": "https://api.sandbox.paypal.com/self", "rel": "self", "method": "GET" },
                { "href": "https://www.sandbox.paypal.com/checkoutnow?token=5O19", "rel": "approve", "method": "GET" }
            ]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let app = app_against(&server).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/paypal/orders",
            Some(checkout_body()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["data"]["id"], "5O190127TN364715T");
    assert_eq!(
        body["data"]["approve_url"],
        "https://www.sandbox.paypal.com/checkoutnow?token=5O19"
    );

    // Second order reuses the cached token; the token mock allows one call only.
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/paypal/orders",
            Some(checkout_body()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn capture_persists_order_once() {
    let server = MockServer::start().await;

    mock_token().mount(&server).await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/5O190127TN364715T/capture"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "5O190127TN364715T",
            "status": "COMPLETED",
            "payer": {
                "email_address": "cliente@example.com",
                "name": { "given_name": "Ana", "surname": "Torres" }
            },
            "purchase_units": [{
                "payments": { "captures": [{ "id": "3C679366HH908993F", "status": "COMPLETED" }] }
            }]
        })))
        .mount(&server)
        .await;

    let app = app_against(&server).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/paypal/orders/5O190127TN364715T/capture",
            Some(checkout_body()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["created"], true);
    assert_eq!(body["data"]["capture_status"], "COMPLETED");
    assert_eq!(body["data"]["order"]["payment_id"], "3C679366HH908993F");
    assert_eq!(body["data"]["order"]["payment_method"], "paypal");

    // A retried capture resolves to the already-persisted order.
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/paypal/orders/5O190127TN364715T/capture",
            Some(checkout_body()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["created"], false);

    let (_, total) = app.state.orders.list_orders(1, 20).await.expect("list");
    assert_eq!(total, 1);
}

#[tokio::test]
async fn incomplete_capture_is_rejected_and_nothing_persisted() {
    let server = MockServer::start().await;

    mock_token().mount(&server).await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/PENDING1/capture"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "PENDING1",
            "status": "PENDING",
            "purchase_units": [{
                "payments": { "captures": [{ "id": "CAP-PENDING", "status": "PENDING" }] }
            }]
        })))
        .mount(&server)
        .await;

    let app = app_against(&server).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/paypal/orders/PENDING1/capture",
            Some(checkout_body()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (_, total) = app.state.orders.list_orders(1, 20).await.expect("list");
    assert_eq!(total, 0);
}

#[tokio::test]
async fn missing_credentials_fail_before_any_network_call() {
    // No mock server at all: a configuration error must surface without
    // attempting a connection.
    let app = TestApp::with_config(|cfg| {
        cfg.paypal_base_url = Some("http://127.0.0.1:9".to_string());
        cfg.paypal_client_id = None;
        cfg.paypal_client_secret = None;
    })
    .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/paypal/orders",
            Some(checkout_body()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Service misconfigured");
}

#[tokio::test]
async fn gateway_errors_map_to_bad_gateway() {
    let server = MockServer::start().await;

    mock_token().mount(&server).await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream broke"))
        .mount(&server)
        .await;

    let app = app_against(&server).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/paypal/orders",
            Some(checkout_body()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
