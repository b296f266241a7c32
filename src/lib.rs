pub mod cart;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod webhooks;

use axum::{extract::State, Json, Router};
use chrono::Utc;
use http::{header, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::ToSchema;

use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::gateway::{MercadoPagoClient, PayPalClient};
use crate::services::{OrderService, ShippingSettingsService};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: Arc<config::AppConfig>,
    pub orders: OrderService,
    pub shipping_settings: ShippingSettingsService,
    pub paypal: PayPalClient,
    pub mercadopago: MercadoPagoClient,
    pub event_sender: Option<Arc<EventSender>>,
}

impl AppState {
    pub fn new(
        db: Arc<DbPool>,
        config: Arc<config::AppConfig>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Result<Self, ServiceError> {
        let orders = OrderService::new(db.clone(), event_sender.clone());
        let shipping_settings = ShippingSettingsService::new(db.clone());
        let paypal = PayPalClient::from_config(&config)?;
        let mercadopago = MercadoPagoClient::from_config(&config)?;

        Ok(Self {
            db,
            config,
            orders,
            shipping_settings,
            paypal,
            mercadopago,
            event_sender,
        })
    }
}

// Common response wrappers
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ResponseMeta {
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, per_page: u64) -> Self {
        let per_page = per_page.max(1);
        Self {
            items,
            total,
            page,
            per_page,
            total_pages: total.div_ceil(per_page),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// All v1 API routes, mounted under /api/v1
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/checkout", handlers::checkout::routes())
        .nest("/payments", handlers::checkout::payment_routes())
        .nest("/orders", handlers::orders::routes())
        .nest("/shipping-settings", handlers::shipping_settings::routes())
        .nest("/webhooks", handlers::webhooks::routes())
}

/// Builds the CORS layer from config.
///
/// Explicit origins take precedence. Wildcard method/header lists are only
/// used without credentials: tower-http rejects `Any` combined with
/// `Access-Control-Allow-Credentials: true` when serving a request.
pub fn build_cors_layer(config: &config::AppConfig) -> Result<CorsLayer, ServiceError> {
    let configured_origins: Option<Vec<HeaderValue>> = config
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured_origins {
        let layer = CorsLayer::new().allow_origin(origins);
        if config.cors_allow_credentials {
            Ok(layer
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
                .allow_credentials(true))
        } else {
            Ok(layer.allow_methods(Any).allow_headers(Any))
        }
    } else if config.should_allow_permissive_cors() {
        Ok(CorsLayer::permissive())
    } else {
        Err(ServiceError::ConfigError(
            "Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true".to_string(),
        ))
    }
}

/// Service identity and version
pub async fn api_status() -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Readiness probe: verifies the database connection
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let database = match db::check_connection(&state.db).await {
        Ok(()) => "up",
        Err(_) => "down",
    };

    Json(json!({
        "status": if database == "up" { "healthy" } else { "degraded" },
        "database": database,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
