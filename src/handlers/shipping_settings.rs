use axum::{
    extract::{Json, State},
    routing::{get, put},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::shipping_settings;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::shipping_settings::{SettingsResolution, UpdateShippingSettingsRequest};
use crate::ApiResponse;

#[derive(Debug, Serialize, ToSchema)]
pub struct ShippingSettingsResponse {
    pub id: Uuid,
    pub free_shipping_threshold: Decimal,
    pub standard_shipping_cost: Decimal,
    pub currency: String,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<shipping_settings::Model> for ShippingSettingsResponse {
    fn from(model: shipping_settings::Model) -> Self {
        Self {
            id: model.id,
            free_shipping_threshold: model.free_shipping_threshold,
            standard_shipping_cost: model.standard_shipping_cost,
            currency: model.currency,
            updated_at: model.updated_at,
        }
    }
}

/// Current shipping configuration as seen by checkout.
/// Always succeeds; a fallback reason marks degraded resolution.
#[utoipa::path(
    get,
    path = "/api/v1/shipping-settings",
    responses(
        (status = 200, description = "Effective shipping settings", body = ApiResponse<SettingsResolution>)
    ),
    tag = "Shipping settings"
)]
pub async fn get_shipping_settings(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<SettingsResolution>>, ServiceError> {
    let resolution = state.shipping_settings.resolve().await;
    Ok(Json(ApiResponse::success(resolution)))
}

/// Update the active shipping settings row
#[utoipa::path(
    put,
    path = "/api/v1/shipping-settings",
    request_body = UpdateShippingSettingsRequest,
    responses(
        (status = 200, description = "Updated settings", body = ApiResponse<ShippingSettingsResponse>),
        (status = 400, description = "Invalid settings or none loaded", body = crate::errors::ErrorResponse)
    ),
    tag = "Shipping settings"
)]
pub async fn update_shipping_settings(
    State(state): State<AppState>,
    Json(request): Json<UpdateShippingSettingsRequest>,
) -> Result<Json<ApiResponse<ShippingSettingsResponse>>, ServiceError> {
    let updated = state.shipping_settings.update(request).await?;
    Ok(Json(ApiResponse::success(ShippingSettingsResponse::from(
        updated,
    ))))
}

/// Shipping-settings routes, mounted under /shipping-settings
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_shipping_settings))
        .route("/", put(update_shipping_settings))
}
