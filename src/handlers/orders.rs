use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::entities::order_item;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::orders::OrderResponse;
use crate::{ApiResponse, PaginatedResponse};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListParams {
    /// 1-based page number
    pub page: Option<u64>,
    /// Page size, capped at 100
    pub per_page: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: String,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_material: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<order_item::Model> for OrderItemResponse {
    fn from(model: order_item::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            name: model.name,
            quantity: model.quantity,
            unit_price: model.unit_price,
            total_price: model.total_price,
            selected_size: model.selected_size,
            selected_material: model.selected_material,
            created_at: model.created_at,
        }
    }
}

/// List orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(ListParams),
    responses(
        (status = 200, description = "Orders page", body = PaginatedResponse<OrderResponse>)
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<PaginatedResponse<OrderResponse>>, ServiceError> {
    let page = params.page.unwrap_or(1);
    let per_page = params.per_page.unwrap_or(20);

    let (orders, total) = state.orders.list_orders(page, per_page).await?;
    let items = orders.into_iter().map(OrderResponse::from).collect();

    Ok(Json(PaginatedResponse::new(items, total, page, per_page)))
}

/// Fetch a single order by id
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.orders.get_order(id).await?;
    Ok(Json(ApiResponse::success(OrderResponse::from(order))))
}

/// Fetch a single order by its human-readable number
#[utoipa::path(
    get,
    path = "/api/v1/orders/by-number/{order_number}",
    params(("order_number" = String, Path, description = "Order number, e.g. PP-20250826-4821")),
    responses(
        (status = 200, description = "Order", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order_by_number(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.orders.get_order_by_number(&order_number).await?;
    Ok(Json(ApiResponse::success(OrderResponse::from(order))))
}

/// List the items of an order
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/items",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order items", body = ApiResponse<Vec<OrderItemResponse>>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order_items(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<OrderItemResponse>>>, ServiceError> {
    let items = state.orders.get_order_items(id).await?;
    let items = items.into_iter().map(OrderItemResponse::from).collect();
    Ok(Json(ApiResponse::success(items)))
}

/// Order routes, mounted under /orders
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/by-number/:order_number", get(get_order_by_number))
        .route("/:id/items", get(get_order_items))
}
