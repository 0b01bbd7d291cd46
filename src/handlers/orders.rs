use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    dtos::order_dtos::{CreateOrderRequest, UpdateStatusRequest},
    errors::{AppError, Result},
    extractors::ApiJson,
    models::{
        order::{OrderResponse, OrderStatus, OrderTrackingResponse},
        user::AuthUser,
    },
    state::AppState,
};

pub async fn create_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(payload): ApiJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    if payload.items.is_empty() {
        return Err(AppError::invalid_data("No items in order"));
    }
    payload.validate()?;

    let lines = payload
        .items
        .into_iter()
        .map(|item| item.into_line())
        .collect::<Result<Vec<_>>>()?;

    let order = state
        .orders
        .create_order(user.id, payload.shipping_address.into(), lines)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Order placed successfully",
            "data": OrderResponse::from(order),
        })),
    ))
}

pub async fn get_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let order = state.orders.get_order(&user.id, &id).await?;
    Ok(Json(json!({ "success": true, "data": OrderResponse::from(order) })))
}

pub async fn track_order(State(state): State<AppState>, Path(reference): Path<String>) -> Result<Json<Value>> {
    let order = state.orders.track(&reference).await?;
    Ok(Json(json!({ "success": true, "data": OrderTrackingResponse::from(order) })))
}

pub async fn my_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>> {
    let orders: Vec<OrderResponse> = state
        .orders
        .orders_for_user(&user.id)
        .await?
        .into_iter()
        .map(OrderResponse::from)
        .collect();
    Ok(Json(json!({ "success": true, "count": orders.len(), "data": orders })))
}

pub async fn seller_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>> {
    let orders: Vec<OrderResponse> = state
        .orders
        .orders_for_seller(&user.id)
        .await?
        .into_iter()
        .map(OrderResponse::from)
        .collect();
    Ok(Json(json!({ "success": true, "count": orders.len(), "data": orders })))
}

pub async fn update_order_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<UpdateStatusRequest>,
) -> Result<Json<Value>> {
    let status: OrderStatus = payload.status.parse()?;
    let order = state.orders.update_status(&user.id, &id, status).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Order status updated to {}", status.as_str()),
        "data": OrderResponse::from(order),
    })))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let order = state.orders.cancel(&user.id, &id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Order cancelled",
        "data": OrderResponse::from(order),
    })))
}
