use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::check_auth;
use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::{Booking, Order};
use crate::services::commerce::RefundLine;
use crate::state::AppState;

fn commerce_error(e: anyhow::Error) -> AppError {
    AppError::Commerce(format!("{e:#}"))
}

fn require_order(state: &AppState, order_id: i64) -> Result<Order, AppError> {
    state
        .orders
        .get_order(order_id)
        .map_err(commerce_error)?
        .ok_or_else(|| AppError::NotFound(format!("order {order_id}")))
}

// GET /api/orders/:id
#[derive(Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub notes: Vec<String>,
    pub bookings: Vec<Booking>,
}

pub async fn get_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<OrderView>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let order = require_order(&state, id)?;
    let notes = state.orders.notes(id).map_err(commerce_error)?;
    let bookings = {
        let conn = db::lock(&state.db);
        queries::get_bookings_by_order(&conn, id)?
    };
    Ok(Json(OrderView { order, notes, bookings }))
}

// DELETE /api/orders/:id
pub async fn delete_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    require_order(&state, id)?;
    state.orders.delete(id).map_err(commerce_error)?;
    tracing::info!(order_id = id, "order deleted");
    Ok(StatusCode::NO_CONTENT)
}

// POST /api/orders/:id/status
#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

pub async fn set_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<Order>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let status = body.status.trim();
    if status.is_empty() {
        return Err(AppError::Validation(vec!["status is required".to_string()]));
    }
    require_order(&state, id)?;
    state.orders.set_status(id, status).map_err(commerce_error)?;
    Ok(Json(require_order(&state, id)?))
}

// POST /api/orders/:id/trash
pub async fn trash_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Order>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    require_order(&state, id)?;
    state.orders.trash(id).map_err(commerce_error)?;
    tracing::info!(order_id = id, "order trashed");
    Ok(Json(require_order(&state, id)?))
}

// POST /api/orders/:id/refunds
#[derive(Deserialize)]
pub struct RefundRequest {
    pub lines: Vec<RefundLine>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Serialize)]
pub struct RefundResponse {
    pub refund_ids: Vec<i64>,
}

pub async fn refund_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<RefundRequest>,
) -> Result<(StatusCode, Json<RefundResponse>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if body.lines.is_empty() {
        return Err(AppError::Validation(vec!["at least one refund line is required".to_string()]));
    }
    require_order(&state, id)?;
    let refund_ids = state
        .orders
        .refund(id, &body.lines, &body.reason)
        .map_err(commerce_error)?;
    Ok((StatusCode::CREATED, Json(RefundResponse { refund_ids })))
}
