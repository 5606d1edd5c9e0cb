use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::check_auth;
use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::{Booking, BookingFilter, BookingPatch, BookingRequest};
use crate::services::bookings::{self as booking_service, Submission};
use crate::state::AppState;

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

// GET /api/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub resource_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub status: Option<String>,
    pub order_id: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let filter = BookingFilter {
        resource_id: query.resource_id,
        from: query.from,
        to: query.to,
        status: query.status,
        order_id: query.order_id,
        limit: Some(query.limit.unwrap_or(100)),
    };
    let conn = db::lock(&state.db);
    Ok(Json(queries::find_bookings(&conn, &filter)?))
}

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<BookingRequest>,
) -> Result<(StatusCode, Json<Submission>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let submission = booking_service::submit_booking(&state, request, today())?;
    Ok((StatusCode::CREATED, Json(submission)))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let conn = db::lock(&state.db);
    queries::get_booking_by_id(&conn, &id)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")))
}

// PATCH /api/bookings/:id
pub async fn update_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<BookingPatch>,
) -> Result<Json<Booking>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    Ok(Json(booking_service::update_booking(&state, &id, patch, today())?))
}

// DELETE /api/bookings/:id
pub async fn delete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    booking_service::delete_booking(&state, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

// POST /api/bookings/:id/order
#[derive(Serialize)]
pub struct OrderCreated {
    pub booking_id: String,
    pub order_id: i64,
}

pub async fn create_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<OrderCreated>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let booking = {
        let conn = db::lock(&state.db);
        queries::get_booking_by_id(&conn, &id)?
    }
    .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;

    let order_id = state
        .sync
        .create_order_for_booking(&booking, &booking.customer())
        .map_err(|e| AppError::Commerce(format!("{e:#}")))?;

    Ok(Json(OrderCreated {
        booking_id: booking.id,
        order_id,
    }))
}
