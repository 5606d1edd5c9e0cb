use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{Days, NaiveDate, Utc};
use serde::Deserialize;

use super::check_auth;
use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::{Attributes, Booking, BookingFilter, ResourceConfig, StatusTaxonomy};
use crate::services::availability::{AvailabilitySnapshot, DayContext, DayVerdict, Selection};
use crate::services::pricing::{self, Quote};
use crate::state::AppState;

const DEFAULT_WINDOW_DAYS: u64 = 90;
const MAX_WINDOW_DAYS: i64 = 730;

// every computed window materializes one entry per day
fn check_window(from: NaiveDate, to: NaiveDate) -> Result<(), AppError> {
    if (to - from).num_days() > MAX_WINDOW_DAYS {
        return Err(AppError::Validation(vec![format!(
            "date range may span at most {MAX_WINDOW_DAYS} days"
        )]));
    }
    Ok(())
}

fn load_config(state: &AppState, resource_id: i64) -> Result<ResourceConfig, AppError> {
    let conn = db::lock(&state.db);
    queries::get_resource(&conn, resource_id)?.ok_or_else(|| AppError::NotFound(format!("resource {resource_id}")))
}

/// Bookings that can affect availability anywhere in `[from, to]`, padded
/// by a day on each side for block-edge detection.
fn load_window(state: &AppState, resource_id: i64, from: NaiveDate, to: NaiveDate) -> Result<Vec<Booking>, AppError> {
    let conn = db::lock(&state.db);
    let bookings = queries::find_bookings(
        &conn,
        &BookingFilter {
            resource_id: Some(resource_id),
            from: from.pred_opt(),
            to: to.succ_opt(),
            ..BookingFilter::default()
        },
    )?;
    Ok(bookings)
}

// GET /api/statuses
pub async fn get_statuses(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StatusTaxonomy>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    Ok(Json(state.taxonomy.as_ref().clone()))
}

// GET /api/resources
pub async fn list_resources(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ResourceConfig>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let conn = db::lock(&state.db);
    Ok(Json(queries::list_resources(&conn)?))
}

// GET /api/resources/:id
pub async fn get_resource(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ResourceConfig>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    Ok(Json(load_config(&state, id)?))
}

// PUT /api/resources/:id
pub async fn put_resource(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(mut config): Json<ResourceConfig>,
) -> Result<Json<ResourceConfig>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    config.resource_id = id;
    config
        .validate()
        .map_err(|e| AppError::Validation(vec![e.to_string()]))?;

    {
        let conn = db::lock(&state.db);
        queries::save_resource(&conn, &config)?;
    }
    tracing::info!(resource_id = id, units = config.units, per_night = config.per_night, "resource saved");
    Ok(Json(config))
}

// GET /api/resources/:id/availability?from=&to=
#[derive(Deserialize)]
pub struct WindowQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<AvailabilitySnapshot>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let config = load_config(&state, id)?;

    let from = query.from.unwrap_or_else(|| Utc::now().date_naive());
    let to = match query.to {
        Some(to) => to,
        None => from
            .checked_add_days(Days::new(DEFAULT_WINDOW_DAYS))
            .unwrap_or(from),
    };
    check_window(from, to)?;
    let bookings = load_window(&state, id, from, to)?;
    Ok(Json(AvailabilitySnapshot::build(&config, &bookings, &state.taxonomy, from, to)))
}

// GET /api/resources/:id/days/:date?check_in=&today=
#[derive(Deserialize)]
pub struct DayQuery {
    pub check_in: Option<NaiveDate>,
    pub today: Option<NaiveDate>,
}

pub async fn check_day(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, day)): Path<(i64, NaiveDate)>,
    Query(query): Query<DayQuery>,
) -> Result<Json<DayVerdict>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let config = load_config(&state, id)?;

    let from = query.check_in.map_or(day, |c| c.min(day));
    let to = query.check_in.map_or(day, |c| c.max(day));
    check_window(from, to)?;
    let (from, to) = (from.pred_opt().unwrap_or(from), to.succ_opt().unwrap_or(to));
    let bookings = load_window(&state, id, from, to)?;
    let snapshot = AvailabilitySnapshot::build(&config, &bookings, &state.taxonomy, from, to);

    let ctx = DayContext {
        today: query.today.unwrap_or_else(|| Utc::now().date_naive()),
        selection: query.check_in.map_or(Selection::Empty, Selection::CheckIn),
    };
    Ok(Json(snapshot.is_day_valid(&config, day, &ctx)))
}

// POST /api/resources/:id/quote
#[derive(Deserialize)]
pub struct QuoteRequest {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[serde(default = "one")]
    pub guests: u32,
    #[serde(default)]
    pub attributes: Attributes,
}

fn one() -> u32 {
    1
}

pub async fn quote(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<QuoteRequest>,
) -> Result<Json<Quote>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    check_window(body.check_in, body.check_out)?;
    let config = load_config(&state, id)?;
    Ok(Json(pricing::price(
        &config,
        body.check_in,
        body.check_out,
        body.guests,
        &body.attributes,
        state.attributes.as_ref(),
    )?))
}
