use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::BookingFilter;
use crate::services::calendar::generate_ics;
use crate::state::AppState;

// GET /calendar/:resource_id, optionally with a .ics suffix
pub async fn resource_feed(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    let resource_id: i64 = raw_id
        .strip_suffix(".ics")
        .unwrap_or(&raw_id)
        .parse()
        .map_err(|_| AppError::NotFound(format!("resource {raw_id}")))?;

    let (config, bookings) = {
        let conn = db::lock(&state.db);
        let config = queries::get_resource(&conn, resource_id)?
            .ok_or_else(|| AppError::NotFound(format!("resource {resource_id}")))?;
        let bookings = queries::find_bookings(
            &conn,
            &BookingFilter {
                resource_id: Some(resource_id),
                ..BookingFilter::default()
            },
        )?;
        (config, bookings)
    };

    let ics = generate_ics(&config, &bookings, &state.taxonomy, &state.config.business_name);
    let filename = format!("resource-{resource_id}.ics");

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        ics,
    )
        .into_response())
}
