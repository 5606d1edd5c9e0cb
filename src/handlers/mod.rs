pub mod bookings;
pub mod calendar;
pub mod events;
pub mod health;
pub mod orders;
pub mod resources;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::state::AppState;

pub(crate) fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/statuses", get(resources::get_statuses))
        .route("/api/resources", get(resources::list_resources))
        .route(
            "/api/resources/:id",
            get(resources::get_resource).put(resources::put_resource),
        )
        .route(
            "/api/resources/:id/availability",
            get(resources::get_availability),
        )
        .route("/api/resources/:id/days/:date", get(resources::check_day))
        .route("/api/resources/:id/quote", post(resources::quote))
        .route(
            "/api/bookings",
            get(bookings::list_bookings).post(bookings::create_booking),
        )
        .route(
            "/api/bookings/:id",
            get(bookings::get_booking)
                .patch(bookings::update_booking)
                .delete(bookings::delete_booking),
        )
        .route("/api/bookings/:id/order", post(bookings::create_order))
        .route(
            "/api/orders/:id",
            get(orders::get_order).delete(orders::delete_order),
        )
        .route("/api/orders/:id/status", post(orders::set_status))
        .route("/api/orders/:id/trash", post(orders::trash_order))
        .route("/api/orders/:id/refunds", post(orders::refund_order))
        .route("/api/events", get(events::events_stream))
        .route("/calendar/:resource_id", get(calendar::resource_feed))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
