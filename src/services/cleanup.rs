use chrono::{Duration, NaiveDateTime, Utc};

use crate::db::{self, queries};
use crate::models::BookingEvent;
use crate::state::AppState;

/// Cancels bookings that never left the initial status, never got an order,
/// and were created before `cutoff`. Returns how many were cancelled.
pub fn cancel_stale_bookings(state: &AppState, cutoff: &NaiveDateTime) -> anyhow::Result<usize> {
    let initial = state.taxonomy.initial();
    let cancelled = state.taxonomy.cancelled();

    let stale = {
        let conn = db::lock(&state.db);
        let stale = queries::find_stale_bookings(&conn, initial, cutoff)?;
        for booking in &stale {
            queries::update_booking_status(&conn, &booking.id, cancelled)?;
        }
        stale
    };

    for booking in &stale {
        tracing::info!(booking_id = %booking.id, created_at = %booking.created_at, "stale booking cancelled");
        let _ = state.events.send(BookingEvent::Updated {
            booking_id: booking.id.clone(),
            status: cancelled.to_string(),
        });
    }
    Ok(stale.len())
}

/// Runs [`cancel_stale_bookings`] every minute for bookings older than
/// `max_age_minutes`.
pub async fn run_stale_booking_cleanup(state: std::sync::Arc<AppState>, max_age_minutes: u64) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
    loop {
        interval.tick().await;
        let cutoff = Utc::now().naive_utc() - Duration::minutes(max_age_minutes as i64);
        match cancel_stale_bookings(&state, &cutoff) {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "stale booking cleanup finished"),
            Err(e) => tracing::error!(error = %e, "stale booking cleanup failed"),
        }
    }
}
