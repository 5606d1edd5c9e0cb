use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;

use crate::db::{self, queries};
use crate::models::{Booking, BookingEvent, BookingPatch, BookingRequest, ResourceConfig, StatusTaxonomy};
use crate::services::pricing::{self, PricingError, Quote};
use crate::services::scheduling::{self, SchedulingError};
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("resource {0} is not configured")]
    UnknownResource(i64),

    #[error("booking {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    /// The booking was written but its order could not be brought in line.
    #[error("order sync failed: {0:#}")]
    Sync(anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct Submission {
    pub booking: Booking,
    pub quote: Quote,
}

fn emit(state: &AppState, event: BookingEvent) {
    tracing::debug!(event = event.name(), "booking event");
    let _ = state.events.send(event);
}

fn unknown_status(status: &str) -> SchedulingError {
    SchedulingError::Invalid {
        messages: vec![format!("unknown status: {status}")],
    }
}

fn load_resource(state: &AppState, resource_id: i64) -> Result<ResourceConfig, BookingError> {
    let conn = db::lock(&state.db);
    queries::get_resource(&conn, resource_id)?.ok_or(BookingError::UnknownResource(resource_id))
}

/// Re-checks availability and writes the booking inside one immediate
/// transaction, so two submissions for the same dates cannot both land.
fn reserve(
    conn: &mut Connection,
    config: &ResourceConfig,
    taxonomy: &StatusTaxonomy,
    booking: &mut Booking,
    insert: bool,
) -> Result<(), BookingError> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(anyhow::Error::from)?;

    if !taxonomy.is_invalid(&booking.status) {
        booking.unit_id = scheduling::validate_booking_range(
            &tx,
            config,
            taxonomy,
            booking.check_in,
            booking.check_out,
            Some(booking.id.as_str()),
        )?;
    }

    if insert {
        queries::create_booking(&tx, booking)?;
    } else {
        queries::update_booking(&tx, booking)?;
    }
    tx.commit().map_err(anyhow::Error::from)?;
    Ok(())
}

/// Validates, prices and stores a new booking, then opens its order when
/// requested.
pub fn submit_booking(state: &AppState, request: BookingRequest, today: NaiveDate) -> Result<Submission, BookingError> {
    let config = load_resource(state, request.resource_id)?;

    let status = request
        .status
        .clone()
        .unwrap_or_else(|| state.taxonomy.initial().to_string());
    if !state.taxonomy.contains(&status) {
        return Err(unknown_status(&status).into());
    }

    scheduling::validate_stay(&config, request.check_in, request.check_out, request.guests, today)?;

    let quote = pricing::price(
        &config,
        request.check_in,
        request.check_out,
        request.guests,
        &request.attributes,
        state.attributes.as_ref(),
    )?;

    let now = Utc::now().naive_utc();
    let mut booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        resource_id: request.resource_id,
        unit_id: None,
        check_in: request.check_in,
        check_out: request.check_out,
        check_in_time: request.check_in_time,
        check_out_time: request.check_out_time,
        status,
        order_id: None,
        guests: request.guests,
        attributes: request.attributes.clone(),
        customer_name: request.customer.name.clone(),
        customer_email: request.customer.email.clone(),
        customer_phone: request.customer.phone.clone(),
        created_at: now,
        updated_at: now,
    };

    {
        let mut conn = db::lock(&state.db);
        reserve(&mut conn, &config, &state.taxonomy, &mut booking, true)?;
    }

    tracing::info!(
        booking_id = %booking.id,
        resource_id = booking.resource_id,
        check_in = %booking.check_in,
        check_out = %booking.check_out,
        total = %quote.total,
        "booking created"
    );
    emit(
        state,
        BookingEvent::Created {
            booking_id: booking.id.clone(),
            resource_id: booking.resource_id,
            status: booking.status.clone(),
        },
    );

    if request.create_order {
        let order_id = state
            .sync
            .create_order_for_booking(&booking, &request.customer)
            .map_err(|e| {
                tracing::error!(booking_id = %booking.id, error = %e, "order creation failed");
                BookingError::Sync(e)
            })?;
        booking.order_id = Some(order_id);
    }

    Ok(Submission { booking, quote })
}

/// Applies a patch and routes the change to the synchronizer.
pub fn update_booking(
    state: &AppState,
    booking_id: &str,
    patch: BookingPatch,
    today: NaiveDate,
) -> Result<Booking, BookingError> {
    let current = {
        let conn = db::lock(&state.db);
        queries::get_booking_by_id(&conn, booking_id)?
    }
    .ok_or_else(|| BookingError::NotFound(booking_id.to_string()))?;

    if let Some(status) = &patch.status {
        if !state.taxonomy.contains(status) {
            return Err(unknown_status(status).into());
        }
    }

    let dates_changed = patch.changes_dates(&current);
    let price_changed = patch.changes_price(&current);

    let mut booking = current.clone();
    if let Some(status) = patch.status {
        booking.status = status;
    }
    if let Some(check_in) = patch.check_in {
        booking.check_in = check_in;
    }
    if let Some(check_out) = patch.check_out {
        booking.check_out = check_out;
    }
    if let Some(guests) = patch.guests {
        booking.guests = guests;
    }
    if let Some(attributes) = patch.attributes {
        booking.attributes = attributes;
    }
    booking.updated_at = Utc::now().naive_utc();

    let reoccupies = state.taxonomy.is_invalid(&current.status) && !state.taxonomy.is_invalid(&booking.status);

    if dates_changed || reoccupies {
        let config = load_resource(state, booking.resource_id)?;
        if dates_changed {
            scheduling::validate_stay_change(
                &config,
                booking.check_in,
                booking.check_out,
                booking.guests,
                today,
                booking.check_in != current.check_in,
            )?;
        }
        let mut conn = db::lock(&state.db);
        reserve(&mut conn, &config, &state.taxonomy, &mut booking, false)?;
    } else {
        if booking.guests < 1 {
            return Err(SchedulingError::Invalid {
                messages: vec!["at least one guest is required".to_string()],
            }
            .into());
        }
        let conn = db::lock(&state.db);
        queries::update_booking(&conn, &booking)?;
    }

    tracing::info!(booking_id, status = %booking.status, dates_changed, price_changed, "booking updated");

    if price_changed && booking.order_id.is_some() {
        state.sync.mark_for_recompute(booking_id);
    }
    emit(
        state,
        BookingEvent::Updated {
            booking_id: booking.id.clone(),
            status: booking.status.clone(),
        },
    );
    state.sync.on_booking_updated(booking_id).map_err(|e| {
        tracing::error!(booking_id, error = %e, "order sync failed");
        BookingError::Sync(e)
    })?;

    Ok(booking)
}

pub fn delete_booking(state: &AppState, booking_id: &str) -> Result<(), BookingError> {
    let booking = {
        let conn = db::lock(&state.db);
        queries::get_booking_by_id(&conn, booking_id)?
    }
    .ok_or_else(|| BookingError::NotFound(booking_id.to_string()))?;

    emit(
        state,
        BookingEvent::BeforeDelete {
            booking_id: booking.id.clone(),
            order_id: booking.order_id,
        },
    );
    state.sync.on_booking_deleted(booking_id).map_err(|e| {
        tracing::error!(booking_id, error = %e, "line item removal failed");
        BookingError::Sync(e)
    })?;

    {
        let conn = db::lock(&state.db);
        queries::delete_booking(&conn, booking_id)?;
    }
    tracing::info!(booking_id, "booking deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::models::CustomerInfo;
    use crate::state::build_state;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn test_state() -> Arc<AppState> {
        let config = AppConfig {
            port: 0,
            database_url: ":memory:".to_string(),
            admin_token: "test-token".to_string(),
            business_name: "Test Stays".to_string(),
            status_taxonomy: None,
            prices_include_tax: false,
            tax_rate: Decimal::ZERO,
            stale_booking_minutes: 0,
        };
        let conn = db::init_db(":memory:").unwrap();
        let state = build_state(config, conn).unwrap();
        {
            let conn = db::lock(&state.db);
            queries::save_resource(&conn, &ResourceConfig::new(1, dec!(100))).unwrap();
        }
        state
    }

    fn request(check_in: &str, check_out: &str, create_order: bool) -> BookingRequest {
        BookingRequest {
            resource_id: 1,
            check_in: date(check_in),
            check_out: date(check_out),
            check_in_time: None,
            check_out_time: None,
            guests: 2,
            attributes: Default::default(),
            status: Some("processing".to_string()),
            customer: CustomerInfo {
                name: Some("Alice".to_string()),
                email: Some("alice@example.com".to_string()),
                phone: None,
            },
            create_order,
        }
    }

    const TODAY: &str = "2025-01-01";

    #[test]
    fn test_submit_creates_booking_and_order() {
        let state = test_state();
        let mut rx = state.events.subscribe();

        let submission = submit_booking(&state, request("2025-01-10", "2025-01-12", true), date(TODAY)).unwrap();
        assert_eq!(submission.quote.total, dec!(200));
        let order_id = submission.booking.order_id.unwrap();

        let stored = {
            let conn = db::lock(&state.db);
            queries::get_booking_by_id(&conn, &submission.booking.id).unwrap().unwrap()
        };
        assert_eq!(stored.order_id, Some(order_id));
        assert_eq!(stored.customer_email.as_deref(), Some("alice@example.com"));
        assert!(matches!(rx.try_recv().unwrap(), BookingEvent::Created { .. }));
    }

    #[test]
    fn test_submit_rejects_overlap() {
        let state = test_state();
        submit_booking(&state, request("2025-01-10", "2025-01-12", false), date(TODAY)).unwrap();
        let err = submit_booking(&state, request("2025-01-11", "2025-01-13", false), date(TODAY)).unwrap_err();
        assert!(matches!(err, BookingError::Scheduling(SchedulingError::Conflict { .. })));
    }

    #[test]
    fn test_submit_unknown_resource_and_status() {
        let state = test_state();
        let mut req = request("2025-01-10", "2025-01-12", false);
        req.resource_id = 42;
        assert!(matches!(
            submit_booking(&state, req, date(TODAY)),
            Err(BookingError::UnknownResource(42))
        ));

        let mut req = request("2025-01-10", "2025-01-12", false);
        req.status = Some("bogus".to_string());
        assert!(matches!(
            submit_booking(&state, req, date(TODAY)),
            Err(BookingError::Scheduling(SchedulingError::Invalid { .. }))
        ));
    }

    #[test]
    fn test_update_dates_reprices_order() {
        let state = test_state();
        let submission = submit_booking(&state, request("2025-01-10", "2025-01-12", true), date(TODAY)).unwrap();
        let order_id = submission.booking.order_id.unwrap();

        let patch = BookingPatch {
            check_out: Some(date("2025-01-14")),
            ..BookingPatch::default()
        };
        let updated = update_booking(&state, &submission.booking.id, patch, date(TODAY)).unwrap();
        assert_eq!(updated.check_out, date("2025-01-14"));

        let order = state.orders.get_order(order_id).unwrap().unwrap();
        assert_eq!(order.total, dec!(400));
        let meta = order.items[0].meta.as_ref().unwrap();
        assert_eq!(meta.check_out, date("2025-01-14"));
    }

    #[test]
    fn test_extend_stay_already_under_way() {
        let state = test_state();
        let submission = submit_booking(&state, request("2025-01-10", "2025-01-12", false), date(TODAY)).unwrap();

        let patch = BookingPatch {
            check_out: Some(date("2025-01-14")),
            ..BookingPatch::default()
        };
        let updated = update_booking(&state, &submission.booking.id, patch, date("2025-01-11")).unwrap();
        assert_eq!(updated.check_in, date("2025-01-10"));
        assert_eq!(updated.check_out, date("2025-01-14"));

        let move_back = BookingPatch {
            check_in: Some(date("2025-01-09")),
            ..BookingPatch::default()
        };
        let err = update_booking(&state, &submission.booking.id, move_back, date("2025-01-11")).unwrap_err();
        assert!(matches!(err, BookingError::Scheduling(SchedulingError::Invalid { .. })));
    }

    #[test]
    fn test_update_into_taken_dates_is_rejected() {
        let state = test_state();
        submit_booking(&state, request("2025-01-10", "2025-01-12", false), date(TODAY)).unwrap();
        let mover = submit_booking(&state, request("2025-01-14", "2025-01-16", false), date(TODAY)).unwrap();

        let patch = BookingPatch {
            check_in: Some(date("2025-01-11")),
            ..BookingPatch::default()
        };
        let err = update_booking(&state, &mover.booking.id, patch, date(TODAY)).unwrap_err();
        assert!(matches!(err, BookingError::Scheduling(SchedulingError::Conflict { .. })));
    }

    #[test]
    fn test_cancelled_booking_frees_dates() {
        let state = test_state();
        let first = submit_booking(&state, request("2025-01-10", "2025-01-12", false), date(TODAY)).unwrap();
        let patch = BookingPatch {
            status: Some("cancelled".to_string()),
            ..BookingPatch::default()
        };
        update_booking(&state, &first.booking.id, patch, date(TODAY)).unwrap();

        assert!(submit_booking(&state, request("2025-01-10", "2025-01-12", false), date(TODAY)).is_ok());

        // reviving the cancelled booking now collides
        let revive = BookingPatch {
            status: Some("processing".to_string()),
            ..BookingPatch::default()
        };
        let err = update_booking(&state, &first.booking.id, revive, date(TODAY)).unwrap_err();
        assert!(matches!(err, BookingError::Scheduling(SchedulingError::Conflict { .. })));
    }

    #[test]
    fn test_delete_removes_booking_and_empty_order() {
        let state = test_state();
        let submission = submit_booking(&state, request("2025-01-10", "2025-01-12", true), date(TODAY)).unwrap();
        let order_id = submission.booking.order_id.unwrap();

        delete_booking(&state, &submission.booking.id).unwrap();

        let conn = db::lock(&state.db);
        assert!(queries::get_booking_by_id(&conn, &submission.booking.id).unwrap().is_none());
        drop(conn);
        assert!(state.orders.get_order(order_id).unwrap().is_none());
    }

    #[test]
    fn test_delete_unknown_booking() {
        let state = test_state();
        assert!(matches!(
            delete_booking(&state, "nope"),
            Err(BookingError::NotFound(_))
        ));
    }
}
