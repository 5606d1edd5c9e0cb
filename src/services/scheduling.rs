use chrono::{Datelike, Days, NaiveDate};
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{BookingFilter, ResourceConfig, StatusTaxonomy};
use crate::services::availability::{assign_unit, invalid_dates_in_range, occupying};

#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("{}", .messages.join("; "))]
    Invalid { messages: Vec<String> },

    #[error("requested dates are not available: {}", join_dates(.dates))]
    Conflict { dates: Vec<NaiveDate> },

    #[error("booking store error: {0}")]
    Store(#[from] anyhow::Error),
}

fn join_dates(dates: &[NaiveDate]) -> String {
    dates
        .iter()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Checks a stay against the resource's rules, collecting every violation
/// instead of stopping at the first.
pub fn validate_stay(
    config: &ResourceConfig,
    check_in: NaiveDate,
    check_out: NaiveDate,
    guests: u32,
    today: NaiveDate,
) -> Result<(), SchedulingError> {
    check_stay(config, check_in, check_out, guests, Some(today))
}

/// Re-checks an edited stay. The earliest-start and check-in weekday rules
/// only apply when the check-in itself moved, so a stay already under way
/// can still be extended or shortened.
pub fn validate_stay_change(
    config: &ResourceConfig,
    check_in: NaiveDate,
    check_out: NaiveDate,
    guests: u32,
    today: NaiveDate,
    check_in_moved: bool,
) -> Result<(), SchedulingError> {
    check_stay(config, check_in, check_out, guests, check_in_moved.then_some(today))
}

// `today` is None when the check-in rules are skipped
fn check_stay(
    config: &ResourceConfig,
    check_in: NaiveDate,
    check_out: NaiveDate,
    guests: u32,
    today: Option<NaiveDate>,
) -> Result<(), SchedulingError> {
    let mut messages = vec![];

    if guests < 1 {
        messages.push("at least one guest is required".to_string());
    }

    if check_in >= check_out {
        messages.push("check-out must be after check-in".to_string());
        return Err(SchedulingError::Invalid { messages });
    }

    let rules = config.rules_for(check_in);

    if let Some(today) = today {
        let earliest = today
            .checked_add_days(Days::new(rules.start_day_offset as u64))
            .unwrap_or(today);
        if check_in < earliest {
            messages.push(format!("check-in must be on or after {earliest}"));
        }
        if !config.check_in_weekdays.is_empty() && !config.check_in_weekdays.contains(check_in.weekday()) {
            messages.push(format!("check-in is not allowed on {}", check_in.weekday()));
        }
    }

    let days = config.billable_days(check_in, check_out).len() as u32;
    if rules.min_days > 0 && days < rules.min_days {
        messages.push(format!("minimum stay is {} days", rules.min_days));
    }
    if rules.max_days > 0 && days > rules.max_days {
        messages.push(format!("maximum stay is {} days", rules.max_days));
    }

    if !config.check_out_weekdays.is_empty() && !config.check_out_weekdays.contains(check_out.weekday()) {
        messages.push(format!("check-out is not allowed on {}", check_out.weekday()));
    }

    if messages.is_empty() {
        Ok(())
    } else {
        Err(SchedulingError::Invalid { messages })
    }
}

/// Checks that every billable day of the stay is free and returns the unit
/// it fits in (`None` for single-unit resources). `exclude` leaves one
/// booking out, for re-validating a booking's own date change.
///
/// In per-day mode the check-out day is the range end, so a check-out on
/// the first day of another booking passes when check-out-only days are on.
pub fn validate_booking_range(
    conn: &Connection,
    config: &ResourceConfig,
    taxonomy: &StatusTaxonomy,
    check_in: NaiveDate,
    check_out: NaiveDate,
    exclude: Option<&str>,
) -> Result<Option<i64>, SchedulingError> {
    let days = config.billable_days(check_in, check_out);
    let (Some(first), Some(last)) = (days.first().copied(), days.last().copied()) else {
        return Err(SchedulingError::Invalid {
            messages: vec!["check-out must be after check-in".to_string()],
        });
    };
    let window_end = last.succ_opt().unwrap_or(last);

    let mut bookings = queries::find_bookings(
        conn,
        &BookingFilter {
            resource_id: Some(config.resource_id),
            from: Some(first),
            to: Some(window_end),
            ..BookingFilter::default()
        },
    )?;
    if let Some(id) = exclude {
        bookings.retain(|b| b.id != id);
    }

    let range_end = if config.per_night { window_end } else { last };
    let invalid = invalid_dates_in_range(config, &bookings, taxonomy, first, range_end);
    let conflicts: Vec<NaiveDate> = days.iter().filter(|d| invalid.contains(d)).copied().collect();
    if !conflicts.is_empty() {
        return Err(SchedulingError::Conflict { dates: conflicts });
    }

    if config.units <= 1 {
        return Ok(None);
    }
    let held = occupying(config, &bookings, taxonomy);
    let mut unit = assign_unit(config, &held, &days);
    if unit.is_none() && config.checkout_only && !config.per_night {
        // the released check-out day may be shared with the next stay
        unit = assign_unit(config, &held, &days[..days.len() - 1]);
    }
    unit.map(Some).ok_or(SchedulingError::Conflict { dates: days })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{Booking, SeasonRepeat, SeasonalPeriod, RateTable, StayRules};
    use chrono::{Utc, Weekday};
    use rust_decimal_macros::dec;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn store(conn: &Connection, id: &str, check_in: &str, check_out: &str, unit_id: Option<i64>) {
        let now = Utc::now().naive_utc();
        let booking = Booking {
            id: id.to_string(),
            resource_id: 1,
            unit_id,
            check_in: date(check_in),
            check_out: date(check_out),
            check_in_time: None,
            check_out_time: None,
            status: "processing".to_string(),
            order_id: None,
            guests: 2,
            attributes: Default::default(),
            customer_name: Some("Alice".to_string()),
            customer_email: None,
            customer_phone: None,
            created_at: now,
            updated_at: now,
        };
        queries::create_booking(conn, &booking).unwrap();
    }

    fn messages(err: SchedulingError) -> Vec<String> {
        match err {
            SchedulingError::Invalid { messages } => messages,
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_valid_stay() {
        let config = ResourceConfig::new(1, dec!(100));
        let today = date("2025-01-01");
        assert!(validate_stay(&config, date("2025-01-10"), date("2025-01-12"), 2, today).is_ok());
    }

    #[test]
    fn test_inverted_dates_rejected() {
        let config = ResourceConfig::new(1, dec!(100));
        let today = date("2025-01-01");
        let err = validate_stay(&config, date("2025-01-12"), date("2025-01-12"), 1, today).unwrap_err();
        assert_eq!(messages(err), vec!["check-out must be after check-in"]);
    }

    #[test]
    fn test_violations_are_aggregated() {
        let mut config = ResourceConfig::new(1, dec!(100));
        config.rules = StayRules {
            min_days: 3,
            max_days: 0,
            start_day_offset: 5,
        };
        config.check_in_weekdays = [Weekday::Sat].into_iter().collect();
        let today = date("2025-01-08");

        // Fri 2025-01-10, one night, no guests
        let err = validate_stay(&config, date("2025-01-10"), date("2025-01-11"), 0, today).unwrap_err();
        let msgs = messages(err);
        assert_eq!(msgs.len(), 4);
        assert!(msgs.contains(&"at least one guest is required".to_string()));
        assert!(msgs.contains(&"check-in must be on or after 2025-01-13".to_string()));
        assert!(msgs.contains(&"minimum stay is 3 days".to_string()));
        assert!(msgs.contains(&"check-in is not allowed on Fri".to_string()));
    }

    #[test]
    fn test_season_rules_apply_by_check_in() {
        let mut config = ResourceConfig::new(1, dec!(100));
        config.rules.max_days = 10;
        config.seasons.push(SeasonalPeriod {
            title: "Summer".to_string(),
            start: date("2025-07-01"),
            end: date("2025-08-31"),
            enabled: true,
            repeat: SeasonRepeat::Yearly,
            rates: RateTable::default(),
            rules: StayRules {
                min_days: 7,
                max_days: 0,
                start_day_offset: 0,
            },
        });
        let today = date("2025-01-01");

        let err = validate_stay(&config, date("2025-07-05"), date("2025-07-08"), 2, today).unwrap_err();
        assert_eq!(messages(err), vec!["minimum stay is 7 days"]);
        assert!(validate_stay(&config, date("2025-06-05"), date("2025-06-08"), 2, today).is_ok());
        let too_long = validate_stay(&config, date("2025-07-01"), date("2025-07-20"), 2, today).unwrap_err();
        assert_eq!(messages(too_long), vec!["maximum stay is 10 days"]);
    }

    #[test]
    fn test_conflict_with_existing_booking() {
        let conn = setup_db();
        let config = ResourceConfig::new(1, dec!(100));
        store(&conn, "existing-1", "2025-01-10", "2025-01-12", None);

        let result = validate_booking_range(
            &conn,
            &config,
            &StatusTaxonomy::default(),
            date("2025-01-11"),
            date("2025-01-14"),
            None,
        );
        match result {
            Err(SchedulingError::Conflict { dates }) => assert_eq!(dates, vec![date("2025-01-11")]),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_back_to_back_stays_do_not_conflict() {
        let conn = setup_db();
        let config = ResourceConfig::new(1, dec!(100));
        store(&conn, "existing-2", "2025-01-10", "2025-01-12", None);
        let t = StatusTaxonomy::default();

        // check in on the previous guest's check-out day
        assert!(validate_booking_range(&conn, &config, &t, date("2025-01-12"), date("2025-01-14"), None).is_ok());
        // check out on the day the previous guest checks in
        assert!(validate_booking_range(&conn, &config, &t, date("2025-01-08"), date("2025-01-10"), None).is_ok());
    }

    #[test]
    fn test_excluded_booking_does_not_conflict_with_itself() {
        let conn = setup_db();
        let config = ResourceConfig::new(1, dec!(100));
        store(&conn, "self", "2025-01-10", "2025-01-12", None);
        let t = StatusTaxonomy::default();

        let moved = validate_booking_range(&conn, &config, &t, date("2025-01-11"), date("2025-01-13"), Some("self"));
        assert!(moved.is_ok());
    }

    #[test]
    fn test_multi_unit_picks_free_unit() {
        let conn = setup_db();
        let mut config = ResourceConfig::new(1, dec!(100));
        config.units = 2;
        store(&conn, "u1", "2025-01-10", "2025-01-12", Some(1));
        let t = StatusTaxonomy::default();

        let unit = validate_booking_range(&conn, &config, &t, date("2025-01-10"), date("2025-01-12"), None).unwrap();
        assert_eq!(unit, Some(2));

        store(&conn, "u2", "2025-01-10", "2025-01-12", Some(2));
        let full = validate_booking_range(&conn, &config, &t, date("2025-01-11"), date("2025-01-13"), None);
        assert!(matches!(full, Err(SchedulingError::Conflict { .. })));
    }

    #[test]
    fn test_per_day_checkout_on_next_block_start() {
        let conn = setup_db();
        let mut config = ResourceConfig::new(1, dec!(100));
        config.per_night = false;
        config.checkout_only = true;
        store(&conn, "block", "2025-01-10", "2025-01-12", None);
        let t = StatusTaxonomy::default();

        let ends_on_start = validate_booking_range(&conn, &config, &t, date("2025-01-07"), date("2025-01-10"), None);
        assert!(ends_on_start.is_ok());

        let overlaps = validate_booking_range(&conn, &config, &t, date("2025-01-07"), date("2025-01-11"), None);
        match overlaps {
            Err(SchedulingError::Conflict { dates }) => {
                assert_eq!(dates, vec![date("2025-01-10"), date("2025-01-11")])
            }
            other => panic!("expected conflict, got {other:?}"),
        }

        config.checkout_only = false;
        let strict = validate_booking_range(&conn, &config, &t, date("2025-01-07"), date("2025-01-10"), None);
        assert!(matches!(strict, Err(SchedulingError::Conflict { .. })));
    }

    #[test]
    fn test_per_day_checkout_on_full_multi_unit_block() {
        let conn = setup_db();
        let mut config = ResourceConfig::new(1, dec!(100));
        config.per_night = false;
        config.checkout_only = true;
        config.units = 2;
        store(&conn, "a", "2025-01-10", "2025-01-12", Some(1));
        store(&conn, "b", "2025-01-10", "2025-01-12", Some(2));
        let t = StatusTaxonomy::default();

        let unit = validate_booking_range(&conn, &config, &t, date("2025-01-07"), date("2025-01-10"), None).unwrap();
        assert_eq!(unit, Some(1));
    }

    #[test]
    fn test_stay_change_keeps_started_check_in() {
        let mut config = ResourceConfig::new(1, dec!(100));
        config.check_in_weekdays = [Weekday::Fri].into_iter().collect();
        // Fri 2025-01-10, already under way on the 11th
        let today = date("2025-01-11");

        let extended = validate_stay_change(&config, date("2025-01-10"), date("2025-01-14"), 2, today, false);
        assert!(extended.is_ok());

        let err = validate_stay_change(&config, date("2025-01-10"), date("2025-01-14"), 2, today, true).unwrap_err();
        assert!(messages(err).contains(&"check-in must be on or after 2025-01-11".to_string()));
    }

    #[test]
    fn test_stay_change_still_checks_length_and_check_out() {
        let mut config = ResourceConfig::new(1, dec!(100));
        config.rules.max_days = 3;
        config.check_out_weekdays = [Weekday::Sun].into_iter().collect();
        let today = date("2025-01-11");

        // Fri 10th to Wed 15th
        let err = validate_stay_change(&config, date("2025-01-10"), date("2025-01-15"), 2, today, false).unwrap_err();
        let msgs = messages(err);
        assert_eq!(msgs.len(), 2);
        assert!(msgs.contains(&"maximum stay is 3 days".to_string()));
        assert!(msgs.contains(&"check-out is not allowed on Wed".to_string()));
    }
}
