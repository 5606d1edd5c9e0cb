use chrono::{Days, Utc};

use crate::models::{Booking, ResourceConfig, StatusTaxonomy};

/// RFC 5545 feed of a resource's bookings as all-day events. Bookings in an
/// invalid status are left out.
pub fn generate_ics(
    config: &ResourceConfig,
    bookings: &[Booking],
    taxonomy: &StatusTaxonomy,
    business_name: &str,
) -> String {
    let calendar_name = if config.title.is_empty() {
        format!("{business_name} #{}", config.resource_id)
    } else {
        format!("{business_name} - {}", config.title)
    };
    let dtstamp = Utc::now().naive_utc().format("%Y%m%dT%H%M%SZ").to_string();

    let mut ics = format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Staybook//Booking Calendar//EN\r\n\
         X-WR-CALNAME:{}\r\n",
        escape(&calendar_name)
    );

    for booking in bookings.iter().filter(|b| !taxonomy.is_invalid(&b.status)) {
        let end = if config.per_night {
            booking.check_out
        } else {
            booking
                .check_out
                .checked_add_days(Days::new(1))
                .unwrap_or(booking.check_out)
        };
        let guest = booking.customer_name.as_deref().unwrap_or("Guest");
        let mut summary = format!("{guest} ({} guests)", booking.guests);
        if let Some(unit) = booking.unit_id {
            summary.push_str(&format!(", unit {unit}"));
        }

        ics.push_str(&format!(
            "BEGIN:VEVENT\r\n\
             UID:{}@staybook\r\n\
             DTSTAMP:{dtstamp}\r\n\
             DTSTART;VALUE=DATE:{}\r\n\
             DTEND;VALUE=DATE:{}\r\n\
             SUMMARY:{}\r\n\
             DESCRIPTION:Status: {}\r\n\
             END:VEVENT\r\n",
            booking.id,
            booking.check_in.format("%Y%m%d"),
            end.format("%Y%m%d"),
            escape(&summary),
            escape(&booking.status),
        ));
    }

    ics.push_str("END:VCALENDAR\r\n");
    ics
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}
