use std::str::FromStr;

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;

use crate::models::{
    Booking, BookingFilter, CustomerInfo, LineItem, LineItemMeta, NewLineItem, Order, Refund,
    ResourceConfig,
};

const TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";
const DATE: &str = "%Y-%m-%d";
const TIME: &str = "%H:%M:%S";

const BOOKING_COLUMNS: &str = "id, resource_id, unit_id, check_in, check_out, check_in_time, check_out_time, \
     status, order_id, guests, attributes, customer_name, customer_email, customer_phone, created_at, updated_at";

fn now_str() -> String {
    Utc::now().naive_utc().format(TIMESTAMP).to_string()
}

// ── Bookings ──

pub fn create_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
        ),
        params![
            booking.id,
            booking.resource_id,
            booking.unit_id,
            booking.check_in.format(DATE).to_string(),
            booking.check_out.format(DATE).to_string(),
            booking.check_in_time.map(|t| t.format(TIME).to_string()),
            booking.check_out_time.map(|t| t.format(TIME).to_string()),
            booking.status,
            booking.order_id,
            booking.guests,
            serde_json::to_string(&booking.attributes)?,
            booking.customer_name,
            booking.customer_email,
            booking.customer_phone,
            booking.created_at.format(TIMESTAMP).to_string(),
            booking.updated_at.format(TIMESTAMP).to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        params![id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Bookings matching every set field of the filter. A date window matches
/// bookings whose `[check_in, check_out]` intersects it.
pub fn find_bookings(conn: &Connection, filter: &BookingFilter) -> anyhow::Result<Vec<Booking>> {
    let mut clauses: Vec<String> = vec![];
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![];

    if let Some(resource_id) = filter.resource_id {
        params_vec.push(Box::new(resource_id));
        clauses.push(format!("resource_id = ?{}", params_vec.len()));
    }
    if let Some(to) = filter.to {
        params_vec.push(Box::new(to.format(DATE).to_string()));
        clauses.push(format!("check_in <= ?{}", params_vec.len()));
    }
    if let Some(from) = filter.from {
        params_vec.push(Box::new(from.format(DATE).to_string()));
        clauses.push(format!("check_out >= ?{}", params_vec.len()));
    }
    if let Some(status) = &filter.status {
        params_vec.push(Box::new(status.clone()));
        clauses.push(format!("status = ?{}", params_vec.len()));
    }
    if let Some(order_id) = filter.order_id {
        params_vec.push(Box::new(order_id));
        clauses.push(format!("order_id = ?{}", params_vec.len()));
    }

    let mut sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY check_in ASC, created_at ASC");
    if let Some(limit) = filter.limit {
        params_vec.push(Box::new(limit));
        sql.push_str(&format!(" LIMIT ?{}", params_vec.len()));
    }

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn get_bookings_by_order(conn: &Connection, order_id: i64) -> anyhow::Result<Vec<Booking>> {
    find_bookings(
        conn,
        &BookingFilter {
            order_id: Some(order_id),
            ..BookingFilter::default()
        },
    )
}

/// Writes every mutable field and stamps `updated_at`.
pub fn update_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET unit_id = ?1, check_in = ?2, check_out = ?3, check_in_time = ?4,
            check_out_time = ?5, status = ?6, order_id = ?7, guests = ?8, attributes = ?9,
            customer_name = ?10, customer_email = ?11, customer_phone = ?12, updated_at = ?13
         WHERE id = ?14",
        params![
            booking.unit_id,
            booking.check_in.format(DATE).to_string(),
            booking.check_out.format(DATE).to_string(),
            booking.check_in_time.map(|t| t.format(TIME).to_string()),
            booking.check_out_time.map(|t| t.format(TIME).to_string()),
            booking.status,
            booking.order_id,
            booking.guests,
            serde_json::to_string(&booking.attributes)?,
            booking.customer_name,
            booking.customer_email,
            booking.customer_phone,
            booking.updated_at.format(TIMESTAMP).to_string(),
            booking.id,
        ],
    )?;
    Ok(count > 0)
}

pub fn update_booking_status(conn: &Connection, id: &str, status: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status, now_str(), id],
    )?;
    Ok(count > 0)
}

/// Links a booking to its order without touching `updated_at`.
pub fn set_booking_order(conn: &Connection, id: &str, order_id: i64) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET order_id = ?1 WHERE id = ?2",
        params![order_id, id],
    )?;
    Ok(count > 0)
}

pub fn delete_booking(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM bookings WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

/// Bookings still in `status`, never linked to an order, created before `cutoff`.
pub fn find_stale_bookings(
    conn: &Connection,
    status: &str,
    cutoff: &NaiveDateTime,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE status = ?1 AND order_id IS NULL AND created_at < ?2
         ORDER BY created_at ASC"
    ))?;

    let rows = stmt.query_map(params![status, cutoff.format(TIMESTAMP).to_string()], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let check_in_str: String = row.get(3)?;
    let check_out_str: String = row.get(4)?;
    let check_in_time: Option<String> = row.get(5)?;
    let check_out_time: Option<String> = row.get(6)?;
    let attributes_json: String = row.get(10)?;
    let created_at_str: String = row.get(14)?;
    let updated_at_str: String = row.get(15)?;

    Ok(Booking {
        id: row.get(0)?,
        resource_id: row.get(1)?,
        unit_id: row.get(2)?,
        check_in: parse_date(&check_in_str)?,
        check_out: parse_date(&check_out_str)?,
        check_in_time: check_in_time.as_deref().map(parse_time).transpose()?,
        check_out_time: check_out_time.as_deref().map(parse_time).transpose()?,
        status: row.get(7)?,
        order_id: row.get(8)?,
        guests: row.get(9)?,
        attributes: serde_json::from_str(&attributes_json)
            .with_context(|| format!("invalid stored attributes: {attributes_json}"))?,
        customer_name: row.get(11)?,
        customer_email: row.get(12)?,
        customer_phone: row.get(13)?,
        created_at: parse_timestamp(&created_at_str)?,
        updated_at: parse_timestamp(&updated_at_str)?,
    })
}

fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE).with_context(|| format!("invalid stored date: {s}"))
}

fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(s, TIME)
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .with_context(|| format!("invalid stored time: {s}"))
}

fn parse_timestamp(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP).with_context(|| format!("invalid stored timestamp: {s}"))
}

fn parse_decimal(s: &str) -> anyhow::Result<Decimal> {
    Decimal::from_str(s).with_context(|| format!("invalid stored amount: {s}"))
}

// ── Resources ──

pub fn save_resource(conn: &Connection, config: &ResourceConfig) -> anyhow::Result<()> {
    let json = serde_json::to_string(config)?;
    conn.execute(
        "INSERT INTO resources (id, title, config) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET
           title = excluded.title,
           config = excluded.config,
           updated_at = datetime('now')",
        params![config.resource_id, config.title, json],
    )?;
    Ok(())
}

pub fn get_resource(conn: &Connection, id: i64) -> anyhow::Result<Option<ResourceConfig>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT config FROM resources WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;

    json.map(|j| {
        ResourceConfig::from_json(&j).with_context(|| format!("malformed config for resource {id}"))
    })
    .transpose()
}

pub fn list_resources(conn: &Connection) -> anyhow::Result<Vec<ResourceConfig>> {
    let mut stmt = conn.prepare("SELECT id, config FROM resources ORDER BY id ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut resources = vec![];
    for row in rows {
        let (id, json) = row?;
        match ResourceConfig::from_json(&json) {
            Ok(config) => resources.push(config),
            Err(e) => tracing::warn!(resource_id = id, error = %e, "skipping malformed resource config"),
        }
    }
    Ok(resources)
}

// ── Orders ──

pub fn insert_order(conn: &Connection, status: &str, customer: &CustomerInfo) -> anyhow::Result<i64> {
    let now = now_str();
    conn.execute(
        "INSERT INTO orders (status, customer_name, customer_email, customer_phone, total, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, '0', ?5, ?5)",
        params![status, customer.name, customer.email, customer.phone, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_order(conn: &Connection, id: i64) -> anyhow::Result<Option<Order>> {
    let result = conn
        .query_row(
            "SELECT id, status, customer_name, customer_email, customer_phone, total, trashed, created_at
             FROM orders WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    CustomerInfo {
                        name: row.get(2)?,
                        email: row.get(3)?,
                        phone: row.get(4)?,
                    },
                    row.get::<_, String>(5)?,
                    row.get::<_, i32>(6)? != 0,
                    row.get::<_, String>(7)?,
                ))
            },
        )
        .optional()?;

    let Some((id, status, customer, total, trashed, created_at)) = result else {
        return Ok(None);
    };

    Ok(Some(Order {
        id,
        status,
        customer,
        total: parse_decimal(&total)?,
        trashed,
        items: get_order_items(conn, id)?,
        created_at: parse_timestamp(&created_at)?,
    }))
}

pub fn get_order_items(conn: &Connection, order_id: i64) -> anyhow::Result<Vec<LineItem>> {
    let mut stmt = conn.prepare(
        "SELECT id, order_id, name, quantity, refunded_quantity, total, meta
         FROM order_items WHERE order_id = ?1 ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![order_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, u32>(3)?,
            row.get::<_, u32>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, Option<String>>(6)?,
        ))
    })?;

    let mut items = vec![];
    for row in rows {
        let (id, order_id, name, quantity, refunded_quantity, total, meta) = row?;
        let meta = match meta {
            Some(json) => Some(
                serde_json::from_str::<LineItemMeta>(&json)
                    .with_context(|| format!("malformed meta on line item {id}"))?,
            ),
            None => None,
        };
        items.push(LineItem {
            id,
            order_id,
            name,
            quantity,
            refunded_quantity,
            total: parse_decimal(&total)?,
            meta,
        });
    }
    Ok(items)
}

pub fn insert_order_item(conn: &Connection, order_id: i64, item: &NewLineItem) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO order_items (order_id, name, quantity, total) VALUES (?1, ?2, ?3, ?4)",
        params![order_id, item.name, item.quantity, item.total.to_string()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_order_item_meta(
    conn: &Connection,
    order_id: i64,
    item_id: i64,
    meta: &LineItemMeta,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE order_items SET meta = ?1 WHERE id = ?2 AND order_id = ?3",
        params![serde_json::to_string(meta)?, item_id, order_id],
    )?;
    Ok(count > 0)
}

pub fn update_order_item_total(
    conn: &Connection,
    order_id: i64,
    item_id: i64,
    total: Decimal,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE order_items SET total = ?1 WHERE id = ?2 AND order_id = ?3",
        params![total.to_string(), item_id, order_id],
    )?;
    Ok(count > 0)
}

pub fn delete_order_item(conn: &Connection, order_id: i64, item_id: i64) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM order_items WHERE id = ?1 AND order_id = ?2",
        params![item_id, order_id],
    )?;
    Ok(count > 0)
}

pub fn set_item_refunded_quantity(
    conn: &Connection,
    item_id: i64,
    refunded_quantity: u32,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE order_items SET refunded_quantity = ?1 WHERE id = ?2",
        params![refunded_quantity, item_id],
    )?;
    Ok(count > 0)
}

pub fn insert_refund(
    conn: &Connection,
    order_id: i64,
    item_id: i64,
    amount: Decimal,
    reason: &str,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO order_refunds (order_id, item_id, amount, reason) VALUES (?1, ?2, ?3, ?4)",
        params![order_id, item_id, amount.to_string(), reason],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_refunds(conn: &Connection, order_id: i64) -> anyhow::Result<Vec<Refund>> {
    let mut stmt = conn.prepare(
        "SELECT id, order_id, item_id, amount, reason FROM order_refunds
         WHERE order_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![order_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut refunds = vec![];
    for row in rows {
        let (id, order_id, item_id, amount, reason) = row?;
        refunds.push(Refund {
            id,
            order_id,
            item_id,
            amount: parse_decimal(&amount)?,
            reason,
        });
    }
    Ok(refunds)
}

pub fn update_order_status(conn: &Connection, id: i64, status: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status, now_str(), id],
    )?;
    Ok(count > 0)
}

pub fn update_order_total(conn: &Connection, id: i64, total: Decimal) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE orders SET total = ?1, updated_at = ?2 WHERE id = ?3",
        params![total.to_string(), now_str(), id],
    )?;
    Ok(count > 0)
}

pub fn set_order_trashed(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE orders SET trashed = 1, updated_at = ?1 WHERE id = ?2",
        params![now_str(), id],
    )?;
    Ok(count > 0)
}

pub fn delete_order(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM orders WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

pub fn insert_order_note(conn: &Connection, order_id: i64, note: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO order_notes (order_id, note) VALUES (?1, ?2)",
        params![order_id, note],
    )?;
    Ok(())
}

pub fn get_order_notes(conn: &Connection, order_id: i64) -> anyhow::Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT note FROM order_notes WHERE order_id = ?1 ORDER BY id ASC")?;
    let rows = stmt.query_map(params![order_id], |row| row.get::<_, String>(0))?;

    let mut notes = vec![];
    for row in rows {
        notes.push(row?);
    }
    Ok(notes)
}
