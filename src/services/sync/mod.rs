pub mod guard;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use tokio::sync::broadcast;

use crate::db::{self, queries, Db};
use crate::models::{Booking, BookingEvent, CustomerInfo, LineItem, LineItemMeta, NewLineItem, Order, StatusTaxonomy};
use crate::services::attributes::AttributePricing;
use crate::services::commerce::{OrderEvent, OrderObserver, OrderSubsystem, RefundLine};
use crate::services::pricing::{self, TaxConvention};

use self::guard::{is_suppressed, suppress, Listener};

/// Keeps bookings and their commerce orders consistent in both directions.
///
/// Forward writes (booking → order) run with [`Listener::OrderEvents`]
/// suppressed and reverse writes (order → booking) with
/// [`Listener::BookingEvents`] suppressed, so neither side echoes back.
pub struct Synchronizer {
    db: Db,
    orders: Arc<dyn OrderSubsystem>,
    taxonomy: Arc<StatusTaxonomy>,
    attributes: Arc<dyn AttributePricing>,
    tax: TaxConvention,
    events: broadcast::Sender<BookingEvent>,
    recompute: Mutex<HashSet<String>>,
}

/// A booking together with its order and line item.
struct Linked {
    booking: Booking,
    order: Order,
    item: LineItem,
}

impl Synchronizer {
    pub fn new(
        db: Db,
        orders: Arc<dyn OrderSubsystem>,
        taxonomy: Arc<StatusTaxonomy>,
        attributes: Arc<dyn AttributePricing>,
        tax: TaxConvention,
        events: broadcast::Sender<BookingEvent>,
    ) -> Self {
        Self {
            db,
            orders,
            taxonomy,
            attributes,
            tax,
            events,
            recompute: Mutex::new(HashSet::new()),
        }
    }

    fn emit(&self, event: BookingEvent) {
        tracing::debug!(event = event.name(), "booking event");
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn load_booking(&self, booking_id: &str) -> anyhow::Result<Option<Booking>> {
        let conn = db::lock(&self.db);
        queries::get_booking_by_id(&conn, booking_id)
    }

    /// Resolves booking → order → line item. Any missing link is a no-op.
    fn linked(&self, booking_id: &str) -> anyhow::Result<Option<Linked>> {
        let Some(booking) = self.load_booking(booking_id)? else {
            tracing::debug!(booking_id, "no booking, nothing to sync");
            return Ok(None);
        };
        let Some(order_id) = booking.order_id else {
            tracing::debug!(booking_id, "booking has no order, nothing to sync");
            return Ok(None);
        };
        let Some(order) = self.orders.get_order(order_id)? else {
            tracing::debug!(booking_id, order_id, "linked order is gone, nothing to sync");
            return Ok(None);
        };
        let Some(item) = order.item_for_booking(booking_id).cloned() else {
            tracing::debug!(booking_id, order_id, "order has no line item for booking");
            return Ok(None);
        };
        Ok(Some(Linked { booking, order, item }))
    }

    /// Flags a booking whose price inputs changed so the next
    /// [`Synchronizer::on_booking_updated`] reprices its line item.
    pub fn mark_for_recompute(&self, booking_id: &str) {
        self.recompute
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(booking_id.to_string());
    }

    fn take_recompute(&self, booking_id: &str) -> bool {
        self.recompute
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(booking_id)
    }

    fn line_total(&self, booking: &Booking) -> anyhow::Result<rust_decimal::Decimal> {
        let config = {
            let conn = db::lock(&self.db);
            queries::get_resource(&conn, booking.resource_id)?
        }
        .with_context(|| format!("resource {} is not configured", booking.resource_id))?;

        let quote = pricing::price(
            &config,
            booking.check_in,
            booking.check_out,
            booking.guests,
            &booking.attributes,
            self.attributes.as_ref(),
        )
        .with_context(|| format!("pricing booking {}", booking.id))?;
        Ok(self.tax.net_amount(quote.total))
    }

    fn line_name(&self, booking: &Booking) -> String {
        let title = {
            let conn = db::lock(&self.db);
            queries::get_resource(&conn, booking.resource_id)
                .ok()
                .flatten()
                .map(|c| c.title)
                .filter(|t| !t.is_empty())
        };
        let title = title.unwrap_or_else(|| format!("Resource #{}", booking.resource_id));
        format!("{title} ({} to {})", booking.check_in, booking.check_out)
    }

    /// Opens an order for a booking and links the two. Returns the existing
    /// order when the booking is already linked to one.
    pub fn create_order_for_booking(&self, booking: &Booking, customer: &CustomerInfo) -> anyhow::Result<i64> {
        if let Some(order_id) = booking.order_id {
            if self.orders.get_order(order_id)?.is_some() {
                return Ok(order_id);
            }
        }

        let total = self.line_total(booking)?;
        let _quiet = suppress(Listener::OrderEvents);

        let order_id = self.orders.create_order(customer)?;
        let item_id = self.orders.add_line_item(
            order_id,
            &NewLineItem {
                name: self.line_name(booking),
                quantity: 1,
                total,
            },
        )?;
        self.orders
            .set_line_item_meta(order_id, item_id, &LineItemMeta::from_booking(booking))?;
        if let Some(status) = self.taxonomy.order_status_for(&booking.status) {
            self.orders.set_status(order_id, status)?;
        }
        self.orders.recalculate(order_id)?;
        self.orders
            .add_note(order_id, &format!("Order created for booking {}", booking.id))?;

        {
            let conn = db::lock(&self.db);
            queries::set_booking_order(&conn, &booking.id, order_id)?;
        }

        tracing::info!(booking_id = %booking.id, order_id, %total, "order created for booking");
        Ok(order_id)
    }

    /// Pushes a booking's current state onto its order: refund, effective
    /// order status, mirrored line item fields, then repricing.
    pub fn on_booking_updated(&self, booking_id: &str) -> anyhow::Result<()> {
        if is_suppressed(Listener::BookingEvents) {
            tracing::debug!(booking_id, "booking update echo suppressed");
            return Ok(());
        }
        let Some(Linked { booking, order, item }) = self.linked(booking_id)? else {
            return Ok(());
        };
        let order_id = order.id;
        let mut meta = item
            .meta
            .clone()
            .unwrap_or_else(|| LineItemMeta::from_booking(&booking));
        let mut notes: Vec<String> = vec![];
        let mut meta_dirty = false;

        if booking.status == self.taxonomy.refunded() && item.unrefunded_quantity() > 0 && !meta.refund_issued {
            let line = RefundLine {
                item_id: item.id,
                quantity: item.unrefunded_quantity(),
                amount: item.total,
            };
            let reason = format!("Booking {} refunded", booking.id);
            let refunded = {
                let _quiet = suppress(Listener::OrderEvents);
                self.orders.refund(order_id, &[line], &reason)
            };
            if let Err(e) = refunded {
                tracing::error!(booking_id, order_id, error = %e, "refund failed");
                if let Err(note_err) = self.orders.add_note(order_id, &format!("Refund for booking {} failed: {e}", booking.id)) {
                    tracing::warn!(order_id, error = %note_err, "could not record refund failure note");
                }
                return Err(e.context(format!("refunding booking {}", booking.id)));
            }
            meta.refund_issued = true;
            meta_dirty = true;
            notes.push(format!("Refunded {} for booking {}", item.total, booking.id));
            tracing::info!(booking_id, order_id, amount = %item.total, "line item refunded");
        }

        let others = order
            .items
            .iter()
            .filter(|i| i.id != item.id)
            .filter_map(|i| i.meta.as_ref())
            .map(|m| (m.status.as_str(), m.updated_at));
        let candidates = std::iter::once((booking.status.as_str(), booking.updated_at)).chain(others);
        let target = self
            .taxonomy
            .most_advanced(candidates)
            .and_then(|s| self.taxonomy.order_status_for(s));
        if let Some(target) = target {
            if target != order.status {
                {
                    let _quiet = suppress(Listener::OrderEvents);
                    self.orders.set_status(order_id, target)?;
                }
                notes.push(format!("Order status {} → {}", order.status, target));
                tracing::info!(booking_id, order_id, from = %order.status, to = target, "order status propagated");
            }
        }

        if meta.status != booking.status {
            notes.push(format!("Booking status {} → {}", meta.status, booking.status));
            meta.status = booking.status.clone();
        }
        if meta.check_in != booking.check_in {
            notes.push(format!("Check-in {} → {}", meta.check_in, booking.check_in));
            meta.check_in = booking.check_in;
        }
        if meta.check_out != booking.check_out {
            notes.push(format!("Check-out {} → {}", meta.check_out, booking.check_out));
            meta.check_out = booking.check_out;
        }
        if meta.guests != booking.guests {
            notes.push(format!("Guests {} → {}", meta.guests, booking.guests));
            meta.guests = booking.guests;
        }
        if meta.attributes != booking.attributes {
            notes.push("Booking attributes changed".to_string());
            meta.attributes = booking.attributes.clone();
        }
        if meta.updated_at != booking.updated_at {
            meta.updated_at = booking.updated_at;
            meta_dirty = true;
        }
        if meta_dirty || !notes.is_empty() {
            self.orders.set_line_item_meta(order_id, item.id, &meta)?;
        }

        if self.take_recompute(&booking.id) {
            let new_total = self.line_total(&booking)?;
            if new_total != item.total {
                self.orders.set_line_item_total(order_id, item.id, new_total)?;
            }
            self.orders.recalculate(order_id)?;
            let delta = new_total - item.total;
            let note = if delta > rust_decimal::Decimal::ZERO {
                format!("Price increased by {delta} (from {} to {new_total})", item.total)
            } else if delta < rust_decimal::Decimal::ZERO {
                format!("Price decreased by {} (from {} to {new_total})", -delta, item.total)
            } else {
                format!("Price unchanged at {new_total}")
            };
            tracing::info!(booking_id, order_id, old = %item.total, new = %new_total, "line item repriced");
            notes.push(note);
        }

        if !notes.is_empty() {
            self.orders.add_note(order_id, &notes.join("\n"))?;
        }
        Ok(())
    }

    pub fn on_booking_deleted(&self, booking_id: &str) -> anyhow::Result<()> {
        self.maybe_remove_line_item(booking_id)?;
        self.take_recompute(booking_id);
        Ok(())
    }

    /// Removes the booking's line item; an order left without items is
    /// deleted.
    pub fn maybe_remove_line_item(&self, booking_id: &str) -> anyhow::Result<()> {
        if is_suppressed(Listener::LineItemRemoval) {
            tracing::debug!(booking_id, "line item removal suppressed");
            return Ok(());
        }
        let _removing = suppress(Listener::LineItemRemoval);
        let Some(Linked { order, item, .. }) = self.linked(booking_id)? else {
            return Ok(());
        };

        self.orders.remove_line_item(order.id, item.id)?;
        self.orders.recalculate(order.id)?;

        if order.items.len() <= 1 {
            let _quiet = suppress(Listener::OrderEvents);
            self.orders.delete(order.id)?;
            tracing::info!(booking_id, order_id = order.id, "order deleted with its last line item");
        } else {
            self.orders
                .add_note(order.id, &format!("Removed line item for deleted booking {booking_id}"))?;
            tracing::info!(booking_id, order_id = order.id, "line item removed");
        }
        Ok(())
    }

    /// Trashing an order cancels its bookings; deleting it deletes them.
    pub fn on_order_trashed_or_deleted(&self, order_id: i64, deleted: bool) -> anyhow::Result<()> {
        let _quiet_bookings = suppress(Listener::BookingEvents);
        let _quiet_items = suppress(Listener::LineItemRemoval);

        let bookings = {
            let conn = db::lock(&self.db);
            queries::get_bookings_by_order(&conn, order_id)?
        };
        let order = if deleted { None } else { self.orders.get_order(order_id)? };

        for booking in bookings {
            if deleted {
                self.emit(BookingEvent::BeforeDelete {
                    booking_id: booking.id.clone(),
                    order_id: Some(order_id),
                });
                {
                    let conn = db::lock(&self.db);
                    queries::delete_booking(&conn, &booking.id)?;
                }
                self.take_recompute(&booking.id);
                tracing::info!(booking_id = %booking.id, order_id, "booking deleted with its order");
            } else if booking.status != self.taxonomy.cancelled() {
                let cancelled = self.taxonomy.cancelled().to_string();
                {
                    let conn = db::lock(&self.db);
                    queries::update_booking_status(&conn, &booking.id, &cancelled)?;
                }
                if let Some(item) = order.as_ref().and_then(|o| o.item_for_booking(&booking.id)) {
                    if let Some(mut meta) = item.meta.clone() {
                        meta.status = cancelled.clone();
                        self.orders.set_line_item_meta(order_id, item.id, &meta)?;
                    }
                }
                self.emit(BookingEvent::Updated {
                    booking_id: booking.id.clone(),
                    status: cancelled,
                });
                tracing::info!(booking_id = %booking.id, order_id, "booking cancelled with trashed order");
            }
        }
        Ok(())
    }

    /// Marks the bookings behind refunded line items as refunded, once.
    pub fn on_partial_refund(&self, order_id: i64, item_ids: &[i64]) -> anyhow::Result<()> {
        let Some(order) = self.orders.get_order(order_id)? else {
            tracing::debug!(order_id, "refunded order is gone");
            return Ok(());
        };
        let _quiet = suppress(Listener::BookingEvents);
        let refunded = self.taxonomy.refunded().to_string();

        for item in order
            .items
            .iter()
            .filter(|i| item_ids.contains(&i.id) && i.refunded_quantity > 0)
        {
            let Some(mut meta) = item.meta.clone() else {
                continue;
            };
            let Some(booking) = self.load_booking(&meta.booking_id)? else {
                tracing::debug!(order_id, item_id = item.id, "refunded item has no booking");
                continue;
            };
            if booking.status == refunded {
                continue;
            }
            {
                let conn = db::lock(&self.db);
                queries::update_booking_status(&conn, &booking.id, &refunded)?;
            }
            meta.status = refunded.clone();
            meta.refund_issued = true;
            self.orders.set_line_item_meta(order_id, item.id, &meta)?;
            self.emit(BookingEvent::Updated {
                booking_id: booking.id.clone(),
                status: refunded.clone(),
            });
            tracing::info!(booking_id = %booking.id, order_id, "booking refunded from order");
        }

        self.emit(BookingEvent::OrderPartiallyRefunded {
            order_id,
            item_ids: item_ids.to_vec(),
        });
        Ok(())
    }

    /// Applies an order-side status change to every linked booking.
    pub fn on_order_status_changed(&self, order_id: i64, order_status: &str) -> anyhow::Result<()> {
        let Some(status) = self.taxonomy.booking_status_for(order_status) else {
            tracing::debug!(order_id, order_status, "order status has no booking counterpart");
            return Ok(());
        };
        let _quiet = suppress(Listener::BookingEvents);

        let bookings = {
            let conn = db::lock(&self.db);
            queries::get_bookings_by_order(&conn, order_id)?
        };
        let order = self.orders.get_order(order_id)?;

        for booking in bookings.iter().filter(|b| b.status != status) {
            {
                let conn = db::lock(&self.db);
                queries::update_booking_status(&conn, &booking.id, status)?;
            }
            if let Some(item) = order.as_ref().and_then(|o| o.item_for_booking(&booking.id)) {
                if let Some(mut meta) = item.meta.clone() {
                    meta.status = status.to_string();
                    self.orders.set_line_item_meta(order_id, item.id, &meta)?;
                }
            }
            self.emit(BookingEvent::Updated {
                booking_id: booking.id.clone(),
                status: status.to_string(),
            });
            tracing::info!(booking_id = %booking.id, order_id, status, "booking status set from order");
        }
        Ok(())
    }
}

impl OrderObserver for Synchronizer {
    fn on_order_event(&self, event: &OrderEvent) -> anyhow::Result<()> {
        if is_suppressed(Listener::OrderEvents) {
            tracing::debug!(?event, "order event echo suppressed");
            return Ok(());
        }
        match event {
            OrderEvent::StatusChanged { order_id, to, .. } => self.on_order_status_changed(*order_id, to),
            OrderEvent::Trashed { order_id } => self.on_order_trashed_or_deleted(*order_id, false),
            OrderEvent::Deleted { order_id } => self.on_order_trashed_or_deleted(*order_id, true),
            OrderEvent::Refunded { order_id, item_ids } => self.on_partial_refund(*order_id, item_ids),
        }
    }
}
