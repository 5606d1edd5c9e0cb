pub mod sqlite;

use std::sync::Weak;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{CustomerInfo, LineItemMeta, NewLineItem, Order};

/// Change notifications raised by the order subsystem on its own writes.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderEvent {
    StatusChanged {
        order_id: i64,
        from: String,
        to: String,
    },
    Trashed {
        order_id: i64,
    },
    /// Raised before the order and its items are removed.
    Deleted {
        order_id: i64,
    },
    Refunded {
        order_id: i64,
        item_ids: Vec<i64>,
    },
}

pub trait OrderObserver: Send + Sync {
    fn on_order_event(&self, event: &OrderEvent) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefundLine {
    pub item_id: i64,
    pub quantity: u32,
    pub amount: Decimal,
}

/// The money side of a booking. Observers are notified synchronously, on
/// the calling thread, after each write that changes order state.
pub trait OrderSubsystem: Send + Sync {
    fn create_order(&self, customer: &CustomerInfo) -> anyhow::Result<i64>;

    fn get_order(&self, order_id: i64) -> anyhow::Result<Option<Order>>;

    fn add_line_item(&self, order_id: i64, item: &NewLineItem) -> anyhow::Result<i64>;

    fn set_line_item_meta(&self, order_id: i64, item_id: i64, meta: &LineItemMeta) -> anyhow::Result<()>;

    fn set_line_item_total(&self, order_id: i64, item_id: i64, total: Decimal) -> anyhow::Result<()>;

    fn remove_line_item(&self, order_id: i64, item_id: i64) -> anyhow::Result<()>;

    /// Refunds the given lines and returns the refund ids.
    fn refund(&self, order_id: i64, lines: &[RefundLine], reason: &str) -> anyhow::Result<Vec<i64>>;

    fn set_status(&self, order_id: i64, status: &str) -> anyhow::Result<()>;

    /// Recomputes and stores the order total from its line items.
    fn recalculate(&self, order_id: i64) -> anyhow::Result<Decimal>;

    fn add_note(&self, order_id: i64, note: &str) -> anyhow::Result<()>;

    fn notes(&self, order_id: i64) -> anyhow::Result<Vec<String>>;

    fn trash(&self, order_id: i64) -> anyhow::Result<()>;

    fn delete(&self, order_id: i64) -> anyhow::Result<()>;

    fn subscribe(&self, observer: Weak<dyn OrderObserver>);
}
