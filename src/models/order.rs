use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::booking::{Attributes, Booking, CustomerInfo};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: i64,
    pub status: String,
    pub customer: CustomerInfo,
    pub total: Decimal,
    pub trashed: bool,
    pub items: Vec<LineItem>,
    pub created_at: NaiveDateTime,
}

impl Order {
    pub fn item_for_booking(&self, booking_id: &str) -> Option<&LineItem> {
        self.items
            .iter()
            .find(|item| item.booking_id() == Some(booking_id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    pub id: i64,
    pub order_id: i64,
    pub name: String,
    pub quantity: u32,
    pub refunded_quantity: u32,
    pub total: Decimal,
    pub meta: Option<LineItemMeta>,
}

impl LineItem {
    pub fn booking_id(&self) -> Option<&str> {
        self.meta.as_ref().map(|m| m.booking_id.as_str())
    }

    pub fn unrefunded_quantity(&self) -> u32 {
        self.quantity.saturating_sub(self.refunded_quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLineItem {
    pub name: String,
    pub quantity: u32,
    pub total: Decimal,
}

/// Booking fields mirrored onto the order line item so the order side can
/// show booking state without a live lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItemMeta {
    pub booking_id: String,
    pub resource_id: i64,
    pub status: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub refund_issued: bool,
    pub updated_at: NaiveDateTime,
}

impl LineItemMeta {
    pub fn from_booking(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id.clone(),
            resource_id: booking.resource_id,
            status: booking.status.clone(),
            check_in: booking.check_in,
            check_out: booking.check_out,
            guests: booking.guests,
            attributes: booking.attributes.clone(),
            refund_issued: false,
            updated_at: booking.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Refund {
    pub id: i64,
    pub order_id: i64,
    pub item_id: i64,
    pub amount: Decimal,
    pub reason: String,
}
