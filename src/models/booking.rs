use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Attribute name → selected option keys.
pub type Attributes = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: String,
    pub resource_id: i64,
    pub unit_id: Option<i64>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub check_in_time: Option<NaiveTime>,
    pub check_out_time: Option<NaiveTime>,
    pub status: String,
    pub order_id: Option<i64>,
    pub guests: u32,
    #[serde(default)]
    pub attributes: Attributes,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    pub fn customer(&self) -> CustomerInfo {
        CustomerInfo {
            name: self.customer_name.clone(),
            email: self.customer_email.clone(),
            phone: self.customer_phone.clone(),
        }
    }

    /// Whether the booking's dates intersect `[from, to]`.
    pub fn touches(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.check_in <= to && self.check_out >= from
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CustomerInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A reservation request as submitted by an operator or a guest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub resource_id: i64,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub check_in_time: Option<NaiveTime>,
    pub check_out_time: Option<NaiveTime>,
    #[serde(default = "default_guests")]
    pub guests: u32,
    #[serde(default)]
    pub attributes: Attributes,
    pub status: Option<String>,
    #[serde(default)]
    pub customer: CustomerInfo,
    #[serde(default)]
    pub create_order: bool,
}

fn default_guests() -> u32 {
    1
}

/// Partial update of a booking. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingPatch {
    pub status: Option<String>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub guests: Option<u32>,
    pub attributes: Option<Attributes>,
}

impl BookingPatch {
    pub fn changes_dates(&self, booking: &Booking) -> bool {
        self.check_in.is_some_and(|d| d != booking.check_in)
            || self.check_out.is_some_and(|d| d != booking.check_out)
    }

    /// Dates, guest count and attributes all feed the price.
    pub fn changes_price(&self, booking: &Booking) -> bool {
        self.changes_dates(booking)
            || self.guests.is_some_and(|g| g != booking.guests)
            || self
                .attributes
                .as_ref()
                .is_some_and(|a| *a != booking.attributes)
    }
}

/// Lookup filter for the booking store. Unset fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub resource_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub status: Option<String>,
    pub order_id: Option<i64>,
    pub limit: Option<i64>,
}
