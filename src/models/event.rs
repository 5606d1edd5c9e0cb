use serde::{Deserialize, Serialize};

/// Trigger surface for workflow, calendar sync and UI subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BookingEvent {
    Created {
        booking_id: String,
        resource_id: i64,
        status: String,
    },
    Updated {
        booking_id: String,
        status: String,
    },
    BeforeDelete {
        booking_id: String,
        order_id: Option<i64>,
    },
    OrderPartiallyRefunded {
        order_id: i64,
        item_ids: Vec<i64>,
    },
}

impl BookingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BookingEvent::Created { .. } => "booking_created",
            BookingEvent::Updated { .. } => "booking_updated",
            BookingEvent::BeforeDelete { .. } => "booking_before_delete",
            BookingEvent::OrderPartiallyRefunded { .. } => "order_partially_refunded",
        }
    }
}
