pub mod attributes;
pub mod availability;
pub mod bookings;
pub mod calendar;
pub mod cleanup;
pub mod commerce;
pub mod pricing;
pub mod scheduling;
pub mod sync;
