pub mod booking;
pub mod event;
pub mod order;
pub mod resource;
pub mod status;

pub use booking::{Attributes, Booking, BookingFilter, BookingPatch, BookingRequest, CustomerInfo};
pub use event::BookingEvent;
pub use order::{LineItem, LineItemMeta, NewLineItem, Order, Refund};
pub use resource::{
    AttributeRate, DayOff, DurationTier, RateMode, RateTable, ResourceConfig, SeasonRepeat,
    SeasonalPeriod, StayRules, WeekdaySet, WeekendPrice,
};
pub use status::{StatusClass, StatusEntry, StatusTaxonomy};
