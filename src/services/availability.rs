use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::resource::days_in;
use crate::models::{Booking, ResourceConfig, StatusTaxonomy};

/// Per-date occupancy of one resource, kept as a difference map so a whole
/// window can be swept once instead of rescanning bookings per day.
#[derive(Debug, Default)]
pub struct OccupancyIndex {
    deltas: BTreeMap<NaiveDate, i32>,
}

impl OccupancyIndex {
    pub fn from_bookings<'a, I>(bookings: I, per_night: bool) -> Self
    where
        I: IntoIterator<Item = &'a Booking>,
    {
        let mut deltas: BTreeMap<NaiveDate, i32> = BTreeMap::new();
        for booking in bookings {
            let Some((start, end)) = occupied_span(booking, per_night) else {
                continue;
            };
            *deltas.entry(start).or_default() += 1;
            *deltas.entry(end).or_default() -= 1;
        }
        Self { deltas }
    }

    /// Number of bookings covering `date`.
    pub fn capacity_used(&self, date: NaiveDate) -> u32 {
        let used: i32 = self.deltas.range(..=date).map(|(_, d)| d).sum();
        used.max(0) as u32
    }

    /// Dates in `[from, to]` whose occupancy has reached `capacity`.
    pub fn booked_dates(&self, capacity: u32, from: NaiveDate, to: NaiveDate) -> BTreeSet<NaiveDate> {
        let mut booked = BTreeSet::new();
        if to < from {
            return booked;
        }
        let capacity = capacity.max(1) as i32;
        let mut running: i32 = self.deltas.range(..from).map(|(_, d)| d).sum();
        let mut changes = self.deltas.range(from..=to).peekable();
        for day in days_in(from, to) {
            while let Some((_, delta)) = changes.next_if(|(d, _)| **d <= day) {
                running += delta;
            }
            if running >= capacity {
                booked.insert(day);
            }
        }
        booked
    }

    pub fn fully_booked(&self, units: u32, from: NaiveDate, to: NaiveDate) -> bool {
        !self.booked_dates(units, from, to).is_empty()
    }
}

/// Half-open `[start, end)` span of days a booking occupies.
fn occupied_span(booking: &Booking, per_night: bool) -> Option<(NaiveDate, NaiveDate)> {
    let end = if per_night {
        booking.check_out
    } else {
        booking.check_out.checked_add_days(Days::new(1))?
    };
    (booking.check_in < end).then_some((booking.check_in, end))
}

/// Bookings of this resource whose status still holds dates.
pub fn occupying<'a>(
    config: &ResourceConfig,
    bookings: &'a [Booking],
    taxonomy: &StatusTaxonomy,
) -> Vec<&'a Booking> {
    bookings
        .iter()
        .filter(|b| b.resource_id == config.resource_id && !taxonomy.is_invalid(&b.status))
        .collect()
}

fn prev_day(day: NaiveDate) -> NaiveDate {
    day.pred_opt().unwrap_or(day)
}

fn next_day(day: NaiveDate) -> NaiveDate {
    day.succ_opt().unwrap_or(day)
}

fn starts_block(booked: &BTreeSet<NaiveDate>, day: NaiveDate) -> bool {
    booked.contains(&day) && !booked.contains(&prev_day(day))
}

/// Dates in `[from, to]` that cannot be occupied by a new stay: disabled
/// weekdays, dates at capacity, and days off.
///
/// With checkout-only enabled, `to` is released when it is the first day of
/// a booked block, so a stay may end on the day the next one begins. Block
/// starts inside the range stay invalid: they cannot be occupied by a stay
/// crossing them. Display windows read those days from
/// [`AvailabilitySnapshot::checkout_only`] instead.
/// `to <= from` yields an empty set.
pub fn invalid_dates_in_range(
    config: &ResourceConfig,
    bookings: &[Booking],
    taxonomy: &StatusTaxonomy,
    from: NaiveDate,
    to: NaiveDate,
) -> BTreeSet<NaiveDate> {
    if to <= from {
        return BTreeSet::new();
    }
    let index = OccupancyIndex::from_bookings(occupying(config, bookings, taxonomy), config.per_night);
    let booked = index.booked_dates(config.capacity(), prev_day(from), next_day(to));

    let mut invalid: BTreeSet<NaiveDate> = days_in(from, to)
        .filter(|d| config.is_disabled(*d) || booked.contains(d) || config.is_day_off(*d))
        .collect();

    if config.checkout_only
        && starts_block(&booked, to)
        && !config.is_disabled(to)
        && !config.is_day_off(to)
    {
        invalid.remove(&to);
    }
    invalid
}

/// For checkout-only resources, the day after each isolated booked date.
pub fn next_booked_dates(booked: &BTreeSet<NaiveDate>, config: &ResourceConfig) -> BTreeSet<NaiveDate> {
    if !config.checkout_only {
        return BTreeSet::new();
    }
    booked
        .iter()
        .filter(|d| !booked.contains(&prev_day(**d)) && !booked.contains(&next_day(**d)))
        .map(|d| next_day(*d))
        .collect()
}

/// Lowest unit number free on every one of `days`. Single-unit resources
/// do not track units.
pub fn assign_unit(config: &ResourceConfig, occupying: &[&Booking], days: &[NaiveDate]) -> Option<i64> {
    if config.units <= 1 {
        return None;
    }
    let (Some(first), Some(last)) = (days.first(), days.last()) else {
        return None;
    };
    let wanted_end = next_day(*last);
    (1..=config.units as i64).find(|unit| {
        !occupying.iter().any(|b| {
            b.unit_id == Some(*unit)
                && occupied_span(b, config.per_night)
                    .is_some_and(|(start, end)| start < wanted_end && *first < end)
        })
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayClass {
    None,
    CheckoutOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DayVerdict {
    pub valid: bool,
    pub class: DayClass,
    pub reason: String,
}

impl DayVerdict {
    fn ok(class: DayClass) -> Self {
        Self {
            valid: true,
            class,
            reason: String::new(),
        }
    }

    fn reject(class: DayClass, reason: &str) -> Self {
        Self {
            valid: false,
            class,
            reason: reason.to_string(),
        }
    }
}

/// Where the caller is in picking a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Empty,
    CheckIn(NaiveDate),
}

#[derive(Debug, Clone, Copy)]
pub struct DayContext {
    pub today: NaiveDate,
    pub selection: Selection,
}

/// Availability of one resource over a window, precomputed for interactive
/// date picking.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct AvailabilitySnapshot {
    pub invalid: BTreeSet<NaiveDate>,
    pub checkout_only: BTreeSet<NaiveDate>,
    pub next_excluded: BTreeSet<NaiveDate>,
}

impl AvailabilitySnapshot {
    pub fn build(
        config: &ResourceConfig,
        bookings: &[Booking],
        taxonomy: &StatusTaxonomy,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Self {
        if to <= from {
            return Self::default();
        }
        let index = OccupancyIndex::from_bookings(occupying(config, bookings, taxonomy), config.per_night);
        let booked = index.booked_dates(config.capacity(), prev_day(from), next_day(to));

        let invalid = days_in(from, to)
            .filter(|d| config.is_disabled(*d) || booked.contains(d) || config.is_day_off(*d))
            .collect();

        if !config.checkout_only {
            return Self {
                invalid,
                ..Self::default()
            };
        }

        let checkout_only = days_in(from, to)
            .filter(|d| starts_block(&booked, *d) && !config.is_disabled(*d) && !config.is_day_off(*d))
            .collect();

        let mut next_excluded = next_booked_dates(&booked, config);
        next_excluded.extend(
            days_in(from, to)
                .filter(|d| config.is_disabled(*d))
                .map(next_day),
        );

        Self {
            invalid,
            checkout_only,
            next_excluded,
        }
    }

    /// Verdict for `day` while a range is being picked. The snapshot must
    /// cover `day` and, mid-selection, the chosen check-in.
    pub fn is_day_valid(&self, config: &ResourceConfig, day: NaiveDate, ctx: &DayContext) -> DayVerdict {
        let offset = config.rules_for(day).start_day_offset as u64;
        let earliest = ctx
            .today
            .checked_add_days(Days::new(offset))
            .unwrap_or(ctx.today);
        if day < earliest {
            return DayVerdict::reject(DayClass::None, "too early");
        }

        if config.is_disabled(day) {
            return DayVerdict::reject(DayClass::None, "unavailable weekday");
        }

        let check_in = match ctx.selection {
            Selection::Empty => None,
            Selection::CheckIn(d) => Some(d),
        };

        if check_in.is_none()
            && !config.check_in_weekdays.is_empty()
            && !config.check_in_weekdays.contains(day.weekday())
        {
            return DayVerdict::reject(DayClass::None, "check-in not allowed on this weekday");
        }

        if check_in.is_some()
            && !config.check_out_weekdays.is_empty()
            && !config.check_out_weekdays.contains(day.weekday())
        {
            return DayVerdict::reject(DayClass::None, "check-out not allowed on this weekday");
        }

        let mut class = DayClass::None;
        if self.invalid.contains(&day) {
            if !self.checkout_only.contains(&day) {
                return DayVerdict::reject(DayClass::None, "sold out");
            }
            class = DayClass::CheckoutOnly;
            if check_in.is_none() {
                return DayVerdict::reject(class, "checkout only");
            }
        }

        let Some(check_in) = check_in else {
            return DayVerdict::ok(class);
        };

        if self.next_excluded.contains(&day) {
            return DayVerdict::reject(class, "sold out");
        }
        if day <= check_in {
            return DayVerdict::reject(class, "before check-in");
        }
        if self.invalid.range(next_day(check_in)..day).next().is_some() {
            return DayVerdict::reject(class, "sold out");
        }
        DayVerdict::ok(class)
    }
}
