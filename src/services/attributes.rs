use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{AttributeRate, Attributes, RateMode, ResourceConfig};

/// One priced attribute option as shown next to a quote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttributeLine {
    pub key: String,
    pub label: String,
    pub value: Decimal,
}

/// Prices the optional extras selected on a booking.
pub trait AttributePricing: Send + Sync {
    /// `None` when the cost does not fit in a decimal.
    fn cost(&self, config: &ResourceConfig, selected: &Attributes, day_count: u32, guests: u32) -> Option<Decimal>;

    fn display_list(&self, config: &ResourceConfig, selected: &Attributes, day_count: u32) -> Vec<AttributeLine>;
}

/// Reads prices from the resource's `attribute_rates` table.
/// Options without a rate cost nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct TableAttributePricing;

impl TableAttributePricing {
    fn selected_rates<'a>(
        config: &'a ResourceConfig,
        selected: &'a Attributes,
    ) -> impl Iterator<Item = &'a AttributeRate> + 'a {
        selected.iter().flat_map(move |(attribute, options)| {
            options.iter().filter_map(move |option| {
                config
                    .attribute_rates
                    .iter()
                    .rev()
                    .find(|r| &r.attribute == attribute && &r.option == option)
            })
        })
    }
}

fn line_cost(rate: &AttributeRate, day_count: u32, guests: u32) -> Option<Decimal> {
    let days = Decimal::from(day_count);
    let guests = Decimal::from(guests.max(1));
    match rate.mode {
        RateMode::PerStay => Some(rate.price),
        RateMode::PerDay => rate.price.checked_mul(days),
        RateMode::PerGuest => rate.price.checked_mul(guests),
        RateMode::PerGuestPerDay => rate.price.checked_mul(guests)?.checked_mul(days),
    }
}

impl AttributePricing for TableAttributePricing {
    fn cost(&self, config: &ResourceConfig, selected: &Attributes, day_count: u32, guests: u32) -> Option<Decimal> {
        Self::selected_rates(config, selected)
            .try_fold(Decimal::ZERO, |acc, rate| acc.checked_add(line_cost(rate, day_count, guests)?))
    }

    /// Values are for a single guest. Lines whose value overflows are left out.
    fn display_list(&self, config: &ResourceConfig, selected: &Attributes, day_count: u32) -> Vec<AttributeLine> {
        Self::selected_rates(config, selected)
            .filter_map(|rate| {
                Some(AttributeLine {
                    key: format!("{}:{}", rate.attribute, rate.option),
                    label: if rate.label.is_empty() {
                        rate.option.clone()
                    } else {
                        rate.label.clone()
                    },
                    value: line_cost(rate, day_count, 1)?,
                })
            })
            .collect()
    }
}
