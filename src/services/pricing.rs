use chrono::NaiveDate;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::{Attributes, ResourceConfig};
use crate::services::attributes::{AttributeLine, AttributePricing};

const DECIMAL_PLACES: u32 = 2;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PricingError {
    #[error("stay price exceeds the supported amount range")]
    Overflow,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DayPrice {
    pub date: NaiveDate,
    pub price: Decimal,
    /// Title of the season that priced this day, if any.
    pub season: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub total: Decimal,
    pub per_day: Vec<DayPrice>,
    pub day_count: u32,
    pub attributes_cost: Decimal,
    pub attribute_lines: Vec<AttributeLine>,
}

/// Prices a stay.
///
/// Each billable day is priced from the last enabled season covering it, or
/// the base rates: weekend override first, then the duration tier reached by
/// the whole stay, then the flat price. With the guests multiplier the day
/// sum is multiplied by the guest count; attribute costs are added last.
/// An empty or inverted range prices at zero. Totals beyond the decimal
/// range fail with [`PricingError::Overflow`].
pub fn price(
    config: &ResourceConfig,
    check_in: NaiveDate,
    check_out: NaiveDate,
    guests: u32,
    attributes: &Attributes,
    attribute_pricing: &dyn AttributePricing,
) -> Result<Quote, PricingError> {
    let days = config.billable_days(check_in, check_out);
    let day_count = days.len() as u32;

    let per_day: Vec<DayPrice> = days
        .into_iter()
        .map(|date| {
            let season = config.season_for(date);
            let rates = season.map(|s| &s.rates).unwrap_or(&config.rates);
            DayPrice {
                date,
                price: rates.day_price(date, day_count),
                season: season.map(|s| s.title.clone()),
            }
        })
        .collect();

    let mut total = per_day
        .iter()
        .try_fold(Decimal::ZERO, |acc, d| acc.checked_add(d.price))
        .ok_or(PricingError::Overflow)?;
    if config.guests_multiplier {
        total = total
            .checked_mul(Decimal::from(guests.max(1)))
            .ok_or(PricingError::Overflow)?;
    }

    let (attributes_cost, attribute_lines) = if attributes.is_empty() || day_count == 0 {
        (Decimal::ZERO, vec![])
    } else {
        let cost = attribute_pricing
            .cost(config, attributes, day_count, guests)
            .ok_or(PricingError::Overflow)?;
        (cost, attribute_pricing.display_list(config, attributes, day_count))
    };
    total = total.checked_add(attributes_cost).ok_or(PricingError::Overflow)?;

    Ok(Quote {
        total,
        per_day,
        day_count,
        attributes_cost,
        attribute_lines,
    })
}

/// How the order subsystem treats line totals with respect to tax.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TaxConvention {
    pub prices_include_tax: bool,
    pub rate_percent: Decimal,
}

impl TaxConvention {
    /// Tax-exclusive amount for a line item. Unchanged unless prices are
    /// entered tax-inclusive.
    pub fn net_amount(&self, gross: Decimal) -> Decimal {
        if !self.prices_include_tax || self.rate_percent <= Decimal::ZERO {
            return gross;
        }
        let divisor = Decimal::ONE + self.rate_percent / Decimal::ONE_HUNDRED;
        (gross / divisor).round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DurationTier, RateTable, SeasonRepeat, SeasonalPeriod, StayRules, WeekendPrice};
    use crate::services::attributes::TableAttributePricing;
    use crate::models::{AttributeRate, RateMode};
    use chrono::Weekday;
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn quote(config: &ResourceConfig, check_in: &str, check_out: &str, guests: u32) -> Quote {
        price(
            config,
            date(check_in),
            date(check_out),
            guests,
            &Attributes::new(),
            &TableAttributePricing,
        )
        .unwrap()
    }

    #[test]
    fn test_weekend_override_beats_tier() {
        let mut config = ResourceConfig::new(1, dec!(100));
        config.rates.weekend_prices = vec![WeekendPrice {
            weekday: Weekday::Sat,
            price: dec!(120),
        }];
        config.rates.tiers = vec![DurationTier {
            duration: 3,
            price: dec!(90),
        }];

        // Fri 2025-01-03 for four nights: Fri, Sat, Sun, Mon
        let q = quote(&config, "2025-01-03", "2025-01-07", 1);
        assert_eq!(q.day_count, 4);
        let prices: Vec<Decimal> = q.per_day.iter().map(|d| d.price).collect();
        assert_eq!(prices, vec![dec!(90), dec!(120), dec!(90), dec!(90)]);
        assert_eq!(q.total, dec!(390));
    }

    #[test]
    fn test_short_stay_below_tier_uses_base() {
        let mut config = ResourceConfig::new(1, dec!(100));
        config.rates.tiers = vec![DurationTier {
            duration: 3,
            price: dec!(90),
        }];
        assert_eq!(quote(&config, "2025-01-06", "2025-01-08", 1).total, dec!(200));
    }

    #[test]
    fn test_longest_reached_tier_wins() {
        let mut config = ResourceConfig::new(1, dec!(100));
        config.rates.tiers = vec![
            DurationTier {
                duration: 2,
                price: dec!(90),
            },
            DurationTier {
                duration: 5,
                price: dec!(80),
            },
        ];
        let q = quote(&config, "2025-01-06", "2025-01-12", 1);
        assert_eq!(q.day_count, 6);
        assert!(q.per_day.iter().all(|d| d.price == dec!(80)));
        assert_eq!(q.total, dec!(480));
    }

    #[test]
    fn test_season_weekend_price_beats_base_rates() {
        let mut config = ResourceConfig::new(1, dec!(100));
        config.rates.weekend_prices = vec![WeekendPrice {
            weekday: Weekday::Sat,
            price: dec!(110),
        }];
        config.seasons.push(SeasonalPeriod {
            title: "Winter".to_string(),
            start: date("2025-01-04"),
            end: date("2025-01-31"),
            enabled: true,
            repeat: SeasonRepeat::None,
            rates: RateTable {
                price: dec!(150),
                weekend_prices: vec![WeekendPrice {
                    weekday: Weekday::Sat,
                    price: dec!(200),
                }],
                tiers: vec![],
            },
            rules: StayRules::default(),
        });

        // Fri is before the season, Sat and Sun inside it
        let q = quote(&config, "2025-01-03", "2025-01-06", 1);
        let prices: Vec<Decimal> = q.per_day.iter().map(|d| d.price).collect();
        assert_eq!(prices, vec![dec!(100), dec!(200), dec!(150)]);
        assert_eq!(q.per_day[0].season, None);
        assert_eq!(q.per_day[1].season.as_deref(), Some("Winter"));
    }

    #[test]
    fn test_disabled_season_is_ignored() {
        let mut config = ResourceConfig::new(1, dec!(100));
        config.seasons.push(SeasonalPeriod {
            title: "Off".to_string(),
            start: date("2025-01-01"),
            end: date("2025-01-31"),
            enabled: false,
            repeat: SeasonRepeat::None,
            rates: RateTable {
                price: dec!(999),
                ..RateTable::default()
            },
            rules: StayRules::default(),
        });
        assert_eq!(quote(&config, "2025-01-06", "2025-01-08", 1).total, dec!(200));
    }

    #[test]
    fn test_overlapping_seasons_last_defined_wins() {
        let mut config = ResourceConfig::new(1, dec!(100));
        for (title, price) in [("Wide", dec!(130)), ("Narrow", dec!(170))] {
            config.seasons.push(SeasonalPeriod {
                title: title.to_string(),
                start: date("2025-01-01"),
                end: date("2025-01-31"),
                enabled: true,
                repeat: SeasonRepeat::None,
                rates: RateTable {
                    price,
                    ..RateTable::default()
                },
                rules: StayRules::default(),
            });
        }
        assert_eq!(quote(&config, "2025-01-06", "2025-01-07", 1).total, dec!(170));
    }

    #[test]
    fn test_guests_multiplier_then_attributes() {
        let mut config = ResourceConfig::new(1, dec!(100));
        config.guests_multiplier = true;
        config.attribute_rates = vec![AttributeRate {
            attribute: "extras".to_string(),
            option: "breakfast".to_string(),
            label: "Breakfast".to_string(),
            price: dec!(12),
            mode: RateMode::PerGuestPerDay,
        }];
        let attributes: Attributes = [("extras".to_string(), vec!["breakfast".to_string()])]
            .into_iter()
            .collect();

        let q = price(
            &config,
            date("2025-01-06"),
            date("2025-01-08"),
            3,
            &attributes,
            &TableAttributePricing,
        )
        .unwrap();
        // 2 nights * 100 * 3 guests + 12 * 3 * 2
        assert_eq!(q.attributes_cost, dec!(72));
        assert_eq!(q.total, dec!(672));
        assert_eq!(q.attribute_lines.len(), 1);
    }

    #[test]
    fn test_per_day_mode_bills_checkout_day() {
        let mut config = ResourceConfig::new(1, dec!(100));
        config.per_night = false;
        let q = quote(&config, "2025-01-06", "2025-01-08", 1);
        assert_eq!(q.day_count, 3);
        assert_eq!(q.total, dec!(300));
    }

    #[test]
    fn test_pricing_is_repeatable() {
        let mut config = ResourceConfig::new(1, dec!(99.99));
        config.rates.tiers = vec![DurationTier {
            duration: 2,
            price: dec!(89.50),
        }];
        let first = quote(&config, "2025-03-01", "2025-03-09", 2);
        let second = quote(&config, "2025-03-01", "2025-03-09", 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_inverted_range_prices_zero() {
        let config = ResourceConfig::new(1, dec!(100));
        let q = quote(&config, "2025-01-08", "2025-01-06", 1);
        assert_eq!(q.total, Decimal::ZERO);
        assert!(q.per_day.is_empty());
    }

    #[test]
    fn test_total_beyond_decimal_range_fails() {
        let config = ResourceConfig::new(1, Decimal::MAX);
        let result = price(
            &config,
            date("2025-01-06"),
            date("2025-01-08"),
            1,
            &Attributes::new(),
            &TableAttributePricing,
        );
        assert_eq!(result, Err(PricingError::Overflow));
    }

    #[test]
    fn test_guest_multiplier_overflow_fails() {
        let mut config = ResourceConfig::new(1, Decimal::MAX / dec!(2));
        config.guests_multiplier = true;
        let result = price(
            &config,
            date("2025-01-06"),
            date("2025-01-07"),
            3,
            &Attributes::new(),
            &TableAttributePricing,
        );
        assert_eq!(result, Err(PricingError::Overflow));
    }

    #[test]
    fn test_net_amount_strips_inclusive_tax() {
        let inclusive = TaxConvention {
            prices_include_tax: true,
            rate_percent: dec!(19),
        };
        assert_eq!(inclusive.net_amount(dec!(119)), dec!(100.00));

        let seven = TaxConvention {
            prices_include_tax: true,
            rate_percent: dec!(7),
        };
        assert_eq!(seven.net_amount(dec!(100)), dec!(93.46));

        let exclusive = TaxConvention {
            prices_include_tax: false,
            rate_percent: dec!(19),
        };
        assert_eq!(exclusive.net_amount(dec!(119)), dec!(119));
    }
}
