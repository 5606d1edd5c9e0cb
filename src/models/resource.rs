use chrono::{Datelike, Days, NaiveDate, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Set of weekdays, serialized as an ordered list of names (`["Mon", "Sun"]`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Weekday>", into = "Vec<Weekday>")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub fn contains(self, weekday: Weekday) -> bool {
        self.0 & (1 << weekday.num_days_from_monday()) != 0
    }

    pub fn insert(&mut self, weekday: Weekday) {
        self.0 |= 1 << weekday.num_days_from_monday();
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        WEEK.into_iter().filter(move |w| self.contains(*w))
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = WeekdaySet::default();
        for weekday in iter {
            set.insert(weekday);
        }
        set
    }
}

impl From<Vec<Weekday>> for WeekdaySet {
    fn from(days: Vec<Weekday>) -> Self {
        days.into_iter().collect()
    }
}

impl From<WeekdaySet> for Vec<Weekday> {
    fn from(set: WeekdaySet) -> Self {
        set.iter().collect()
    }
}

/// Inclusive blackout range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DayOff {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DayOff {
    pub fn covers(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeekendPrice {
    pub weekday: Weekday,
    pub price: Decimal,
}

/// Per-day price that applies once a stay reaches `duration` days.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DurationTier {
    pub duration: u32,
    pub price: Decimal,
}

/// Price rules shared by the base configuration and each season.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RateTable {
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub weekend_prices: Vec<WeekendPrice>,
    #[serde(default)]
    pub tiers: Vec<DurationTier>,
}

impl RateTable {
    pub fn weekend_price(&self, weekday: Weekday) -> Option<Decimal> {
        self.weekend_prices
            .iter()
            .rev()
            .find(|w| w.weekday == weekday)
            .map(|w| w.price)
    }

    /// Last tier in configured order whose threshold the stay reaches.
    pub fn tier_price(&self, day_count: u32) -> Option<Decimal> {
        self.tiers
            .iter()
            .rev()
            .find(|t| t.duration <= day_count)
            .map(|t| t.price)
    }

    /// Weekend override, then duration tier, then the flat price.
    pub fn day_price(&self, day: NaiveDate, day_count: u32) -> Decimal {
        self.weekend_price(day.weekday())
            .or_else(|| self.tier_price(day_count))
            .unwrap_or(self.price)
    }
}

/// Stay-length constraints. Zero means unconstrained.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct StayRules {
    #[serde(default)]
    pub min_days: u32,
    #[serde(default)]
    pub max_days: u32,
    #[serde(default)]
    pub start_day_offset: u32,
}

impl StayRules {
    /// Non-zero values of `other` replace ours.
    fn overridden_by(self, other: StayRules) -> StayRules {
        StayRules {
            min_days: if other.min_days > 0 { other.min_days } else { self.min_days },
            max_days: if other.max_days > 0 { other.max_days } else { self.max_days },
            start_day_offset: if other.start_day_offset > 0 {
                other.start_day_offset
            } else {
                self.start_day_offset
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeasonRepeat {
    #[default]
    None,
    Yearly,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeasonalPeriod {
    #[serde(default)]
    pub title: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub repeat: SeasonRepeat,
    #[serde(flatten)]
    pub rates: RateTable,
    #[serde(flatten)]
    pub rules: StayRules,
}

impl SeasonalPeriod {
    pub fn covers(&self, day: NaiveDate) -> bool {
        match self.repeat {
            SeasonRepeat::None => self.start <= day && day <= self.end,
            SeasonRepeat::Yearly => {
                let md = (day.month(), day.day());
                let start = (self.start.month(), self.start.day());
                let end = (self.end.month(), self.end.day());
                if start <= end {
                    start <= md && md <= end
                } else {
                    // window wraps over new year
                    md >= start || md <= end
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RateMode {
    #[default]
    PerStay,
    PerDay,
    PerGuest,
    PerGuestPerDay,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttributeRate {
    pub attribute: String,
    pub option: String,
    #[serde(default)]
    pub label: String,
    pub price: Decimal,
    #[serde(default)]
    pub mode: RateMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceConfig {
    #[serde(default)]
    pub resource_id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub disabled_weekdays: WeekdaySet,
    #[serde(default)]
    pub check_in_weekdays: WeekdaySet,
    #[serde(default)]
    pub check_out_weekdays: WeekdaySet,
    #[serde(default)]
    pub checkout_only: bool,
    #[serde(default = "default_true")]
    pub per_night: bool,
    #[serde(default)]
    pub units: u32,
    #[serde(flatten)]
    pub rules: StayRules,
    #[serde(default)]
    pub days_off: Vec<DayOff>,
    #[serde(flatten)]
    pub rates: RateTable,
    #[serde(default)]
    pub seasons: Vec<SeasonalPeriod>,
    #[serde(default)]
    pub guests_multiplier: bool,
    #[serde(default)]
    pub attribute_rates: Vec<AttributeRate>,
}

fn default_true() -> bool {
    true
}

impl ResourceConfig {
    pub fn new(resource_id: i64, price: Decimal) -> Self {
        Self {
            resource_id,
            title: String::new(),
            disabled_weekdays: WeekdaySet::default(),
            check_in_weekdays: WeekdaySet::default(),
            check_out_weekdays: WeekdaySet::default(),
            checkout_only: false,
            per_night: true,
            units: 0,
            rules: StayRules::default(),
            days_off: vec![],
            rates: RateTable {
                price,
                ..RateTable::default()
            },
            seasons: vec![],
            guests_multiplier: false,
            attribute_rates: vec![],
        }
    }

    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let config: ResourceConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for off in &self.days_off {
            anyhow::ensure!(
                off.start <= off.end,
                "day off range ends before it starts: {} > {}",
                off.start,
                off.end
            );
        }
        for season in &self.seasons {
            anyhow::ensure!(
                season.repeat == SeasonRepeat::Yearly || season.start <= season.end,
                "season '{}' ends before it starts",
                season.title
            );
            check_rates(&season.rates)?;
        }
        check_rates(&self.rates)?;
        anyhow::ensure!(
            self.rules.max_days == 0 || self.rules.min_days <= self.rules.max_days,
            "min_days exceeds max_days"
        );
        Ok(())
    }

    /// Units that can be booked concurrently; 0 and 1 both mean a single unit.
    pub fn capacity(&self) -> u32 {
        self.units.max(1)
    }

    pub fn is_disabled(&self, day: NaiveDate) -> bool {
        self.disabled_weekdays.contains(day.weekday())
    }

    pub fn is_day_off(&self, day: NaiveDate) -> bool {
        self.days_off.iter().any(|off| off.covers(day))
    }

    /// Last enabled season covering the day, in configuration order.
    pub fn season_for(&self, day: NaiveDate) -> Option<&SeasonalPeriod> {
        self.seasons
            .iter()
            .rev()
            .find(|s| s.enabled && s.covers(day))
    }

    pub fn rates_for(&self, day: NaiveDate) -> &RateTable {
        self.season_for(day)
            .map(|s| &s.rates)
            .unwrap_or(&self.rates)
    }

    /// Stay rules in force for a stay starting on `check_in`.
    pub fn rules_for(&self, check_in: NaiveDate) -> StayRules {
        match self.season_for(check_in) {
            Some(season) => self.rules.overridden_by(season.rules),
            None => self.rules,
        }
    }

    /// Days that are occupied and billed: per-night mode excludes the
    /// check-out day, per-day mode includes it.
    pub fn billable_days(&self, check_in: NaiveDate, check_out: NaiveDate) -> Vec<NaiveDate> {
        if check_out <= check_in {
            return vec![];
        }
        let last = if self.per_night {
            check_out.pred_opt().unwrap_or(check_in)
        } else {
            check_out
        };
        days_in(check_in, last).collect()
    }
}

fn check_rates(rates: &RateTable) -> anyhow::Result<()> {
    anyhow::ensure!(rates.price >= Decimal::ZERO, "negative price");
    anyhow::ensure!(
        rates.tiers.iter().all(|t| t.price >= Decimal::ZERO),
        "negative tier price"
    );
    anyhow::ensure!(
        rates.weekend_prices.iter().all(|w| w.price >= Decimal::ZERO),
        "negative weekend price"
    );
    Ok(())
}

/// Every date in `[from, to]`.
pub fn days_in(from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    std::iter::successors(Some(from), |d| d.checked_add_days(Days::new(1)))
        .take_while(move |d| *d <= to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "resource_id": 7,
            "title": "Sea View",
            "disabled_weekdays": ["Sun"],
            "check_in_weekdays": ["Sat", "Mon"],
            "price": "100",
            "weekend_prices": [{"weekday": "Sat", "price": 120}],
            "tiers": [{"duration": 3, "price": "90"}],
            "min_days": 2,
            "days_off": [{"start": "2025-12-24", "end": "2025-12-26"}],
            "seasons": [{
                "title": "Summer", "start": "2025-06-01", "end": "2025-08-31",
                "price": "150", "min_days": 5
            }]
        }"#;
        let config = ResourceConfig::from_json(json).unwrap();
        assert_eq!(config.resource_id, 7);
        assert!(config.per_night);
        assert!(config.disabled_weekdays.contains(Weekday::Sun));
        assert!(!config.disabled_weekdays.contains(Weekday::Sat));
        assert_eq!(
            config.check_in_weekdays.iter().collect::<Vec<_>>(),
            vec![Weekday::Mon, Weekday::Sat]
        );
        assert_eq!(config.rates.price, dec!(100));
        assert_eq!(config.rates.weekend_price(Weekday::Sat), Some(dec!(120)));
        assert_eq!(config.rules.min_days, 2);
        assert!(config.seasons[0].enabled);
        assert_eq!(config.seasons[0].rates.price, dec!(150));
        assert_eq!(config.seasons[0].rules.min_days, 5);
    }

    #[test]
    fn test_reject_inverted_day_off() {
        let json = r#"{"resource_id": 1, "days_off": [{"start": "2025-02-10", "end": "2025-02-01"}]}"#;
        assert!(ResourceConfig::from_json(json).is_err());
    }

    #[test]
    fn test_reject_negative_price() {
        let json = r#"{"resource_id": 1, "price": "-5"}"#;
        assert!(ResourceConfig::from_json(json).is_err());
    }

    #[test]
    fn test_weekday_set_round_trips_as_names() {
        let set: WeekdaySet = [Weekday::Sun, Weekday::Fri].into_iter().collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["Fri","Sun"]"#);
    }

    #[test]
    fn test_billable_days_per_night_excludes_checkout() {
        let config = ResourceConfig::new(1, dec!(10));
        let days = config.billable_days(date("2025-01-10"), date("2025-01-12"));
        assert_eq!(days, vec![date("2025-01-10"), date("2025-01-11")]);
    }

    #[test]
    fn test_billable_days_per_day_includes_checkout() {
        let mut config = ResourceConfig::new(1, dec!(10));
        config.per_night = false;
        let days = config.billable_days(date("2025-01-10"), date("2025-01-12"));
        assert_eq!(days.len(), 3);
        assert_eq!(days[2], date("2025-01-12"));
    }

    #[test]
    fn test_billable_days_inverted_range_is_empty() {
        let config = ResourceConfig::new(1, dec!(10));
        assert!(config
            .billable_days(date("2025-01-12"), date("2025-01-10"))
            .is_empty());
        assert!(config
            .billable_days(date("2025-01-12"), date("2025-01-12"))
            .is_empty());
    }

    #[test]
    fn test_yearly_season_wraps_new_year() {
        let season = SeasonalPeriod {
            title: "Holidays".to_string(),
            start: date("2020-12-20"),
            end: date("2021-01-05"),
            enabled: true,
            repeat: SeasonRepeat::Yearly,
            rates: RateTable::default(),
            rules: StayRules::default(),
        };
        assert!(season.covers(date("2025-12-31")));
        assert!(season.covers(date("2026-01-02")));
        assert!(!season.covers(date("2026-01-06")));
        assert!(!season.covers(date("2025-12-19")));
    }

    #[test]
    fn test_season_rules_override_only_non_zero() {
        let mut config = ResourceConfig::new(1, dec!(10));
        config.rules = StayRules {
            min_days: 2,
            max_days: 14,
            start_day_offset: 1,
        };
        config.seasons.push(SeasonalPeriod {
            title: "Peak".to_string(),
            start: date("2025-07-01"),
            end: date("2025-07-31"),
            enabled: true,
            repeat: SeasonRepeat::None,
            rates: RateTable::default(),
            rules: StayRules {
                min_days: 7,
                max_days: 0,
                start_day_offset: 0,
            },
        });

        let peak = config.rules_for(date("2025-07-10"));
        assert_eq!(peak.min_days, 7);
        assert_eq!(peak.max_days, 14);
        assert_eq!(peak.start_day_offset, 1);
        assert_eq!(config.rules_for(date("2025-08-10")).min_days, 2);
    }
}
