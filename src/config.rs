use std::env;
use std::str::FromStr;

use anyhow::Context;
use rust_decimal::Decimal;

use crate::models::StatusTaxonomy;
use crate::services::pricing::TaxConvention;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub business_name: String,
    /// Path to a JSON status table; the built-in table is used when unset.
    pub status_taxonomy: Option<String>,
    pub prices_include_tax: bool,
    pub tax_rate: Decimal,
    /// 0 disables the stale booking cleanup.
    pub stale_booking_minutes: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "staybook.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            business_name: env::var("BUSINESS_NAME").unwrap_or_else(|_| "Staybook".to_string()),
            status_taxonomy: env::var("STATUS_TAXONOMY").ok().filter(|v| !v.is_empty()),
            prices_include_tax: env::var("PRICES_INCLUDE_TAX")
                .ok()
                .map(|v| parse_bool(&v))
                .unwrap_or(false),
            tax_rate: env::var("TAX_RATE")
                .ok()
                .and_then(|v| Decimal::from_str(v.trim()).ok())
                .unwrap_or(Decimal::ZERO),
            stale_booking_minutes: env::var("STALE_BOOKING_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }
    }

    pub fn tax_convention(&self) -> TaxConvention {
        TaxConvention {
            prices_include_tax: self.prices_include_tax,
            rate_percent: self.tax_rate,
        }
    }

    pub fn load_taxonomy(&self) -> anyhow::Result<StatusTaxonomy> {
        match &self.status_taxonomy {
            None => Ok(StatusTaxonomy::default()),
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read status table {path}"))?;
                StatusTaxonomy::from_json(&json).with_context(|| format!("invalid status table {path}"))
            }
        }
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool(" YES "));
        assert!(parse_bool("1"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("nope"));
    }

    #[test]
    fn test_missing_taxonomy_file_is_an_error() {
        let config = AppConfig {
            port: 0,
            database_url: ":memory:".to_string(),
            admin_token: "t".to_string(),
            business_name: "Test".to_string(),
            status_taxonomy: Some("/nonexistent/statuses.json".to_string()),
            prices_include_tax: false,
            tax_rate: Decimal::ZERO,
            stale_booking_minutes: 0,
        };
        assert!(config.load_taxonomy().is_err());
    }
}
