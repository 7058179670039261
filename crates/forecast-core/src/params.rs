use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ForecastError;

pub const MIN_TEST_SIZE_PCT: f64 = 0.05;
pub const MAX_TEST_SIZE_PCT: f64 = 0.5;
pub const MIN_FORECAST_DAYS: i64 = 1;
pub const MAX_FORECAST_DAYS: i64 = 90;
pub const MAX_TICKER_LEN: usize = 20;
pub const MAX_TRENDS_LEN: usize = 30;

pub const DEFAULT_TICKER: &str = "BTC-USD";
pub const DEFAULT_TRENDS: &str = "bitcoin";
pub const DEFAULT_START_DATE: &str = "2017-01-01";
pub const DEFAULT_TEST_SIZE_PCT: f64 = 0.15;
pub const DEFAULT_FORECAST_DAYS: i64 = 20;

/// Parameters of one analysis run, shared by the CLI and the HTTP wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    pub ticker: String,
    /// Search-interest keyword used for the exogenous signal.
    pub trends: String,
    pub start_date: String,
    #[serde(default = "default_test_size_pct")]
    pub test_size_pct: f64,
    #[serde(default = "default_forecast_days")]
    pub forecast_days: i64,
}

fn default_test_size_pct() -> f64 {
    DEFAULT_TEST_SIZE_PCT
}

fn default_forecast_days() -> i64 {
    DEFAULT_FORECAST_DAYS
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            ticker: DEFAULT_TICKER.to_string(),
            trends: DEFAULT_TRENDS.to_string(),
            start_date: DEFAULT_START_DATE.to_string(),
            test_size_pct: DEFAULT_TEST_SIZE_PCT,
            forecast_days: DEFAULT_FORECAST_DAYS,
        }
    }
}

impl AnalysisParams {
    /// Validate against today's UTC date.
    pub fn validate(&self) -> Result<(), ForecastError> {
        self.validate_at(Utc::now().date_naive())
    }

    pub fn validate_at(&self, today: NaiveDate) -> Result<(), ForecastError> {
        validate_test_size_pct(self.test_size_pct)?;
        validate_forecast_days(self.forecast_days)?;

        let ticker = self.ticker.trim();
        if ticker.is_empty() || ticker.len() > MAX_TICKER_LEN {
            return Err(ForecastError::InvalidParameter(format!(
                "ticker must be between 1 and {} characters",
                MAX_TICKER_LEN
            )));
        }

        let trends = self.trends.trim();
        if trends.is_empty() || trends.len() > MAX_TRENDS_LEN {
            return Err(ForecastError::InvalidParameter(format!(
                "trends must be between 1 and {} characters",
                MAX_TRENDS_LEN
            )));
        }

        let start = self.start_date()?;
        if start >= today {
            return Err(ForecastError::InvalidParameter(format!(
                "start_date must be before {}",
                today
            )));
        }

        Ok(())
    }

    pub fn start_date(&self) -> Result<NaiveDate, ForecastError> {
        NaiveDate::parse_from_str(self.start_date.trim(), "%Y-%m-%d").map_err(|e| {
            ForecastError::InvalidParameter(format!(
                "start_date '{}' is not a YYYY-MM-DD date: {}",
                self.start_date, e
            ))
        })
    }

    /// Flags understood by the `stock-model` binary.
    pub fn to_cli_args(&self) -> Vec<String> {
        vec![
            "--ticker".to_string(),
            self.ticker.clone(),
            "--trends".to_string(),
            self.trends.clone(),
            "--start_date".to_string(),
            self.start_date.clone(),
            "--test_size_pct".to_string(),
            self.test_size_pct.to_string(),
            "--forecast_days".to_string(),
            self.forecast_days.to_string(),
        ]
    }
}

pub fn validate_test_size_pct(value: f64) -> Result<(), ForecastError> {
    if !(MIN_TEST_SIZE_PCT..=MAX_TEST_SIZE_PCT).contains(&value) {
        return Err(ForecastError::InvalidParameter(format!(
            "test_size_pct must be between {} and {}",
            MIN_TEST_SIZE_PCT, MAX_TEST_SIZE_PCT
        )));
    }
    Ok(())
}

pub fn validate_forecast_days(value: i64) -> Result<(), ForecastError> {
    if !(MIN_FORECAST_DAYS..=MAX_FORECAST_DAYS).contains(&value) {
        return Err(ForecastError::InvalidParameter(format!(
            "forecast_days must be between {} and {}",
            MIN_FORECAST_DAYS, MAX_FORECAST_DAYS
        )));
    }
    Ok(())
}
