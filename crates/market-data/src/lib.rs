pub mod acquire;
pub mod cache;
pub mod error;
pub mod trends;
pub mod yahoo;

use async_trait::async_trait;
use chrono::NaiveDate;
use forecast_core::{InterestSeries, PriceBar};

pub use acquire::acquire_interest;
pub use cache::InterestCache;
pub use error::MarketDataError;
pub use trends::TrendsClient;
pub use yahoo::YahooClient;

/// Daily price history provider.
#[async_trait]
pub trait PriceHistorySource: Send + Sync {
    /// Bars from `start` up to today, oldest first.
    async fn daily_history(
        &self,
        ticker: &str,
        start: NaiveDate,
    ) -> Result<Vec<PriceBar>, MarketDataError>;
}

/// Search-interest provider.
#[async_trait]
pub trait InterestSource: Send + Sync {
    async fn interest_over_time(
        &self,
        keyword: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<InterestSeries, MarketDataError>;
}
