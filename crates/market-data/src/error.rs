use forecast_core::ForecastError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("No data returned for {0}")]
    NoData(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Cache error: {0}")]
    Cache(String),
}

impl From<csv::Error> for MarketDataError {
    fn from(e: csv::Error) -> Self {
        MarketDataError::Cache(e.to_string())
    }
}

impl From<std::io::Error> for MarketDataError {
    fn from(e: std::io::Error) -> Self {
        MarketDataError::Cache(e.to_string())
    }
}

impl From<MarketDataError> for ForecastError {
    fn from(e: MarketDataError) -> Self {
        match e {
            MarketDataError::Cache(msg) => ForecastError::CacheError(msg),
            MarketDataError::NoData(msg) => ForecastError::InsufficientData(msg),
            other => ForecastError::ApiError(other.to_string()),
        }
    }
}
