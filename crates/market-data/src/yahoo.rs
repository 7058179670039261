use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use forecast_core::PriceBar;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::{MarketDataError, PriceHistorySource};

const BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = "Mozilla/5.0";

/// Yahoo Finance chart API client for daily bars.
#[derive(Clone)]
pub struct YahooClient {
    client: Client,
    base_url: String,
}

impl YahooClient {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for YahooClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceHistorySource for YahooClient {
    async fn daily_history(
        &self,
        ticker: &str,
        start: NaiveDate,
    ) -> Result<Vec<PriceBar>, MarketDataError> {
        let url = format!("{}/{}", self.base_url, ticker);
        let period1 = start
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or_default();
        let period2 = Utc::now().timestamp();

        tracing::info!("Fetching daily history for {} since {}", ticker, start);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("events", "history".to_string()),
                ("includeAdjustedClose", "true".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            // Yahoo reports unknown symbols as 404 with a chart.error body
            if let Ok(parsed) = serde_json::from_str::<ChartResponse>(&body) {
                if let Some(err) = parsed.chart.error {
                    return Err(MarketDataError::Api(format!(
                        "{}: {}",
                        err.code, err.description
                    )));
                }
            }
            return Err(MarketDataError::Api(format!("HTTP {}: {}", status, body)));
        }

        let bars = parse_chart(&body, ticker)?;
        tracing::info!("Fetched {} daily bars for {}", bars.len(), ticker);
        Ok(bars)
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct AdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

fn at(values: &[Option<f64>], i: usize) -> Option<f64> {
    values.get(i).copied().flatten()
}

/// Flatten the nested chart payload into date-ordered bars.
pub(crate) fn parse_chart(body: &str, ticker: &str) -> Result<Vec<PriceBar>, MarketDataError> {
    let parsed: ChartResponse =
        serde_json::from_str(body).map_err(|e| MarketDataError::Malformed(e.to_string()))?;

    if let Some(err) = parsed.chart.error {
        return Err(MarketDataError::Api(format!("{}: {}", err.code, err.description)));
    }

    let result = parsed
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| MarketDataError::NoData(ticker.to_string()))?;

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let adjclose = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .unwrap_or_default()
        .adjclose;
    let offset = result.meta.gmtoffset;

    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (i, ts) in result.timestamp.iter().enumerate() {
        let Some(close) = at(&quote.close, i) else {
            continue;
        };
        let Some(date) = DateTime::from_timestamp(ts + offset, 0).map(|dt| dt.date_naive()) else {
            tracing::warn!("Skipping bar with invalid timestamp {} for {}", ts, ticker);
            continue;
        };

        bars.push(PriceBar {
            date,
            open: at(&quote.open, i).unwrap_or(close),
            high: at(&quote.high, i).unwrap_or(close),
            low: at(&quote.low, i).unwrap_or(close),
            close,
            adj_close: at(&adjclose, i).unwrap_or(close),
            volume: at(&quote.volume, i).unwrap_or(0.0),
        });
    }

    if bars.is_empty() {
        return Err(MarketDataError::NoData(ticker.to_string()));
    }

    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"symbol": "BTC-USD", "gmtoffset": -18000},
                "timestamp": [1704153600, 1704067200, 1704240000],
                "indicators": {
                    "quote": [{
                        "open": [2.0, 1.0, null],
                        "high": [2.5, 1.5, null],
                        "low": [1.5, 0.5, null],
                        "close": [2.2, 1.2, null],
                        "volume": [null, 100, 300]
                    }],
                    "adjclose": [{"adjclose": [2.1, 1.1, null]}]
                }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn test_parse_chart_flattens_and_sorts() {
        let bars = parse_chart(SAMPLE, "BTC-USD").unwrap();

        assert_eq!(bars.len(), 2);
        // 2024-01-01 00:00 UTC shifted by -5h lands on the previous day
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert_eq!(bars[0].close, 1.2);
        assert_eq!(bars[0].adj_close, 1.1);
        assert_eq!(bars[0].volume, 100.0);
        assert_eq!(bars[1].volume, 0.0);
        assert!(bars[0].date < bars[1].date);
    }

    #[test]
    fn test_parse_chart_api_error() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse_chart(body, "NOPE").unwrap_err();
        assert!(matches!(err, MarketDataError::Api(_)));
        assert!(err.to_string().contains("delisted"));
    }

    #[test]
    fn test_parse_chart_empty_result() {
        let body = r#"{"chart":{"result":[{"meta":{},"timestamp":[],"indicators":{"quote":[{}]}}],"error":null}}"#;
        assert!(matches!(
            parse_chart(body, "EMPTY"),
            Err(MarketDataError::NoData(_))
        ));
    }

    #[test]
    fn test_parse_chart_malformed() {
        assert!(matches!(
            parse_chart("not json", "X"),
            Err(MarketDataError::Malformed(_))
        ));
    }
}
