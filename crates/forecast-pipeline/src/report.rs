use async_trait::async_trait;
use forecast_core::{ForecastRow, ModelMetrics, PriceBar};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_COLLECTOR_URL: &str = "http://laravel.test/api/stock-api";
pub const COLLECTOR_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Collector rejected payload: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Collector endpoints, relative to the base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    StockData,
    Image,
    Forecast,
}

impl ReportKind {
    pub fn path(self) -> &'static str {
        match self {
            ReportKind::StockData => "",
            ReportKind::Image => "/image",
            ReportKind::Forecast => "/forecast",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReportKind::StockData => "stock data",
            ReportKind::Image => "chart",
            ReportKind::Forecast => "forecast",
        }
    }
}

/// Destination for run artefacts.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn send(&self, kind: ReportKind, payload: &Value) -> Result<(), ReportError>;
}

/// JSON POSTs to the external collector.
#[derive(Clone)]
pub struct HttpCollector {
    client: Client,
    base_url: String,
}

impl HttpCollector {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(COLLECTOR_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, kind: ReportKind) -> String {
        format!("{}{}", self.base_url, kind.path())
    }
}

#[async_trait]
impl ReportSink for HttpCollector {
    async fn send(&self, kind: ReportKind, payload: &Value) -> Result<(), ReportError> {
        let response = self.client.post(self.url_for(kind)).json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReportError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Sink for offline runs.
pub struct DisabledSink;

#[async_trait]
impl ReportSink for DisabledSink {
    async fn send(&self, kind: ReportKind, _payload: &Value) -> Result<(), ReportError> {
        tracing::debug!("Reporting disabled, dropping {} payload", kind.label());
        Ok(())
    }
}

/// Send a payload; failures are logged and never propagated.
pub async fn deliver(sink: &dyn ReportSink, kind: ReportKind, payload: &Value) -> bool {
    match sink.send(kind, payload).await {
        Ok(()) => {
            tracing::info!("Sent {} to collector", kind.label());
            true
        }
        Err(e) => {
            tracing::warn!("Failed to send {} to collector: {}", kind.label(), e);
            false
        }
    }
}

fn timestamp_label(date: chrono::NaiveDate) -> String {
    format!("{} 00:00:00", date.format("%Y-%m-%d"))
}

/// Raw price history with `{Field}_{TICKER}` column labels.
pub fn stock_data_payload(ticker: &str, session: &str, bars: &[PriceBar]) -> Value {
    let records: Vec<Value> = bars
        .iter()
        .map(|bar| {
            let mut record = Map::new();
            record.insert("Date".to_string(), json!(timestamp_label(bar.date)));
            record.insert(format!("Adj Close_{}", ticker), json!(bar.adj_close));
            record.insert(format!("Close_{}", ticker), json!(bar.close));
            record.insert(format!("High_{}", ticker), json!(bar.high));
            record.insert(format!("Low_{}", ticker), json!(bar.low));
            record.insert(format!("Open_{}", ticker), json!(bar.open));
            record.insert(format!("Volume_{}", ticker), json!(bar.volume));
            Value::Object(record)
        })
        .collect();

    json!({
        "ticker": ticker,
        "uuid": session,
        "stock_data": records,
    })
}

pub fn image_payload(ticker: &str, session: &str, image_base64: &str) -> Value {
    json!({
        "ticker": ticker,
        "uuid": session,
        "image": image_base64,
    })
}

#[derive(Debug, Serialize)]
struct ForecastRecord {
    index: String,
    forecast_close: f64,
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn forecast_payload(
    ticker: &str,
    session: &str,
    forecast: &[ForecastRow],
    metrics: &ModelMetrics,
) -> Value {
    let records: Vec<ForecastRecord> = forecast
        .iter()
        .map(|row| ForecastRecord {
            index: timestamp_label(row.date),
            forecast_close: round_cents(row.close),
        })
        .collect();

    json!({
        "ticker": ticker,
        "uuid": session,
        "forecast": records,
        "metrics": metrics,
    })
}

/// Plain-text table printed by the CLI.
pub fn format_forecast_table(forecast: &[ForecastRow]) -> String {
    let mut out = String::from("Date        Forecast_Close\n");
    for row in forecast {
        out.push_str(&format!(
            "{}  {:>14.2}\n",
            row.date.format("%Y-%m-%d"),
            round_cents(row.close)
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    #[test]
    fn test_collector_urls() {
        let collector = HttpCollector::new("http://collector.local/api/stock-api/");
        assert_eq!(collector.url_for(ReportKind::StockData), "http://collector.local/api/stock-api");
        assert_eq!(collector.url_for(ReportKind::Image), "http://collector.local/api/stock-api/image");
        assert_eq!(
            collector.url_for(ReportKind::Forecast),
            "http://collector.local/api/stock-api/forecast"
        );
    }

    #[test]
    fn test_stock_data_labels() {
        let bars = vec![PriceBar {
            date: d(1),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            adj_close: 1.4,
            volume: 10.0,
        }];
        let payload = stock_data_payload("BTC-USD", "abc", &bars);

        assert_eq!(payload["ticker"], "BTC-USD");
        assert_eq!(payload["uuid"], "abc");
        let record = &payload["stock_data"][0];
        assert_eq!(record["Date"], "2024-05-01 00:00:00");
        assert_eq!(record["Adj Close_BTC-USD"], 1.4);
        assert_eq!(record["Close_BTC-USD"], 1.5);
        assert_eq!(record["Volume_BTC-USD"], 10.0);
    }

    #[test]
    fn test_forecast_payload_rounds_to_cents() {
        let forecast = vec![ForecastRow { date: d(2), close: 123.4567 }];
        let metrics = ModelMetrics {
            mae: 0.01,
            rmse: 0.02,
            train_rows: 100,
            test_rows: 18,
        };
        let payload = forecast_payload("BTC-USD", "abc", &forecast, &metrics);

        assert_eq!(payload["forecast"][0]["index"], "2024-05-02 00:00:00");
        assert_eq!(payload["forecast"][0]["forecast_close"], 123.46);
        assert_eq!(payload["metrics"]["test_rows"], 18);
    }

    #[test]
    fn test_image_payload() {
        let payload = image_payload("ETH-USD", "s1", "aGVsbG8=");
        assert_eq!(payload["image"], "aGVsbG8=");
    }

    #[test]
    fn test_forecast_table() {
        let table = format_forecast_table(&[ForecastRow { date: d(3), close: 10.0 }]);
        assert!(table.starts_with("Date"));
        assert!(table.contains("2024-05-03"));
        assert!(table.contains("10.00"));
    }

    #[tokio::test]
    async fn test_unreachable_collector_is_swallowed() {
        // Port 9 (discard) on localhost is not expected to serve HTTP
        let collector = HttpCollector::new("http://127.0.0.1:9/api");
        let delivered = deliver(&collector, ReportKind::Image, &json!({"image": ""})).await;
        assert!(!delivered);
    }

    #[tokio::test]
    async fn test_disabled_sink() {
        assert!(deliver(&DisabledSink, ReportKind::Forecast, &json!({})).await);
    }
}
