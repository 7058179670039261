use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use forecast_core::{InterestPoint, InterestSeries};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::{InterestSource, MarketDataError};

const BASE_URL: &str = "https://trends.google.com";
const USER_AGENT: &str = "Mozilla/5.0";
const HOST_LANGUAGE: &str = "en-US";
const TZ_OFFSET_MINUTES: &str = "360";

/// Google Trends client for interest-over-time series.
///
/// Trends has no public API; the flow mirrors what the web UI does: pick up a
/// session cookie, ask `explore` for the TIMESERIES widget, then fetch its data.
#[derive(Clone)]
pub struct TrendsClient {
    client: Client,
    base_url: String,
}

impl TrendsClient {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, MarketDataError> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(MarketDataError::Api(format!("HTTP {}: {}", status, truncate(&body))));
        }
        strip_xssi(&body)
    }

    async fn timeseries_widget(
        &self,
        keyword: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<(String, Value), MarketDataError> {
        let req = json!({
            "comparisonItem": [{
                "keyword": keyword,
                "time": format!("{} {}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d")),
                "geo": "",
            }],
            "category": 0,
            "property": "",
        });

        let explore = self
            .get_json(
                &format!("{}/trends/api/explore", self.base_url),
                &[
                    ("hl", HOST_LANGUAGE.to_string()),
                    ("tz", TZ_OFFSET_MINUTES.to_string()),
                    ("req", req.to_string()),
                ],
            )
            .await?;

        find_timeseries_widget(&explore)
    }
}

impl Default for TrendsClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InterestSource for TrendsClient {
    async fn interest_over_time(
        &self,
        keyword: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<InterestSeries, MarketDataError> {
        // Session cookie; Trends answers 429 to cookieless API calls
        self.client
            .get(format!("{}/?geo=US", self.base_url))
            .send()
            .await?;

        let (token, request) = self.timeseries_widget(keyword, start, end).await?;

        let data = self
            .get_json(
                &format!("{}/trends/api/widgetdata/multiline", self.base_url),
                &[
                    ("hl", HOST_LANGUAGE.to_string()),
                    ("tz", TZ_OFFSET_MINUTES.to_string()),
                    ("req", request.to_string()),
                    ("token", token),
                ],
            )
            .await?;

        let series = parse_timeline(keyword, &data)?;
        tracing::info!(
            "Fetched {} interest observations for '{}'",
            series.len(),
            keyword
        );
        Ok(series.forward_fill_daily())
    }
}

/// Trends prefixes JSON with an anti-XSSI guard such as `)]}'`.
fn strip_xssi(body: &str) -> Result<Value, MarketDataError> {
    let start = body
        .find('{')
        .ok_or_else(|| MarketDataError::Malformed(format!("no JSON object in '{}'", truncate(body))))?;
    serde_json::from_str(&body[start..]).map_err(|e| MarketDataError::Malformed(e.to_string()))
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

fn find_timeseries_widget(explore: &Value) -> Result<(String, Value), MarketDataError> {
    let widgets = explore
        .get("widgets")
        .and_then(Value::as_array)
        .ok_or_else(|| MarketDataError::Malformed("explore response has no widgets".to_string()))?;

    let widget = widgets
        .iter()
        .find(|w| w.get("id").and_then(Value::as_str) == Some("TIMESERIES"))
        .ok_or_else(|| MarketDataError::Malformed("TIMESERIES widget missing".to_string()))?;

    let token = widget
        .get("token")
        .and_then(Value::as_str)
        .ok_or_else(|| MarketDataError::Malformed("TIMESERIES widget has no token".to_string()))?;
    let request = widget
        .get("request")
        .cloned()
        .ok_or_else(|| MarketDataError::Malformed("TIMESERIES widget has no request".to_string()))?;

    Ok((token.to_string(), request))
}

fn parse_timeline(keyword: &str, data: &Value) -> Result<InterestSeries, MarketDataError> {
    let timeline = data
        .pointer("/default/timelineData")
        .and_then(Value::as_array)
        .ok_or_else(|| MarketDataError::Malformed("timelineData missing".to_string()))?;

    let mut points = Vec::with_capacity(timeline.len());
    for entry in timeline {
        let seconds = match entry.get("time") {
            Some(Value::String(s)) => s.parse::<i64>().ok(),
            Some(Value::Number(n)) => n.as_i64(),
            _ => None,
        };
        let value = entry
            .get("value")
            .and_then(Value::as_array)
            .and_then(|v| v.first())
            .and_then(Value::as_f64);

        let date = seconds
            .and_then(|s| DateTime::from_timestamp(s, 0))
            .map(|dt| dt.date_naive());
        if let (Some(date), Some(value)) = (date, value) {
            points.push(InterestPoint { date, value });
        }
    }

    if points.is_empty() {
        return Err(MarketDataError::NoData(keyword.to_string()));
    }
    Ok(InterestSeries::new(keyword, points))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_xssi_prefix() {
        let value = strip_xssi(")]}'\n{\"a\": 1}").unwrap();
        assert_eq!(value["a"], 1);

        let value = strip_xssi(")]}',\n{\"b\": 2}").unwrap();
        assert_eq!(value["b"], 2);

        assert!(strip_xssi("<html>blocked</html>").is_err());
    }

    #[test]
    fn test_find_timeseries_widget() {
        let explore = json!({
            "widgets": [
                {"id": "GEO_MAP", "token": "geo"},
                {"id": "TIMESERIES", "token": "abc", "request": {"time": "2020-01-01 2020-02-01"}}
            ]
        });
        let (token, request) = find_timeseries_widget(&explore).unwrap();
        assert_eq!(token, "abc");
        assert_eq!(request["time"], "2020-01-01 2020-02-01");

        assert!(find_timeseries_widget(&json!({"widgets": []})).is_err());
    }

    #[test]
    fn test_parse_timeline() {
        let data = json!({
            "default": {
                "timelineData": [
                    {"time": "1577836800", "value": [42]},
                    {"time": "1578441600", "value": [55]},
                    {"time": "bogus", "value": [1]}
                ]
            }
        });
        let series = parse_timeline("bitcoin", &data).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.points[0].date, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert_eq!(series.points[1].value, 55.0);

        let daily = series.forward_fill_daily();
        assert_eq!(daily.len(), 8);
    }

    #[test]
    fn test_parse_timeline_empty() {
        let data = json!({"default": {"timelineData": []}});
        assert!(matches!(
            parse_timeline("bitcoin", &data),
            Err(MarketDataError::NoData(_))
        ));
    }
}
