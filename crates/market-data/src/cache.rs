use chrono::NaiveDate;
use forecast_core::{InterestPoint, InterestSeries};
use std::path::PathBuf;

use crate::MarketDataError;

/// Flat-file cache of the daily interest signal, one CSV per ticker.
#[derive(Debug, Clone)]
pub struct InterestCache {
    dir: PathBuf,
}

impl InterestCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, ticker: &str) -> PathBuf {
        self.dir
            .join(format!("google_trends_{}.csv", ticker.replace('-', "_")))
    }

    /// Write the series as `date,<keyword>` rows, replacing any previous file.
    pub fn store(&self, ticker: &str, series: &InterestSeries) -> Result<PathBuf, MarketDataError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(ticker);

        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(["date", series.keyword.as_str()])?;
        for point in &series.points {
            writer.write_record([point.date.format("%Y-%m-%d").to_string(), point.value.to_string()])?;
        }
        writer.flush()?;

        tracing::debug!("Stored {} interest rows in {}", series.len(), path.display());
        Ok(path)
    }

    /// Read a cached series. `Ok(None)` when no file exists for the ticker.
    pub fn load(&self, ticker: &str) -> Result<Option<InterestSeries>, MarketDataError> {
        let path = self.path_for(ticker);
        if !path.exists() {
            return Ok(None);
        }

        let mut reader = csv::Reader::from_path(&path)?;
        let keyword = reader
            .headers()?
            .get(1)
            .map(str::to_string)
            .ok_or_else(|| {
                MarketDataError::Cache(format!("{} has no value column", path.display()))
            })?;

        let mut points = Vec::new();
        for record in reader.records() {
            let record = record?;
            let (Some(date), Some(value)) = (record.get(0), record.get(1)) else {
                return Err(MarketDataError::Cache(format!(
                    "short row in {}",
                    path.display()
                )));
            };
            let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
                .map_err(|e| MarketDataError::Cache(format!("bad date '{}': {}", date, e)))?;
            let value = value
                .trim()
                .parse::<f64>()
                .map_err(|e| MarketDataError::Cache(format!("bad value '{}': {}", value, e)))?;
            points.push(InterestPoint { date, value });
        }

        Ok(Some(InterestSeries::new(keyword, points)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series() -> InterestSeries {
        InterestSeries::new(
            "bitcoin",
            vec![
                InterestPoint { date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), value: 12.0 },
                InterestPoint { date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(), value: 13.5 },
            ],
        )
    }

    #[test]
    fn test_path_replaces_dashes() {
        let cache = InterestCache::new("/tmp/cache");
        assert_eq!(
            cache.path_for("BTC-USD"),
            PathBuf::from("/tmp/cache/google_trends_BTC_USD.csv")
        );
    }

    #[test]
    fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = InterestCache::new(dir.path());

        let path = cache.store("BTC-USD", &series()).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.starts_with("date,bitcoin\n2024-03-01,12\n"));

        let loaded = cache.load("BTC-USD").unwrap().unwrap();
        assert_eq!(loaded, series());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = InterestCache::new(dir.path());
        assert!(cache.load("ETH-USD").unwrap().is_none());
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = InterestCache::new(dir.path());
        std::fs::write(cache.path_for("BTC-USD"), "date,bitcoin\nyesterday,abc\n").unwrap();
        assert!(matches!(cache.load("BTC-USD"), Err(MarketDataError::Cache(_))));
    }
}
