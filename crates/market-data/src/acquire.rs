use chrono::NaiveDate;
use forecast_core::InterestSeries;

use crate::{InterestCache, InterestSource};

/// Fetch the interest signal, falling back to the on-disk cache.
///
/// Never fails: a live fetch is cached and returned, otherwise the cached
/// copy is used, otherwise the signal is treated as unavailable.
pub async fn acquire_interest(
    source: &dyn InterestSource,
    cache: &InterestCache,
    ticker: &str,
    keyword: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Option<InterestSeries> {
    match source.interest_over_time(keyword, start, end).await {
        Ok(series) if !series.is_empty() => {
            match cache.store(ticker, &series) {
                Ok(path) => tracing::info!("Interest data saved to {}", path.display()),
                Err(e) => tracing::warn!("Failed to cache interest data: {}", e),
            }
            return Some(series);
        }
        Ok(_) => tracing::warn!("Interest source returned no data for '{}'", keyword),
        Err(e) => tracing::warn!("Failed to fetch interest data for '{}': {}", keyword, e),
    }

    match cache.load(ticker) {
        Ok(Some(series)) => {
            tracing::info!(
                "Loaded interest data from {}",
                cache.path_for(ticker).display()
            );
            Some(series.forward_fill_daily())
        }
        Ok(None) => {
            tracing::info!("No cached interest data for {}, skipping the signal", ticker);
            None
        }
        Err(e) => {
            tracing::warn!("Failed to read cached interest data: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MarketDataError;
    use async_trait::async_trait;
    use forecast_core::InterestPoint;

    struct FixedSource(Option<InterestSeries>);

    #[async_trait]
    impl InterestSource for FixedSource {
        async fn interest_over_time(
            &self,
            keyword: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<InterestSeries, MarketDataError> {
            self.0
                .clone()
                .ok_or_else(|| MarketDataError::Api(format!("429 for {}", keyword)))
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn series() -> InterestSeries {
        InterestSeries::new(
            "bitcoin",
            vec![
                InterestPoint { date: d(1), value: 10.0 },
                InterestPoint { date: d(2), value: 20.0 },
            ],
        )
    }

    #[tokio::test]
    async fn test_live_fetch_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = InterestCache::new(dir.path());
        let source = FixedSource(Some(series()));

        let got = acquire_interest(&source, &cache, "BTC-USD", "bitcoin", d(1), d(2)).await;
        assert_eq!(got, Some(series()));
        assert_eq!(cache.load("BTC-USD").unwrap(), Some(series()));
    }

    #[tokio::test]
    async fn test_falls_back_to_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = InterestCache::new(dir.path());
        cache.store("BTC-USD", &series()).unwrap();

        let got = acquire_interest(&FixedSource(None), &cache, "BTC-USD", "bitcoin", d(1), d(2)).await;
        assert_eq!(got, Some(series()));
    }

    #[tokio::test]
    async fn test_unavailable_without_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = InterestCache::new(dir.path());

        let got = acquire_interest(&FixedSource(None), &cache, "BTC-USD", "bitcoin", d(1), d(2)).await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_cache_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cache = InterestCache::new(dir.path());
        std::fs::write(cache.path_for("BTC-USD"), "garbage").unwrap();

        let got = acquire_interest(&FixedSource(None), &cache, "BTC-USD", "bitcoin", d(1), d(2)).await;
        assert!(got.is_none());
    }
}
