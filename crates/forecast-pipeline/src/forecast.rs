use forecast_core::{
    next_business_day, FeatureRow, ForecastError, ForecastResult, ForecastRow, MarketFrame,
    TestPrediction,
};
use ml_engine::GradientBoostedRegressor;
use technical_analysis::make_features;

/// Anything that maps a feature vector to a next-day log-return.
pub trait ReturnModel: Send + Sync {
    fn predict_return(&self, features: &[f64]) -> ForecastResult<f64>;
}

impl ReturnModel for GradientBoostedRegressor {
    fn predict_return(&self, features: &[f64]) -> ForecastResult<f64> {
        Ok(self.predict_row(features)?)
    }
}

/// `price_t = price_{t-1} * e^{r}`
pub fn reconstruct_price(previous_close: f64, log_return: f64) -> f64 {
    previous_close * log_return.exp()
}

/// Price-level view of the held-out predictions.
///
/// Each test row's predicted return is applied to its own close and dated at
/// the following feature row, next to that row's actual close.
pub fn reconstruct_test_period(
    all_rows: &[FeatureRow],
    test_rows: &[FeatureRow],
    predicted_returns: &[f64],
) -> Vec<TestPrediction> {
    test_rows
        .iter()
        .zip(predicted_returns)
        .filter_map(|(row, r)| {
            let idx = all_rows.binary_search_by_key(&row.date, |f| f.date).ok()?;
            let next = all_rows.get(idx + 1)?;
            Some(TestPrediction {
                date: next.date,
                actual_close: next.close,
                predicted_close: reconstruct_price(row.close, *r),
            })
        })
        .collect()
}

/// Walk-forward forecaster: one business day per step, features recomputed
/// over the whole extended frame every time.
pub struct Forecaster<'m, M: ReturnModel + ?Sized> {
    model: &'m M,
    frame: MarketFrame,
    forecast: Vec<ForecastRow>,
}

impl<'m, M: ReturnModel + ?Sized> Forecaster<'m, M> {
    pub fn new(model: &'m M, frame: MarketFrame) -> Self {
        Self {
            model,
            frame,
            forecast: Vec::new(),
        }
    }

    /// Advance one business day and fill in its reconstructed close.
    pub fn step(&mut self) -> ForecastResult<ForecastRow> {
        let prior = self
            .frame
            .last()
            .cloned()
            .ok_or_else(|| ForecastError::InsufficientData("frame is empty".to_string()))?;
        let previous_close = prior.close.ok_or_else(|| {
            ForecastError::InvalidData(format!("row {} has no close", prior.date))
        })?;

        let date = next_business_day(prior.date);
        self.frame.push_placeholder(date)?;

        // The placeholder has no close, so the newest complete row is the prior day
        let features = make_features(&self.frame);
        let last = features
            .last()
            .filter(|f| f.date == prior.date)
            .ok_or_else(|| {
                ForecastError::InsufficientData(format!(
                    "no complete feature row for {}",
                    prior.date
                ))
            })?;

        let log_return = self.model.predict_return(&last.feature_vector())?;
        let close = reconstruct_price(previous_close, log_return);
        if !close.is_finite() {
            return Err(ForecastError::ModelError(format!(
                "non-finite forecast for {} (return {})",
                date, log_return
            )));
        }

        self.frame.set_last_close(close)?;
        let row = ForecastRow { date, close };
        self.forecast.push(row.clone());
        tracing::debug!("Forecast {}: {:.2} (r = {:+.5})", date, close, log_return);
        Ok(row)
    }

    pub fn run(&mut self, horizon: usize) -> ForecastResult<&[ForecastRow]> {
        for _ in 0..horizon {
            self.step()?;
        }
        Ok(&self.forecast)
    }

    pub fn frame(&self) -> &MarketFrame {
        &self.frame
    }

    pub fn into_forecast(self) -> Vec<ForecastRow> {
        self.forecast
    }
}
