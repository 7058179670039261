//! End-to-end analysis run: acquisition, features, training, forecast, reporting.

pub mod chart;
pub mod forecast;
pub mod report;

use chrono::Utc;
use forecast_core::{
    AnalysisParams, ForecastError, ForecastResult, ForecastRow, MarketFrame, ModelMetrics,
    TestPrediction,
};
use market_data::{
    acquire_interest, InterestCache, InterestSource, PriceHistorySource, TrendsClient, YahooClient,
};
use ml_engine::{
    chronological_split, design_matrix, mean_absolute_error, root_mean_squared_error,
    BoosterParams, GradientBoostedRegressor,
};
use std::path::PathBuf;
use std::sync::Arc;
use technical_analysis::make_features;
use uuid::Uuid;

use chart::ChartData;
use forecast::{reconstruct_test_period, Forecaster};
use report::{deliver, DisabledSink, HttpCollector, ReportKind, ReportSink};

pub use forecast::{reconstruct_price, ReturnModel};
pub use report::DEFAULT_COLLECTOR_URL;

/// Runtime settings outside the analysis parameters.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub collector_url: String,
    pub cache_dir: PathBuf,
    /// When false, payloads are dropped instead of posted.
    pub report: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            collector_url: DEFAULT_COLLECTOR_URL.to_string(),
            cache_dir: PathBuf::from("."),
            report: true,
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub session_id: String,
    pub metrics: ModelMetrics,
    pub test_predictions: Vec<TestPrediction>,
    pub forecast: Vec<ForecastRow>,
    pub used_interest: bool,
    pub chart_base64: Option<String>,
}

pub struct AnalysisPipeline {
    prices: Arc<dyn PriceHistorySource>,
    interest: Arc<dyn InterestSource>,
    cache: InterestCache,
    sink: Arc<dyn ReportSink>,
    booster: BoosterParams,
}

impl AnalysisPipeline {
    pub fn new(
        prices: Arc<dyn PriceHistorySource>,
        interest: Arc<dyn InterestSource>,
        cache: InterestCache,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            prices,
            interest,
            cache,
            sink,
            booster: BoosterParams::default(),
        }
    }

    /// Live Yahoo/Trends sources and the HTTP collector (or no reporting).
    pub fn from_config(config: &PipelineConfig) -> Self {
        let sink: Arc<dyn ReportSink> = if config.report {
            Arc::new(HttpCollector::new(config.collector_url.clone()))
        } else {
            Arc::new(DisabledSink)
        };

        Self::new(
            Arc::new(YahooClient::new()),
            Arc::new(TrendsClient::new()),
            InterestCache::new(config.cache_dir.clone()),
            sink,
        )
    }

    pub fn with_booster_params(mut self, params: BoosterParams) -> Self {
        self.booster = params;
        self
    }

    pub async fn run(&self, params: &AnalysisParams) -> ForecastResult<AnalysisOutcome> {
        params.validate()?;
        let session_id = Uuid::new_v4().to_string();
        let ticker = params.ticker.trim();
        let start = params.start_date()?;
        let horizon = usize::try_from(params.forecast_days)
            .map_err(|_| ForecastError::InvalidParameter("forecast_days must be positive".to_string()))?;

        tracing::info!(
            "Starting analysis {} for {} (trends '{}', since {})",
            session_id,
            ticker,
            params.trends,
            start
        );

        // 1. Prices (fatal on failure)
        let bars = self.prices.daily_history(ticker, start).await?;
        if bars.is_empty() {
            return Err(ForecastError::InsufficientData(format!(
                "no price history for {}",
                ticker
            )));
        }
        deliver(
            self.sink.as_ref(),
            ReportKind::StockData,
            &report::stock_data_payload(ticker, &session_id, &bars),
        )
        .await;

        // 2. Search interest (never fatal)
        let interest = acquire_interest(
            self.interest.as_ref(),
            &self.cache,
            ticker,
            &params.trends,
            start,
            Utc::now().date_naive(),
        )
        .await;

        // 3. Features
        let frame = MarketFrame::from_bars(&bars, interest.as_ref())?;
        let rows = make_features(&frame);
        tracing::info!(
            "Built {} feature rows from {} price rows (interest: {})",
            rows.len(),
            frame.len(),
            frame.has_interest()
        );
        if rows.is_empty() {
            return Err(ForecastError::InsufficientData(format!(
                "{} price rows are not enough to derive features",
                frame.len()
            )));
        }

        // 4. Train / evaluate
        let split = chronological_split(&rows, params.test_size_pct)?;
        let (x_train, y_train) = design_matrix(&split.train);
        let (x_test, y_test) = design_matrix(&split.test);

        let booster = self.booster;
        let model = tokio::task::spawn_blocking(move || {
            GradientBoostedRegressor::fit(booster, &x_train, &y_train)
        })
        .await
        .map_err(|e| ForecastError::ModelError(format!("training task failed: {}", e)))??;

        let predicted = model.predict(&x_test)?;
        let metrics = ModelMetrics {
            mae: mean_absolute_error(&y_test, &predicted)?,
            rmse: root_mean_squared_error(&y_test, &predicted)?,
            train_rows: split.train.len(),
            test_rows: split.test.len(),
        };
        tracing::info!("Test MAE  : {:.5}", metrics.mae);
        tracing::info!("Test RMSE : {:.5}", metrics.rmse);

        let test_predictions = reconstruct_test_period(&rows, &split.test, &predicted);

        // 5. Walk-forward forecast
        let mut forecaster = Forecaster::new(&model, frame.clone());
        forecaster.run(horizon)?;
        let forecast = forecaster.into_forecast();

        // 6. Chart + reports
        let chart = ChartData {
            ticker,
            history: &frame,
            test_predictions: &test_predictions,
            forecast: &forecast,
        };
        let chart_base64 = match chart::render_base64(&chart) {
            Ok(image) => {
                deliver(
                    self.sink.as_ref(),
                    ReportKind::Image,
                    &report::image_payload(ticker, &session_id, &image),
                )
                .await;
                Some(image)
            }
            Err(e) => {
                tracing::warn!("Failed to render chart: {}", e);
                None
            }
        };

        deliver(
            self.sink.as_ref(),
            ReportKind::Forecast,
            &report::forecast_payload(ticker, &session_id, &forecast, &metrics),
        )
        .await;

        tracing::info!("Analysis {} finished", session_id);

        Ok(AnalysisOutcome {
            session_id,
            metrics,
            test_predictions,
            forecast,
            used_interest: interest.is_some(),
            chart_base64,
        })
    }
}
