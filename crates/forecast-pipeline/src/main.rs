use anyhow::Result;
use clap::Parser;
use forecast_core::params::{
    DEFAULT_FORECAST_DAYS, DEFAULT_START_DATE, DEFAULT_TEST_SIZE_PCT, DEFAULT_TICKER,
    DEFAULT_TRENDS,
};
use forecast_core::AnalysisParams;
use forecast_pipeline::report::format_forecast_table;
use forecast_pipeline::{AnalysisPipeline, PipelineConfig, DEFAULT_COLLECTOR_URL};
use std::path::PathBuf;

/// Next-day return model and walk-forward price forecast for one instrument.
#[derive(Parser, Debug)]
#[command(name = "stock-model", version, about)]
struct Cli {
    /// Instrument symbol, e.g. BTC-USD
    #[arg(long, default_value = DEFAULT_TICKER)]
    ticker: String,

    /// Search-interest keyword
    #[arg(long, default_value = DEFAULT_TRENDS)]
    trends: String,

    /// First day of history (YYYY-MM-DD)
    #[arg(long = "start_date", default_value = DEFAULT_START_DATE)]
    start_date: String,

    /// Fraction of labelled rows held out for testing
    #[arg(long = "test_size_pct", default_value_t = DEFAULT_TEST_SIZE_PCT)]
    test_size_pct: f64,

    /// Business days to forecast
    #[arg(long = "forecast_days", default_value_t = DEFAULT_FORECAST_DAYS)]
    forecast_days: i64,

    /// Collector base URL
    #[arg(long, env = "COLLECTOR_URL", default_value = DEFAULT_COLLECTOR_URL)]
    collector_url: String,

    /// Directory holding the interest CSV cache
    #[arg(long, env = "TRENDS_CACHE_DIR", default_value = ".")]
    cache_dir: PathBuf,

    /// Skip posting results to the collector
    #[arg(long)]
    no_report: bool,
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let params = AnalysisParams {
        ticker: cli.ticker,
        trends: cli.trends,
        start_date: cli.start_date,
        test_size_pct: cli.test_size_pct,
        forecast_days: cli.forecast_days,
    };
    let config = PipelineConfig {
        collector_url: cli.collector_url,
        cache_dir: cli.cache_dir,
        report: !cli.no_report,
    };

    let pipeline = AnalysisPipeline::from_config(&config);
    let outcome = pipeline.run(&params).await.map_err(|e| {
        tracing::error!("Analysis failed: {}", e);
        e
    })?;

    println!("Test MAE  : {:.5}", outcome.metrics.mae);
    println!("Test RMSE : {:.5}", outcome.metrics.rmse);
    println!();
    println!("Forecast for the next days:");
    print!("{}", format_forecast_table(&outcome.forecast));

    Ok(())
}
