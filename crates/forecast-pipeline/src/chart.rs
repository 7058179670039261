use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Duration, NaiveDate};
use forecast_core::{ForecastError, ForecastResult, ForecastRow, MarketFrame, TestPrediction};
use plotters::prelude::*;

/// Number of most recent actual closes drawn.
pub const HISTORY_WINDOW: usize = 500;

const WIDTH: u32 = 1200;
const HEIGHT: u32 = 600;
const ORANGE: RGBColor = RGBColor(255, 165, 0);

/// Input series for the forecast chart.
pub struct ChartData<'a> {
    pub ticker: &'a str,
    pub history: &'a MarketFrame,
    pub test_predictions: &'a [TestPrediction],
    pub forecast: &'a [ForecastRow],
}

fn chart_error<E: std::fmt::Display>(e: E) -> ForecastError {
    ForecastError::ChartError(e.to_string())
}

/// Render the actual/test/forecast comparison as an SVG document.
pub fn render_svg(data: &ChartData<'_>) -> ForecastResult<String> {
    let history: Vec<(NaiveDate, f64)> = data
        .history
        .rows()
        .iter()
        .filter_map(|r| r.close.map(|c| (r.date, c)))
        .collect();
    let history = &history[history.len().saturating_sub(HISTORY_WINDOW)..];

    let test: Vec<(NaiveDate, f64)> = data
        .test_predictions
        .iter()
        .map(|p| (p.date, p.predicted_close))
        .collect();
    let forecast: Vec<(NaiveDate, f64)> = data.forecast.iter().map(|f| (f.date, f.close)).collect();

    let all = || history.iter().chain(test.iter()).chain(forecast.iter());
    let (Some(x_min), Some(x_max)) = (all().map(|p| p.0).min(), all().map(|p| p.0).max()) else {
        return Err(ForecastError::ChartError("nothing to plot".to_string()));
    };
    let values = all().map(|p| p.1).filter(|v| v.is_finite());
    let (y_min, y_max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !y_min.is_finite() || !y_max.is_finite() {
        return Err(ForecastError::ChartError("no finite prices to plot".to_string()));
    }
    let pad = ((y_max - y_min) * 0.05).max(1e-6);
    let x_range = x_min..(x_max + Duration::days(1));
    let y_range = (y_min - pad)..(y_max + pad);

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_error)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(
                format!("{} - gradient boosting (log-returns -> price)", data.ticker),
                ("sans-serif", 22),
            )
            .margin(12)
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d(x_range, y_range)
            .map_err(chart_error)?;

        chart
            .configure_mesh()
            .x_desc("Date")
            .y_desc("Price [USD]")
            .x_labels(10)
            .x_label_formatter(&|d: &NaiveDate| d.format("%Y-%m").to_string())
            .draw()
            .map_err(chart_error)?;

        chart
            .draw_series(LineSeries::new(history.iter().copied(), &BLUE))
            .map_err(chart_error)?
            .label("Actual close")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

        if !test.is_empty() {
            chart
                .draw_series(LineSeries::new(test.iter().copied(), &ORANGE))
                .map_err(chart_error)?
                .label("Test period prediction")
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], ORANGE));
        }

        if !forecast.is_empty() {
            chart
                .draw_series(LineSeries::new(forecast.iter().copied(), &RED))
                .map_err(chart_error)?
                .label(format!("Forecast +{} d", forecast.len()))
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));
        }

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .position(SeriesLabelPosition::UpperLeft)
            .draw()
            .map_err(chart_error)?;

        root.present().map_err(chart_error)?;
    }

    Ok(svg)
}

/// Render and base64-encode the chart for the image endpoint.
pub fn render_base64(data: &ChartData<'_>) -> ForecastResult<String> {
    let svg = render_svg(data)?;
    Ok(STANDARD.encode(svg.as_bytes()))
}
