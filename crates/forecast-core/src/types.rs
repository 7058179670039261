use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ForecastError;

/// Daily OHLCV bar. Dates are naive calendar dates in the exchange's local time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterestPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Search-interest history for one keyword, ordered by date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestSeries {
    pub keyword: String,
    pub points: Vec<InterestPoint>,
}

impl InterestSeries {
    /// Sorts the points and keeps the last value seen for a duplicated date.
    pub fn new(keyword: impl Into<String>, mut points: Vec<InterestPoint>) -> Self {
        points.sort_by_key(|p| p.date);
        let mut deduped: Vec<InterestPoint> = Vec::with_capacity(points.len());
        for point in points {
            match deduped.last_mut() {
                Some(last) if last.date == point.date => *last = point,
                _ => deduped.push(point),
            }
        }
        Self {
            keyword: keyword.into(),
            points: deduped,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Resample to one point per calendar day between the first and last
    /// observation, carrying the previous value forward.
    pub fn forward_fill_daily(&self) -> Self {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return self.clone();
        };

        let mut daily = Vec::new();
        let mut idx = 0;
        let mut current = first.value;
        let mut date = first.date;
        while date <= last.date {
            while idx < self.points.len() && self.points[idx].date <= date {
                current = self.points[idx].value;
                idx += 1;
            }
            daily.push(InterestPoint { date, value: current });
            date += Duration::days(1);
        }

        Self {
            keyword: self.keyword.clone(),
            points: daily,
        }
    }

    /// Most recent observation at or before `date`.
    pub fn value_as_of(&self, date: NaiveDate) -> Option<f64> {
        let idx = self.points.partition_point(|p| p.date <= date);
        if idx == 0 {
            None
        } else {
            Some(self.points[idx - 1].value)
        }
    }
}

/// One row of the working table fed to the feature pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRow {
    pub date: NaiveDate,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    pub interest: Option<f64>,
}

/// Date-ordered price + interest table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketFrame {
    rows: Vec<FrameRow>,
}

impl MarketFrame {
    /// Build the frame from price bars, joining the interest signal as of
    /// each price date. Price dates are neither added nor dropped.
    ///
    /// Closes must be finite and positive; anything else would leave holes
    /// in the log-return series.
    pub fn from_bars(
        bars: &[PriceBar],
        interest: Option<&InterestSeries>,
    ) -> Result<Self, ForecastError> {
        if let Some(bad) = bars.iter().find(|b| !b.close.is_finite() || b.close <= 0.0) {
            return Err(ForecastError::InvalidData(format!(
                "close on {} is not a positive price: {}",
                bad.date, bad.close
            )));
        }

        let mut sorted: Vec<&PriceBar> = bars.iter().collect();
        sorted.sort_by_key(|b| b.date);

        let mut rows: Vec<FrameRow> = Vec::with_capacity(sorted.len());
        for bar in sorted {
            let row = FrameRow {
                date: bar.date,
                close: Some(bar.close),
                volume: Some(bar.volume),
                interest: interest.and_then(|s| s.value_as_of(bar.date)),
            };
            match rows.last_mut() {
                Some(last) if last.date == row.date => *last = row,
                _ => rows.push(row),
            }
        }

        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[FrameRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last(&self) -> Option<&FrameRow> {
        self.rows.last()
    }

    pub fn closes(&self) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.close).collect()
    }

    pub fn volumes(&self) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.volume).collect()
    }

    pub fn interest(&self) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.interest).collect()
    }

    pub fn has_interest(&self) -> bool {
        self.rows.iter().any(|r| r.interest.is_some())
    }

    /// Append a future row with an undefined close. Volume and interest are
    /// copied from the prior row as placeholders.
    pub fn push_placeholder(&mut self, date: NaiveDate) -> Result<(), ForecastError> {
        let prior = self.rows.last().ok_or_else(|| {
            ForecastError::InsufficientData("cannot extend an empty frame".to_string())
        })?;
        if date <= prior.date {
            return Err(ForecastError::InvalidData(format!(
                "placeholder date {} is not after {}",
                date, prior.date
            )));
        }
        let row = FrameRow {
            date,
            close: None,
            volume: prior.volume,
            interest: prior.interest,
        };
        self.rows.push(row);
        Ok(())
    }

    pub fn set_last_close(&mut self, close: f64) -> Result<(), ForecastError> {
        let last = self
            .rows
            .last_mut()
            .ok_or_else(|| ForecastError::InsufficientData("frame is empty".to_string()))?;
        last.close = Some(close);
        Ok(())
    }
}

/// Names of the model inputs, in feature-vector order.
pub const FEATURE_NAMES: [&str; 14] = [
    "close",
    "volume",
    "interest",
    "ret_1",
    "ret_7",
    "ret_30",
    "rsi_14",
    "macd",
    "macd_signal",
    "bb_high",
    "bb_low",
    "bb_width",
    "vol_z",
    "interest_7d",
];

pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

/// Derived per-date model input plus the next-day label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub close: f64,
    pub volume: f64,
    pub interest: Option<f64>,
    pub ret_1: f64,
    pub ret_7: f64,
    pub ret_30: f64,
    pub rsi_14: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub bb_high: f64,
    pub bb_low: f64,
    pub bb_width: f64,
    pub vol_z: f64,
    pub interest_7d: Option<f64>,
    /// Next day's log-return. `None` on the newest row.
    pub target: Option<f64>,
}

impl FeatureRow {
    /// Model input in `FEATURE_NAMES` order. Missing interest values are NaN.
    pub fn feature_vector(&self) -> Vec<f64> {
        vec![
            self.close,
            self.volume,
            self.interest.unwrap_or(f64::NAN),
            self.ret_1,
            self.ret_7,
            self.ret_30,
            self.rsi_14,
            self.macd,
            self.macd_signal,
            self.bb_high,
            self.bb_low,
            self.bb_width,
            self.vol_z,
            self.interest_7d.unwrap_or(f64::NAN),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub date: NaiveDate,
    pub close: f64,
}

/// Reconstructed price for a held-out row, dated at the day it predicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestPrediction {
    pub date: NaiveDate,
    pub actual_close: f64,
    pub predicted_close: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Next Monday-to-Friday date strictly after `date`.
pub fn next_business_day(date: NaiveDate) -> NaiveDate {
    let mut next = date + Duration::days(1);
    while matches!(next.weekday(), Weekday::Sat | Weekday::Sun) {
        next += Duration::days(1);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn bar(date: NaiveDate, close: f64) -> PriceBar {
        PriceBar {
            date,
            open: close,
            high: close,
            low: close,
            close,
            adj_close: close,
            volume: 1_000.0,
        }
    }

    #[test]
    fn test_next_business_day_skips_weekend() {
        // 2025-06-06 is a Friday
        assert_eq!(next_business_day(d(2025, 6, 6)), d(2025, 6, 9));
        assert_eq!(next_business_day(d(2025, 6, 7)), d(2025, 6, 9));
        assert_eq!(next_business_day(d(2025, 6, 9)), d(2025, 6, 10));
    }

    #[test]
    fn test_forward_fill_daily() {
        let series = InterestSeries::new(
            "bitcoin",
            vec![
                InterestPoint { date: d(2025, 1, 8), value: 60.0 },
                InterestPoint { date: d(2025, 1, 1), value: 50.0 },
            ],
        );
        let daily = series.forward_fill_daily();
        assert_eq!(daily.len(), 8);
        assert_eq!(daily.points[0].value, 50.0);
        assert_eq!(daily.points[6].value, 50.0);
        assert_eq!(daily.points[7].value, 60.0);
    }

    #[test]
    fn test_frame_joins_interest_as_of_price_dates() {
        let interest = InterestSeries::new(
            "bitcoin",
            vec![
                InterestPoint { date: d(2025, 1, 2), value: 10.0 },
                InterestPoint { date: d(2025, 1, 4), value: 20.0 },
            ],
        );
        let bars = vec![
            bar(d(2025, 1, 1), 1.0),
            bar(d(2025, 1, 3), 2.0),
            bar(d(2025, 1, 6), 3.0),
        ];
        let frame = MarketFrame::from_bars(&bars, Some(&interest)).unwrap();

        assert_eq!(frame.len(), 3);
        assert_eq!(frame.interest(), vec![None, Some(10.0), Some(20.0)]);
    }

    #[test]
    fn test_push_placeholder_copies_auxiliary_columns() {
        let bars = vec![bar(d(2025, 1, 1), 1.0), bar(d(2025, 1, 2), 2.0)];
        let mut frame = MarketFrame::from_bars(&bars, None).unwrap();
        frame.push_placeholder(d(2025, 1, 3)).unwrap();

        let last = frame.last().unwrap();
        assert_eq!(last.close, None);
        assert_eq!(last.volume, Some(1_000.0));
        assert_eq!(last.interest, None);

        assert!(frame.push_placeholder(d(2025, 1, 3)).is_err());
    }

    #[test]
    fn test_from_bars_rejects_unusable_closes() {
        let mut bars = vec![bar(d(2025, 1, 1), 1.0), bar(d(2025, 1, 2), 0.0)];
        assert!(matches!(
            MarketFrame::from_bars(&bars, None),
            Err(ForecastError::InvalidData(_))
        ));

        bars[1].close = f64::NAN;
        assert!(MarketFrame::from_bars(&bars, None).is_err());

        bars[1].close = 2.0;
        assert_eq!(MarketFrame::from_bars(&bars, None).unwrap().len(), 2);
    }

    #[test]
    fn test_feature_vector_encodes_missing_interest_as_nan() {
        let row = FeatureRow {
            date: d(2025, 1, 1),
            close: 1.0,
            volume: 2.0,
            interest: None,
            ret_1: 0.0,
            ret_7: 0.0,
            ret_30: 0.0,
            rsi_14: 50.0,
            macd: 0.0,
            macd_signal: 0.0,
            bb_high: 1.0,
            bb_low: 1.0,
            bb_width: 0.0,
            vol_z: 0.0,
            interest_7d: None,
            target: None,
        };
        let v = row.feature_vector();
        assert_eq!(v.len(), FEATURE_COUNT);
        assert!(v[2].is_nan());
        assert!(v[13].is_nan());
        assert_eq!(v[6], 50.0);
    }
}
