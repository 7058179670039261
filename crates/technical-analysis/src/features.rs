use forecast_core::{FeatureRow, MarketFrame};

use crate::indicators::*;

pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const BOLLINGER_PERIOD: usize = 20;
pub const BOLLINGER_STD_DEV: f64 = 2.0;
pub const VOLUME_WINDOW: usize = 30;
pub const INTEREST_WINDOW: usize = 7;
pub const RETURN_LAGS: [usize; 3] = [1, 7, 30];

/// Rows needed before the first complete feature row.
pub const LONGEST_LOOKBACK: usize = 30;

/// Derive the feature table from a market frame.
///
/// Derivation order is fixed: returns, momentum, volatility, volume z-score,
/// interest average, label. Rows whose price-derived lookback values are
/// undefined are dropped; interest features stay optional.
pub fn make_features(frame: &MarketFrame) -> Vec<FeatureRow> {
    let closes = frame.closes();
    let volumes = frame.volumes();
    let interest = frame.interest();

    let ret_1 = log_returns(&closes, RETURN_LAGS[0]);
    let ret_7 = log_returns(&closes, RETURN_LAGS[1]);
    let ret_30 = log_returns(&closes, RETURN_LAGS[2]);

    let rsi_14 = rsi(&closes, RSI_PERIOD);
    let macd = macd(&closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL);

    let bands = bollinger_bands(&closes, BOLLINGER_PERIOD, BOLLINGER_STD_DEV);

    let vol_z = rolling_zscore(&volumes, VOLUME_WINDOW);

    let interest_7d = rolling_mean(&interest, INTEREST_WINDOW);

    let target = lead(&ret_1);

    let mut rows = Vec::with_capacity(frame.len().saturating_sub(LONGEST_LOOKBACK));
    for (i, source) in frame.rows().iter().enumerate() {
        let required = (
            source.close,
            source.volume,
            ret_1[i],
            ret_7[i],
            ret_30[i],
            rsi_14[i],
            macd.macd_line[i],
            macd.signal_line[i],
        );
        let (
            Some(close),
            Some(volume),
            Some(ret_1),
            Some(ret_7),
            Some(ret_30),
            Some(rsi_14),
            Some(macd_value),
            Some(macd_signal),
        ) = required
        else {
            continue;
        };
        let (Some(bb_high), Some(bb_low), Some(vol_z)) = (bands.upper[i], bands.lower[i], vol_z[i])
        else {
            continue;
        };

        rows.push(FeatureRow {
            date: source.date,
            close,
            volume,
            interest: source.interest,
            ret_1,
            ret_7,
            ret_30,
            rsi_14,
            macd: macd_value,
            macd_signal,
            bb_high,
            bb_low,
            bb_width: (bb_high - bb_low) / close,
            vol_z,
            interest_7d: interest_7d[i],
            target: target[i],
        });
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use forecast_core::{InterestPoint, InterestSeries, PriceBar, FEATURE_COUNT};

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
    }

    fn synthetic_bars(n: usize) -> Vec<PriceBar> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                let close = 100.0 + 0.05 * t + 3.0 * (t / 7.0).sin();
                PriceBar {
                    date: start() + Duration::days(i as i64),
                    open: close - 0.5,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    adj_close: close,
                    volume: 1_000_000.0 + 50_000.0 * (t / 3.0).cos(),
                }
            })
            .collect()
    }

    fn synthetic_interest(n: usize) -> InterestSeries {
        let points = (0..n)
            .map(|i| InterestPoint {
                date: start() + Duration::days(i as i64),
                value: 40.0 + (i % 10) as f64,
            })
            .collect();
        InterestSeries::new("bitcoin", points)
    }

    #[test]
    fn test_lookback_drops_leading_rows() {
        let frame = MarketFrame::from_bars(&synthetic_bars(400), None).unwrap();
        let rows = make_features(&frame);

        assert_eq!(rows.len(), 400 - LONGEST_LOOKBACK);
        assert_eq!(rows[0].date, start() + Duration::days(LONGEST_LOOKBACK as i64));
    }

    #[test]
    fn test_price_features_are_finite() {
        let frame = MarketFrame::from_bars(&synthetic_bars(400), None).unwrap();
        for row in make_features(&frame) {
            let v = row.feature_vector();
            assert_eq!(v.len(), FEATURE_COUNT);
            for (i, value) in v.iter().enumerate() {
                if i == 2 || i == 13 {
                    assert!(value.is_nan());
                } else {
                    assert!(value.is_finite(), "feature {} not finite", i);
                }
            }
            assert!((0.0..=100.0).contains(&row.rsi_14));
            assert!(row.bb_high >= row.bb_low);
        }
    }

    #[test]
    fn test_label_is_next_day_return() {
        let frame = MarketFrame::from_bars(&synthetic_bars(120), None).unwrap();
        let rows = make_features(&frame);

        let (last, body) = rows.split_last().unwrap();
        assert!(last.target.is_none());
        for (row, next) in body.iter().zip(rows.iter().skip(1)) {
            assert!((row.target.unwrap() - next.ret_1).abs() < 1e-12);
        }
    }

    #[test]
    fn test_interest_features_present_when_joined() {
        let interest = synthetic_interest(400);
        let frame = MarketFrame::from_bars(&synthetic_bars(400), Some(&interest)).unwrap();
        let rows = make_features(&frame);

        assert_eq!(rows.len(), 370);
        assert!(rows.iter().all(|r| r.interest.is_some() && r.interest_7d.is_some()));
        assert!(rows.iter().all(|r| r.feature_vector().iter().all(|v| v.is_finite())));
    }

    #[test]
    fn test_deterministic() {
        let frame = MarketFrame::from_bars(&synthetic_bars(200), None).unwrap();
        let a = make_features(&frame);
        let b = make_features(&frame);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.feature_vector().iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
                y.feature_vector().iter().map(|v| v.to_bits()).collect::<Vec<_>>());
            assert_eq!(x.target, y.target);
        }
    }

    #[test]
    fn test_short_history_yields_nothing() {
        let frame = MarketFrame::from_bars(&synthetic_bars(LONGEST_LOOKBACK), None).unwrap();
        assert!(make_features(&frame).is_empty());
    }

    #[test]
    fn test_placeholder_row_is_excluded() {
        let mut frame = MarketFrame::from_bars(&synthetic_bars(100), None).unwrap();
        let before = make_features(&frame);
        let next = frame.last().unwrap().date + Duration::days(1);
        frame.push_placeholder(next).unwrap();
        let after = make_features(&frame);

        assert_eq!(after.len(), before.len());
        assert_eq!(after.last().unwrap().date, before.last().unwrap().date);
    }
}
