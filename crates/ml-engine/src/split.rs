use forecast_core::FeatureRow;

use crate::error::{ModelError, ModelResult};

/// Time-ordered train/test partition of the labelled feature rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainTestSplit {
    pub train: Vec<FeatureRow>,
    pub test: Vec<FeatureRow>,
}

/// Split at `floor(len * (1 - test_size_pct))` without shuffling.
///
/// Rows without a label (the newest row) never take part.
pub fn chronological_split(rows: &[FeatureRow], test_size_pct: f64) -> ModelResult<TrainTestSplit> {
    if !(test_size_pct > 0.0 && test_size_pct < 1.0) {
        return Err(ModelError::InvalidSplit(format!(
            "test_size_pct {} must be in (0, 1)",
            test_size_pct
        )));
    }

    let labelled: Vec<FeatureRow> = rows.iter().filter(|r| r.target.is_some()).cloned().collect();
    let split_at = (labelled.len() as f64 * (1.0 - test_size_pct)).floor() as usize;

    if split_at == 0 || split_at >= labelled.len() {
        return Err(ModelError::InvalidSplit(format!(
            "{} labelled rows are not enough for a {:.0}% test split",
            labelled.len(),
            test_size_pct * 100.0
        )));
    }

    let mut train = labelled;
    let test = train.split_off(split_at);
    Ok(TrainTestSplit { train, test })
}

/// Feature vectors and labels of the labelled rows.
pub fn design_matrix(rows: &[FeatureRow]) -> (Vec<Vec<f64>>, Vec<f64>) {
    rows.iter()
        .filter_map(|r| r.target.map(|y| (r.feature_vector(), y)))
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn rows(n: usize) -> Vec<FeatureRow> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n)
            .map(|i| FeatureRow {
                date: start + Duration::days(i as i64),
                close: 100.0 + i as f64,
                volume: 1.0,
                interest: None,
                ret_1: 0.01,
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
                target: if i + 1 < n { Some(i as f64) } else { None },
            })
            .collect()
    }

    #[test]
    fn test_split_is_chronological() {
        let split = chronological_split(&rows(101), 0.15).unwrap();

        // 100 labelled rows, floor(100 * 0.85) = 85
        assert_eq!(split.train.len(), 85);
        assert_eq!(split.test.len(), 15);
        let last_train = split.train.last().unwrap().date;
        assert!(split.test.iter().all(|r| r.date > last_train));
        assert!(split.train.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn test_unlabelled_row_is_excluded() {
        let split = chronological_split(&rows(21), 0.5).unwrap();
        assert!(split.test.iter().all(|r| r.target.is_some()));
        assert_eq!(split.train.len() + split.test.len(), 20);
    }

    #[test]
    fn test_too_few_rows() {
        assert!(chronological_split(&rows(2), 0.15).is_err());
        assert!(chronological_split(&[], 0.15).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_pct() {
        assert!(chronological_split(&rows(50), 0.0).is_err());
        assert!(chronological_split(&rows(50), 1.0).is_err());
    }

    #[test]
    fn test_design_matrix_skips_unlabelled() {
        let (x, y) = design_matrix(&rows(5));
        assert_eq!(x.len(), 4);
        assert_eq!(y, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(x[0].len(), forecast_core::FEATURE_COUNT);
    }
}
