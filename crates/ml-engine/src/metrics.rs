use crate::error::{ModelError, ModelResult};

fn check(actual: &[f64], predicted: &[f64]) -> ModelResult<()> {
    if actual.len() != predicted.len() {
        return Err(ModelError::LengthMismatch(actual.len(), predicted.len()));
    }
    if actual.is_empty() {
        return Err(ModelError::InvalidSplit("no rows to score".to_string()));
    }
    Ok(())
}

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> ModelResult<f64> {
    check(actual, predicted)?;
    let total: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum();
    Ok(total / actual.len() as f64)
}

pub fn root_mean_squared_error(actual: &[f64], predicted: &[f64]) -> ModelResult<f64> {
    check(actual, predicted)?;
    let total: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    Ok((total / actual.len() as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mae() {
        let mae = mean_absolute_error(&[1.0, 2.0, 3.0], &[1.5, 2.0, 2.0]).unwrap();
        assert!((mae - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_rmse() {
        let rmse = root_mean_squared_error(&[0.0, 0.0], &[3.0, 4.0]).unwrap();
        assert!((rmse - 12.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_rmse_not_below_mae() {
        let actual = [0.01, -0.02, 0.005, 0.0];
        let predicted = [0.0, 0.01, 0.0, -0.03];
        let mae = mean_absolute_error(&actual, &predicted).unwrap();
        let rmse = root_mean_squared_error(&actual, &predicted).unwrap();
        assert!(rmse >= mae);
    }

    #[test]
    fn test_mismatched_lengths() {
        assert_eq!(
            mean_absolute_error(&[1.0], &[1.0, 2.0]),
            Err(ModelError::LengthMismatch(1, 2))
        );
        assert!(root_mean_squared_error(&[], &[]).is_err());
    }
}
