use forecast_core::ForecastError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Expected {expected} features, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Label at row {0} is not finite")]
    NonFiniteLabel(usize),

    #[error("Invalid split: {0}")]
    InvalidSplit(String),

    #[error("Length mismatch: {0} actual values vs {1} predictions")]
    LengthMismatch(usize, usize),
}

pub type ModelResult<T> = Result<T, ModelError>;

impl From<ModelError> for ForecastError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::InvalidSplit(msg) => ForecastError::InsufficientData(msg),
            other => ForecastError::ModelError(other.to_string()),
        }
    }
}
