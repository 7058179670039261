//! Native gradient-boosted regression trees for next-day return prediction.

pub mod booster;
pub mod error;
pub mod metrics;
pub mod split;

pub use booster::{BoosterParams, GradientBoostedRegressor};
pub use error::{ModelError, ModelResult};
pub use metrics::{mean_absolute_error, root_mean_squared_error};
pub use split::{chronological_split, design_matrix, TrainTestSplit};
