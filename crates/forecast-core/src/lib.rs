pub mod error;
pub mod params;
pub mod types;

pub use error::*;
pub use params::*;
pub use types::*;
