pub mod config;
pub mod error;
pub mod events;
pub mod geo;
pub mod impact;
pub mod score;
pub mod session;
pub mod telemetry;
pub mod time;

pub use error::{AppError, Result};
pub use geo::{GeoLocation, GeoResolver};
pub use score::{ScoreResult, StarTally};
