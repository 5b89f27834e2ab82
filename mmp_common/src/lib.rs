mod points;
mod rank;

pub mod op;

pub use points::{Points, PointsConversionError};
pub use rank::{base_hourly_rate, minimum_hourly_rate, CastRank, RankConversionError};
