use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::Points;

//--------------------------------------     CastRank      -----------------------------------------------------------
/// A cast's pricing tier. The tier fixes the default hourly rate a cast charges for solo offers,
/// and the lowest tier's rate doubles as the platform-wide base rate used to budget group offers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum CastRank {
    #[default]
    Standard,
    Premium,
    Royal,
}

impl CastRank {
    pub fn hourly_rate(&self) -> Points {
        match self {
            CastRank::Standard => Points::from(3_000),
            CastRank::Premium => Points::from(5_000),
            CastRank::Royal => Points::from(10_000),
        }
    }
}

impl Display for CastRank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CastRank::Standard => write!(f, "Standard"),
            CastRank::Premium => write!(f, "Premium"),
            CastRank::Royal => write!(f, "Royal"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid cast rank: {0}")]
pub struct RankConversionError(String);

impl FromStr for CastRank {
    type Err = RankConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Standard" => Ok(Self::Standard),
            "Premium" => Ok(Self::Premium),
            "Royal" => Ok(Self::Royal),
            s => Err(RankConversionError(s.to_string())),
        }
    }
}

/// The per-cast hourly rate used to budget group offers, regardless of which casts accept.
pub fn base_hourly_rate() -> Points {
    CastRank::Standard.hourly_rate()
}

/// The lowest hourly rate a guest may offer on a solo matching.
pub fn minimum_hourly_rate() -> Points {
    CastRank::Standard.hourly_rate()
}
