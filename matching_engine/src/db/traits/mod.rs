//! The behaviour a storage backend must provide to drive the matching engine.
//!
//! [`MatchingLifecycleDatabase`] covers every mutating path (offer creation, cast responses, and
//! the session state machine); [`MatchingQueries`] covers the read-only projections the dashboards
//! consume. [`ReviewLookup`] is the seam to the external review subsystem; the engine never reads
//! review rows itself.
mod matching_database;
mod queries;
mod review;

pub use matching_database::{MatchingEngineError, MatchingLifecycleDatabase};
pub use queries::MatchingQueries;
pub use review::ReviewLookup;
