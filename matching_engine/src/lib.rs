//! Meetup Matching Engine
//!
//! The matching engine brokers paid, time-boxed in-person meetups between guests and casts. This
//! library contains the core lifecycle logic for both one-to-one ("solo") and one-to-many
//! ("group") offers. It is transport-agnostic.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@db`]). SQLite is the supported backend. You should
//!    never need to access the database directly. Instead, use the public API provided by the
//!    engine. The exception is the data types used in the database. These are defined in the
//!    `db_types` module and are public.
//! 2. The engine public API ([`MatchingFlowApi`] and [`MatchingQueryApi`]). This provides the
//!    public-facing functionality of the engine: creating offers, applying cast responses,
//!    driving sessions through start/extend/complete, and serving the role-scoped read views.
//!    Specific backends need to implement the traits in [`mod@db`] in order to act as a store for
//!    the engine.
//!
//! The engine also provides a set of events that can be subscribed to. These events are emitted
//! when certain transitions occur, for example when a cast accepts an offer a `MatchingAccepted`
//! event is emitted. A simple hook system lets the surrounding application (typically its
//! notification layer) react to these events without the engine knowing anything about delivery.
pub mod db;

pub mod db_types;
pub mod events;
pub mod helpers;
mod mme_api;
#[cfg(feature = "sqlite")]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use db::sqlite::SqliteDatabase;
pub use db::traits;
pub use db::traits::{MatchingEngineError, MatchingLifecycleDatabase, MatchingQueries, ReviewLookup};
pub use mme_api::{matching_objects, MatchingFlowApi, MatchingQueryApi};
