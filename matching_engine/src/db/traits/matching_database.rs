use chrono::{DateTime, NaiveDate, Utc};
use mmp_common::Points;
use thiserror::Error;

use crate::db_types::{
    AgeRange,
    CastProfile,
    CastResponse,
    GroupMatching,
    Matching,
    MatchingKey,
    NewCastProfile,
    NewGroupMatching,
    NewSoloMatching,
    SoloMatching,
};
use super::queries::MatchingQueries;

/// This trait defines the highest level of behaviour for backends supporting the matching engine.
///
/// This behaviour includes:
/// * Persisting new solo and group offers, including the atomic participant fan-out for groups.
/// * Applying cast responses with exactly-once semantics.
/// * Driving accepted offers through the session state machine.
///
/// Every status transition must be expressed as an update guarded by the expected prior status in
/// the same statement. Zero rows affected means the precondition no longer holds (a lost
/// double-submit race, or a caller out of step with the state machine); implementations classify
/// that into [`MatchingEngineError::InvalidState`], [`MatchingEngineError::Forbidden`] or a
/// not-found error with a follow-up read, but the guarded write stays the sole gate.
#[allow(async_fn_in_trait)]
pub trait MatchingLifecycleDatabase: Clone + MatchingQueries {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new solo offer in `Pending` status. `proposed_date` and `total_points` have
    /// already been resolved and computed by the caller.
    async fn insert_solo_matching(
        &self,
        offer: &NewSoloMatching,
        proposed_date: DateTime<Utc>,
        total_points: Points,
    ) -> Result<SoloMatching, MatchingEngineError>;

    /// Takes the point-in-time snapshot of casts eligible for a group offer: active casts whose
    /// age on `today` falls inside the filter band, when one is supplied.
    async fn eligible_casts(
        &self,
        filter: Option<&AgeRange>,
        today: NaiveDate,
    ) -> Result<Vec<CastProfile>, MatchingEngineError>;

    /// Stores a new group offer and fans out one `Pending` participant row per eligible cast, all
    /// inside a single transaction. The eligible set is the snapshot the caller took with
    /// [`Self::eligible_casts`]; it is passed in explicitly so the fan-out never re-evaluates the
    /// query mid-transaction. A partially inserted participant set must never be observable.
    ///
    /// Transient transaction failures (the storage engine reporting busy/locked) retry the whole
    /// transaction a bounded number of times. No other failure is retried.
    async fn insert_group_matching(
        &self,
        offer: &NewGroupMatching,
        proposed_date: DateTime<Utc>,
        total_points: Points,
        eligible: &[CastProfile],
    ) -> Result<GroupMatching, MatchingEngineError>;

    /// Applies a cast's response to a pending solo offer. The caller must be the assigned cast,
    /// and the offer must still be `Pending`; the write is a single conditional update so that of
    /// two racing submissions exactly one wins.
    async fn respond_to_solo_matching(
        &self,
        matching_id: i64,
        cast_id: i64,
        response: CastResponse,
    ) -> Result<SoloMatching, MatchingEngineError>;

    /// Applies a cast's response to its own `Pending` participant row on a group offer. Distinct
    /// casts touch disjoint rows, so no cross-row coordination happens here; per-row conditional
    /// updates carry the whole concurrency story. The parent matching's status is not changed.
    ///
    /// Returns the parent matching.
    async fn respond_to_group_matching(
        &self,
        matching_id: i64,
        cast_id: i64,
        response: CastResponse,
    ) -> Result<GroupMatching, MatchingEngineError>;

    /// Starts the session. For a solo offer the caller is the assigned cast and the offer must be
    /// `Accepted` (or `Meeting`). For a group offer the caller must hold an `Accepted` participant
    /// row, which transitions to `Joined`; the first joiner also moves the parent to `InProgress`
    /// and stamps the session clock.
    async fn start_session(
        &self,
        key: MatchingKey,
        cast_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Matching, MatchingEngineError>;

    /// Extends a running session by `extension_minutes` (already validated by the caller).
    /// The caller must be the owning guest. Accumulates extension minutes and points and pushes
    /// `scheduled_end_at` out by the same amount.
    async fn extend_session(
        &self,
        key: MatchingKey,
        guest_id: i64,
        extension_minutes: i64,
    ) -> Result<Matching, MatchingEngineError>;

    /// Ends a running session: stamps `actual_end_at` and moves the matching to `Completed`.
    /// The caller must be the assigned cast (solo) or a `Joined` participant (group); every
    /// `Joined` participant row on a group matching is moved to `Completed` with it. A second
    /// completion attempt fails; it must not silently succeed.
    async fn complete_session(
        &self,
        key: MatchingKey,
        cast_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Matching, MatchingEngineError>;

    /// Withdraws an offer that has not started yet (`Pending` or `Accepted`). The caller must be
    /// the owning guest.
    async fn cancel_matching(&self, key: MatchingKey, guest_id: i64) -> Result<Matching, MatchingEngineError>;

    /// Records the externally-created chat room id on the offer. The value is opaque to the
    /// engine and can be written exactly once.
    async fn assign_chat_room(&self, key: MatchingKey, room_id: &str) -> Result<Matching, MatchingEngineError>;

    /// Closes recruiting on a group offer: stamps `recruiting_ended_at` and rejects every
    /// still-`Pending` participant. The caller must be the owning guest; a second close fails.
    async fn close_recruiting(
        &self,
        matching_id: i64,
        guest_id: i64,
        now: DateTime<Utc>,
    ) -> Result<GroupMatching, MatchingEngineError>;

    /// Creates or refreshes a cast profile row. Production rows are written by the profile
    /// subsystem against the same table; the engine exposes this for admin and test seeding.
    async fn upsert_cast_profile(&self, profile: &NewCastProfile) -> Result<CastProfile, MatchingEngineError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), MatchingEngineError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum MatchingEngineError {
    #[error("We have an internal database engine error: {0}")]
    DatabaseError(String),
    #[error("{0}")]
    Validation(String),
    #[error("Permission denied. {0}")]
    Forbidden(String),
    #[error("The requested matching {0} does not exist")]
    MatchingNotFound(MatchingKey),
    #[error("Cast {cast_id} is not a participant of group matching {matching_id}")]
    ParticipantNotFound { matching_id: i64, cast_id: i64 },
    #[error("The operation is not allowed from the current status. {0}")]
    InvalidState(String),
    #[error("No casts match the recruiting criteria for this offer")]
    NoEligibleCasts,
}

impl From<sqlx::Error> for MatchingEngineError {
    fn from(e: sqlx::Error) -> Self {
        MatchingEngineError::DatabaseError(e.to_string())
    }
}
