use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use log::error;
use mmp_common::{CastRank, Points};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------   MatchingStatus    ---------------------------------------------------------
/// The session status of an offer, shared by solo and group matchings.
///
/// The happy path runs `Pending → Accepted → Meeting → InProgress → Completed`. A pending offer
/// can be `Rejected` by the cast, and the owning guest can move a `Pending` or `Accepted` offer
/// to the `Cancelled` terminal. Group matchings skip `Accepted` at the parent level, since
/// acceptance lives on the individual participant rows; the first participant to start the
/// session drives the parent straight to `InProgress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum MatchingStatus {
    /// The offer has been created and no response has been recorded.
    Pending,
    /// The cast accepted the offer. The session has not started yet.
    Accepted,
    /// The cast turned the offer down.
    Rejected,
    /// The parties are on their way to the meetup location.
    Meeting,
    /// The session is running.
    InProgress,
    /// The session has ended normally.
    Completed,
    /// The guest withdrew the offer before the session started.
    Cancelled,
}

impl MatchingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MatchingStatus::Rejected | MatchingStatus::Completed | MatchingStatus::Cancelled)
    }
}

impl Display for MatchingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchingStatus::Pending => write!(f, "Pending"),
            MatchingStatus::Accepted => write!(f, "Accepted"),
            MatchingStatus::Rejected => write!(f, "Rejected"),
            MatchingStatus::Meeting => write!(f, "Meeting"),
            MatchingStatus::InProgress => write!(f, "InProgress"),
            MatchingStatus::Completed => write!(f, "Completed"),
            MatchingStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid matching status: {0}")]
pub struct StatusConversionError(String);

impl FromStr for MatchingStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Accepted" => Ok(Self::Accepted),
            "Rejected" => Ok(Self::Rejected),
            "Meeting" => Ok(Self::Meeting),
            "InProgress" => Ok(Self::InProgress),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(StatusConversionError(s.to_string())),
        }
    }
}

impl From<String> for MatchingStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid matching status: {value}. But this conversion cannot fail. Defaulting to Pending");
            MatchingStatus::Pending
        })
    }
}

//-------------------------------------- ParticipantStatus  ----------------------------------------------------------
/// A cast's individual standing within a group offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ParticipantStatus {
    Pending,
    Accepted,
    Rejected,
    Joined,
    Completed,
}

impl Display for ParticipantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParticipantStatus::Pending => write!(f, "Pending"),
            ParticipantStatus::Accepted => write!(f, "Accepted"),
            ParticipantStatus::Rejected => write!(f, "Rejected"),
            ParticipantStatus::Joined => write!(f, "Joined"),
            ParticipantStatus::Completed => write!(f, "Completed"),
        }
    }
}

impl FromStr for ParticipantStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Accepted" => Ok(Self::Accepted),
            "Rejected" => Ok(Self::Rejected),
            "Joined" => Ok(Self::Joined),
            "Completed" => Ok(Self::Completed),
            s => Err(StatusConversionError(s.to_string())),
        }
    }
}

impl From<String> for ParticipantStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid participant status: {value}. But this conversion cannot fail. Defaulting to Pending");
            ParticipantStatus::Pending
        })
    }
}

//--------------------------------------    CastResponse    ----------------------------------------------------------
/// The two answers a cast can give to a pending offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastResponse {
    Accepted,
    Rejected,
}

impl CastResponse {
    pub fn as_matching_status(&self) -> MatchingStatus {
        match self {
            CastResponse::Accepted => MatchingStatus::Accepted,
            CastResponse::Rejected => MatchingStatus::Rejected,
        }
    }

    pub fn as_participant_status(&self) -> ParticipantStatus {
        match self {
            CastResponse::Accepted => ParticipantStatus::Accepted,
            CastResponse::Rejected => ParticipantStatus::Rejected,
        }
    }
}

impl Display for CastResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CastResponse::Accepted => write!(f, "Accepted"),
            CastResponse::Rejected => write!(f, "Rejected"),
        }
    }
}

//--------------------------------------    MatchingKey     ----------------------------------------------------------
/// Identifies a matching of either kind. Solo and group offers live in separate tables and id
/// spaces, so every cross-kind reference carries the kind tag along with the row id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchingKey {
    Solo(i64),
    Group(i64),
}

impl MatchingKey {
    pub fn id(&self) -> i64 {
        match self {
            MatchingKey::Solo(id) | MatchingKey::Group(id) => *id,
        }
    }
}

impl Display for MatchingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchingKey::Solo(id) => write!(f, "solo/{id}"),
            MatchingKey::Group(id) => write!(f, "group/{id}"),
        }
    }
}

//--------------------------------------  ProposedSchedule  ----------------------------------------------------------
/// When the meetup should take place. Guests either pick an absolute time or ask to meet "in N
/// minutes"; exactly one of the two must be supplied.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProposedSchedule {
    pub date: Option<DateTime<Utc>>,
    pub offset_minutes: Option<i64>,
}

#[derive(Debug, Clone, Error)]
pub enum ScheduleError {
    #[error("Either a proposed date or an offset from now must be supplied")]
    Unspecified,
    #[error("A proposed date and an offset from now cannot both be supplied")]
    Ambiguous,
}

impl ProposedSchedule {
    pub fn at(date: DateTime<Utc>) -> Self {
        Self { date: Some(date), offset_minutes: None }
    }

    pub fn in_minutes(offset_minutes: i64) -> Self {
        Self { date: None, offset_minutes: Some(offset_minutes) }
    }

    /// Resolves the schedule against the given server clock reading.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        match (self.date, self.offset_minutes) {
            (Some(_), Some(_)) => Err(ScheduleError::Ambiguous),
            (Some(date), None) => Ok(date),
            (None, Some(offset)) => Ok(now + chrono::Duration::minutes(offset)),
            (None, None) => Err(ScheduleError::Unspecified),
        }
    }
}

//--------------------------------------      AgeRange      ----------------------------------------------------------
/// An inclusive age band for group-offer recruiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub min: u8,
    pub max: u8,
}

impl AgeRange {
    pub fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }
}

//--------------------------------------    SoloMatching    ----------------------------------------------------------
/// A one-to-one offer between a guest and a single cast.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SoloMatching {
    pub id: i64,
    pub guest_id: i64,
    pub cast_id: i64,
    /// Set by the chat collaborator once a room exists for this matching. Opaque to the engine.
    pub chat_room_id: Option<String>,
    pub status: MatchingStatus,
    pub proposed_date: DateTime<Utc>,
    pub proposed_duration_minutes: i64,
    pub proposed_location: String,
    pub hourly_rate: Points,
    /// Fixed at creation time from the proposed duration and the hourly rate. Extensions never
    /// touch this; they accumulate in `extension_points`.
    pub total_points: Points,
    pub started_at: Option<DateTime<Utc>>,
    pub scheduled_end_at: Option<DateTime<Utc>>,
    pub actual_end_at: Option<DateTime<Utc>>,
    pub extension_minutes: i64,
    pub extension_points: Points,
    pub cast_responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    GroupMatching   ----------------------------------------------------------
/// A one-to-many offer: one guest recruiting several casts at once.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GroupMatching {
    pub id: i64,
    pub guest_id: i64,
    pub chat_room_id: Option<String>,
    pub status: MatchingStatus,
    pub proposed_date: DateTime<Utc>,
    pub proposed_duration_minutes: i64,
    pub proposed_location: String,
    pub requested_cast_count: i64,
    /// Budgeted once at creation: per-cast base-rate points times `requested_cast_count`,
    /// independent of how many casts ultimately accept.
    pub total_points: Points,
    pub started_at: Option<DateTime<Utc>>,
    pub scheduled_end_at: Option<DateTime<Utc>>,
    pub actual_end_at: Option<DateTime<Utc>>,
    pub extension_minutes: i64,
    pub extension_points: Points,
    pub recruiting_ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GroupMatching {
    pub fn is_recruiting(&self) -> bool {
        self.recruiting_ended_at.is_none() && !self.status.is_terminal()
    }
}

//----------------------------------- MatchingParticipant  -----------------------------------------------------------
/// Join row between a group matching and one candidate cast. Unique per (matching_id, cast_id).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MatchingParticipant {
    pub id: i64,
    pub matching_id: i64,
    pub cast_id: i64,
    pub status: ParticipantStatus,
    pub responded_at: Option<DateTime<Utc>>,
    pub joined_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    CastProfile     ----------------------------------------------------------
/// The slice of a cast's profile the engine needs: activity flag for recruiting, birth date for
/// age filters, and the rate card for solo pricing. The id is the externally-issued user id; the
/// profile subsystem owns the rest of the record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CastProfile {
    pub id: i64,
    pub nickname: String,
    pub rank: CastRank,
    pub hourly_rate: Points,
    pub birth_date: NaiveDate,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCastProfile {
    pub id: i64,
    pub nickname: String,
    pub rank: CastRank,
    pub hourly_rate: Points,
    pub birth_date: NaiveDate,
    pub is_active: bool,
}

impl NewCastProfile {
    pub fn new(id: i64, nickname: impl Into<String>, rank: CastRank, birth_date: NaiveDate) -> Self {
        Self { id, nickname: nickname.into(), rank, hourly_rate: rank.hourly_rate(), birth_date, is_active: true }
    }

    pub fn with_hourly_rate(mut self, rate: Points) -> Self {
        self.hourly_rate = rate;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

//--------------------------------------  NewSoloMatching   ----------------------------------------------------------
/// Guest input for a new solo offer, as received from the guest-facing handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSoloMatching {
    pub guest_id: i64,
    pub cast_id: i64,
    pub schedule: ProposedSchedule,
    pub duration_minutes: i64,
    pub location: String,
    pub hourly_rate: Points,
}

impl NewSoloMatching {
    pub fn new(
        guest_id: i64,
        cast_id: i64,
        schedule: ProposedSchedule,
        duration_minutes: i64,
        location: impl Into<String>,
        hourly_rate: Points,
    ) -> Self {
        Self { guest_id, cast_id, schedule, duration_minutes, location: location.into(), hourly_rate }
    }
}

//--------------------------------------  NewGroupMatching  ----------------------------------------------------------
/// Guest input for a new group offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGroupMatching {
    pub guest_id: i64,
    pub requested_cast_count: i64,
    pub schedule: ProposedSchedule,
    pub duration_minutes: i64,
    pub location: String,
    pub age_filter: Option<AgeRange>,
}

impl NewGroupMatching {
    pub fn new(
        guest_id: i64,
        requested_cast_count: i64,
        schedule: ProposedSchedule,
        duration_minutes: i64,
        location: impl Into<String>,
    ) -> Self {
        Self {
            guest_id,
            requested_cast_count,
            schedule,
            duration_minutes,
            location: location.into(),
            age_filter: None,
        }
    }

    pub fn with_age_filter(mut self, range: AgeRange) -> Self {
        self.age_filter = Some(range);
        self
    }
}

//--------------------------------------      Matching      ----------------------------------------------------------
/// A matching of either kind. Lifecycle operations (`start`, `extend`, `complete`, `cancel`)
/// behave identically for both kinds, so they accept a [`MatchingKey`] and hand back this tagged
/// variant; only creation and response have kind-specific shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Matching {
    Solo(SoloMatching),
    Group(GroupMatching),
}

impl Matching {
    pub fn key(&self) -> MatchingKey {
        match self {
            Matching::Solo(m) => MatchingKey::Solo(m.id),
            Matching::Group(m) => MatchingKey::Group(m.id),
        }
    }

    pub fn guest_id(&self) -> i64 {
        match self {
            Matching::Solo(m) => m.guest_id,
            Matching::Group(m) => m.guest_id,
        }
    }

    pub fn status(&self) -> MatchingStatus {
        match self {
            Matching::Solo(m) => m.status,
            Matching::Group(m) => m.status,
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Matching::Solo(m) => m.started_at,
            Matching::Group(m) => m.started_at,
        }
    }

    pub fn scheduled_end_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Matching::Solo(m) => m.scheduled_end_at,
            Matching::Group(m) => m.scheduled_end_at,
        }
    }

    pub fn actual_end_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Matching::Solo(m) => m.actual_end_at,
            Matching::Group(m) => m.actual_end_at,
        }
    }

    pub fn extension_minutes(&self) -> i64 {
        match self {
            Matching::Solo(m) => m.extension_minutes,
            Matching::Group(m) => m.extension_minutes,
        }
    }

    pub fn extension_points(&self) -> Points {
        match self {
            Matching::Solo(m) => m.extension_points,
            Matching::Group(m) => m.extension_points,
        }
    }

    pub fn chat_room_id(&self) -> Option<&str> {
        match self {
            Matching::Solo(m) => m.chat_room_id.as_deref(),
            Matching::Group(m) => m.chat_room_id.as_deref(),
        }
    }

    pub fn as_solo(&self) -> Option<&SoloMatching> {
        match self {
            Matching::Solo(m) => Some(m),
            Matching::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&GroupMatching> {
        match self {
            Matching::Solo(_) => None,
            Matching::Group(m) => Some(m),
        }
    }
}
