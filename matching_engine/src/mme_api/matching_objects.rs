use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{GroupMatching, MatchingParticipant, MatchingStatus},
    MatchingEngineError,
};

//----------------------------------- MatchingQueryFilter  -----------------------------------------------------------
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchingQueryFilter {
    pub guest_id: Option<i64>,
    pub cast_id: Option<i64>,
    pub statuses: Option<Vec<MatchingStatus>>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl MatchingQueryFilter {
    pub fn with_guest_id(mut self, guest_id: i64) -> Self {
        self.guest_id = Some(guest_id);
        self
    }

    pub fn with_cast_id(mut self, cast_id: i64) -> Self {
        self.cast_id = Some(cast_id);
        self
    }

    pub fn with_status(mut self, status: MatchingStatus) -> Self {
        self.statuses.get_or_insert_with(Vec::new).push(status);
        self
    }

    /// Every status except the given ones. Convenience for "active" views that subtract the
    /// terminal noise.
    pub fn with_statuses_except(mut self, excluded: &[MatchingStatus]) -> Self {
        let all = [
            MatchingStatus::Pending,
            MatchingStatus::Accepted,
            MatchingStatus::Rejected,
            MatchingStatus::Meeting,
            MatchingStatus::InProgress,
            MatchingStatus::Completed,
            MatchingStatus::Cancelled,
        ];
        let kept = all.into_iter().filter(|s| !excluded.contains(s)).collect();
        self.statuses = Some(kept);
        self
    }

    pub fn since<T>(mut self, since: T) -> Result<Self, MatchingEngineError>
    where
        T: TryInto<DateTime<Utc>>,
        T::Error: Display,
    {
        let dt = since.try_into().map_err(|e| MatchingEngineError::Validation(e.to_string()))?;
        self.since = Some(dt);
        Ok(self)
    }

    pub fn until<T>(mut self, until: T) -> Result<Self, MatchingEngineError>
    where
        T: TryInto<DateTime<Utc>>,
        T::Error: Display,
    {
        let dt = until.try_into().map_err(|e| MatchingEngineError::Validation(e.to_string()))?;
        self.until = Some(dt);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.guest_id.is_none() &&
            self.cast_id.is_none() &&
            self.statuses.is_none() &&
            self.since.is_none() &&
            self.until.is_none()
    }
}

impl Display for MatchingQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "No filters.")?;
            return Ok(());
        }
        if let Some(guest_id) = self.guest_id {
            write!(f, "guest_id: {guest_id}. ")?;
        }
        if let Some(cast_id) = self.cast_id {
            write!(f, "cast_id: {cast_id}. ")?;
        }
        if let Some(statuses) = &self.statuses {
            let statuses = statuses.iter().map(|s| s.to_string()).collect::<Vec<String>>().join(",");
            write!(f, "statuses: [{statuses}]. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until {until}. ")?;
        }
        Ok(())
    }
}

//------------------------------------ ParticipantTally  -------------------------------------------------------------
/// Aggregate participant standing on one group offer. The guest-facing views carry these counts
/// instead of raw participant rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantTally {
    pub pending: i64,
    pub accepted: i64,
    pub rejected: i64,
    pub joined: i64,
    pub completed: i64,
}

impl ParticipantTally {
    pub fn total(&self) -> i64 {
        self.pending + self.accepted + self.rejected + self.joined + self.completed
    }
}

//------------------------------------ CastParticipation -------------------------------------------------------------
/// One entry of a cast's group dashboard: its own standing plus the parent offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastParticipation {
    pub participant: MatchingParticipant,
    pub matching: GroupMatching,
}

//------------------------------------- GroupOfferView  --------------------------------------------------------------
/// A group offer as the owning guest sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupOfferView {
    pub matching: GroupMatching,
    pub tally: ParticipantTally,
}

//----------------------------------- GroupCreationResult ------------------------------------------------------------
/// What the guest-facing handler gets back from creating a group offer. `participant_count` is
/// the eligible-cast count at creation time and may differ from the requested head count; the
/// caller decides how to message that to the guest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupCreationResult {
    pub matching: GroupMatching,
    pub participant_count: usize,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn filter_builder_collects_statuses() {
        let filter = MatchingQueryFilter::default()
            .with_guest_id(7)
            .with_status(MatchingStatus::Pending)
            .with_status(MatchingStatus::Accepted);
        assert_eq!(filter.guest_id, Some(7));
        assert_eq!(filter.statuses.as_ref().unwrap().len(), 2);
        assert!(!filter.is_empty());
    }

    #[test]
    fn statuses_except_subtracts() {
        let filter = MatchingQueryFilter::default().with_statuses_except(&[MatchingStatus::Completed]);
        let statuses = filter.statuses.unwrap();
        assert_eq!(statuses.len(), 6);
        assert!(!statuses.contains(&MatchingStatus::Completed));
    }

    #[test]
    fn empty_filter_displays_as_such() {
        assert_eq!(MatchingQueryFilter::default().to_string(), "No filters.");
    }

    #[test]
    fn tally_totals() {
        let tally = ParticipantTally { pending: 2, accepted: 3, rejected: 1, joined: 0, completed: 0 };
        assert_eq!(tally.total(), 6);
    }

    #[test]
    fn tally_serializes_for_the_dashboard() {
        let tally = ParticipantTally { pending: 1, accepted: 2, rejected: 0, joined: 1, completed: 0 };
        let json = serde_json::to_value(tally).unwrap();
        assert_eq!(json["accepted"], 2);
        assert_eq!(json["joined"], 1);
    }
}
