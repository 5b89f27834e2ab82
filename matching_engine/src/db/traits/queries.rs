use crate::db_types::{CastProfile, GroupMatching, Matching, MatchingKey, MatchingParticipant, ParticipantStatus, SoloMatching};
use crate::matching_objects::{CastParticipation, MatchingQueryFilter, ParticipantTally};

use super::matching_database::MatchingEngineError;

/// Read-only access to matchings and participants. Everything here is a projection over the
/// entity tables; nothing is separately stored.
#[allow(async_fn_in_trait)]
pub trait MatchingQueries {
    async fn fetch_solo_matching(&self, id: i64) -> Result<Option<SoloMatching>, MatchingEngineError>;

    async fn fetch_group_matching(&self, id: i64) -> Result<Option<GroupMatching>, MatchingEngineError>;

    async fn fetch_matching(&self, key: MatchingKey) -> Result<Option<Matching>, MatchingEngineError> {
        match key {
            MatchingKey::Solo(id) => Ok(self.fetch_solo_matching(id).await?.map(Matching::Solo)),
            MatchingKey::Group(id) => Ok(self.fetch_group_matching(id).await?.map(Matching::Group)),
        }
    }

    async fn fetch_participant(
        &self,
        matching_id: i64,
        cast_id: i64,
    ) -> Result<Option<MatchingParticipant>, MatchingEngineError>;

    async fn fetch_cast_profile(&self, cast_id: i64) -> Result<Option<CastProfile>, MatchingEngineError>;

    /// Fetches solo matchings according to the criteria in the filter, ordered by `created_at`
    /// ascending.
    async fn search_solo_matchings(&self, query: MatchingQueryFilter) -> Result<Vec<SoloMatching>, MatchingEngineError>;

    /// Fetches group matchings according to the criteria in the filter. A `cast_id` criterion
    /// matches offers where the cast holds a participant row.
    async fn search_group_matchings(
        &self,
        query: MatchingQueryFilter,
    ) -> Result<Vec<GroupMatching>, MatchingEngineError>;

    /// Aggregate participant standing for one group offer. Guests see these counts, never the
    /// raw participant rows.
    async fn participant_tally(&self, matching_id: i64) -> Result<ParticipantTally, MatchingEngineError>;

    /// A cast's participant rows (restricted to the given standings) together with their parent
    /// offers.
    async fn participations_for_cast(
        &self,
        cast_id: i64,
        statuses: &[ParticipantStatus],
    ) -> Result<Vec<CastParticipation>, MatchingEngineError>;
}
