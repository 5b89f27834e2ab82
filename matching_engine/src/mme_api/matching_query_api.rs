use std::collections::HashSet;

use crate::{
    db_types::{Matching, MatchingKey, MatchingStatus, ParticipantStatus, SoloMatching},
    matching_objects::{CastParticipation, GroupOfferView, MatchingQueryFilter, ParticipantTally},
    traits::{MatchingEngineError, MatchingQueries, ReviewLookup},
};

/// Role-scoped read models over the matching tables. Everything here is a projection; nothing is
/// separately stored, and nothing mutates.
pub struct MatchingQueryApi<B> {
    db: B,
}

impl<B> MatchingQueryApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> MatchingQueryApi<B>
where B: MatchingQueries
{
    /// Everything the guest still cares about day to day: their solo offers in any status except
    /// `Completed`. Rejected and cancelled offers stay visible to the guest, unlike on the cast
    /// side.
    pub async fn active_solo_offers_for_guest(&self, guest_id: i64) -> Result<Vec<SoloMatching>, MatchingEngineError> {
        let filter = MatchingQueryFilter::default()
            .with_guest_id(guest_id)
            .with_statuses_except(&[MatchingStatus::Completed]);
        self.db.search_solo_matchings(filter).await
    }

    /// The guest's group offers (any status except `Completed`), each with the aggregate
    /// participant tally. Raw participant rows are never handed to guests.
    pub async fn active_group_offers_for_guest(
        &self,
        guest_id: i64,
    ) -> Result<Vec<GroupOfferView>, MatchingEngineError> {
        let filter = MatchingQueryFilter::default()
            .with_guest_id(guest_id)
            .with_statuses_except(&[MatchingStatus::Completed]);
        let matchings = self.db.search_group_matchings(filter).await?;
        let mut views = Vec::with_capacity(matchings.len());
        for matching in matchings {
            let tally = self.db.participant_tally(matching.id).await?;
            views.push(GroupOfferView { matching, tally });
        }
        Ok(views)
    }

    /// The guest's completed matchings that have no review yet. Which matchings are already
    /// reviewed is the review subsystem's knowledge; it is consulted through the [`ReviewLookup`]
    /// seam and subtracted here.
    pub async fn completed_unreviewed_for_guest<R>(
        &self,
        guest_id: i64,
        reviews: &R,
    ) -> Result<Vec<Matching>, MatchingEngineError>
    where
        R: ReviewLookup,
    {
        let reviewed: HashSet<MatchingKey> = reviews.reviewed_keys(guest_id).await?.into_iter().collect();
        let completed = MatchingQueryFilter::default().with_guest_id(guest_id).with_status(MatchingStatus::Completed);
        let solos = self.db.search_solo_matchings(completed.clone()).await?;
        let groups = self.db.search_group_matchings(completed).await?;
        let result = solos
            .into_iter()
            .map(Matching::Solo)
            .chain(groups.into_iter().map(Matching::Group))
            .filter(|m| !reviewed.contains(&m.key()))
            .collect();
        Ok(result)
    }

    /// The solo offers a cast needs to act on. Only `Pending` and `Accepted` appear; stale
    /// rejected or cancelled offers are noise the cast should not see.
    pub async fn active_solo_offers_for_cast(&self, cast_id: i64) -> Result<Vec<SoloMatching>, MatchingEngineError> {
        let filter = MatchingQueryFilter::default()
            .with_cast_id(cast_id)
            .with_status(MatchingStatus::Pending)
            .with_status(MatchingStatus::Accepted);
        self.db.search_solo_matchings(filter).await
    }

    /// The cast's group invitations that are still live: unanswered, accepted, or mid-session.
    pub async fn active_participations_for_cast(
        &self,
        cast_id: i64,
    ) -> Result<Vec<CastParticipation>, MatchingEngineError> {
        self.db
            .participations_for_cast(
                cast_id,
                &[ParticipantStatus::Pending, ParticipantStatus::Accepted, ParticipantStatus::Joined],
            )
            .await
    }

    /// Single-matching lookup by key, for consumers (the review subsystem among them) that need
    /// to verify status and ownership before acting.
    pub async fn matching(&self, key: MatchingKey) -> Result<Matching, MatchingEngineError> {
        self.db.fetch_matching(key).await?.ok_or(MatchingEngineError::MatchingNotFound(key))
    }

    pub async fn participant_tally(&self, matching_id: i64) -> Result<ParticipantTally, MatchingEngineError> {
        self.db.participant_tally(matching_id).await
    }
}
