use std::fmt::Debug;

use chrono::Utc;
use log::*;
use mmp_common::minimum_hourly_rate;

use crate::{
    db_types::{
        CastProfile,
        CastResponse,
        GroupMatching,
        Matching,
        MatchingKey,
        NewCastProfile,
        NewGroupMatching,
        NewSoloMatching,
        SoloMatching,
    },
    events::{EventProducers, MatchingAcceptedEvent, MatchingCompletedEvent},
    helpers,
    matching_objects::GroupCreationResult,
    traits::{MatchingEngineError, MatchingLifecycleDatabase},
};

/// `MatchingFlowApi` is the primary API for every mutating path through the engine: offer
/// creation, cast responses, and the session state machine. Validation and accounting happen
/// here; persistence and the conditional-update discipline live behind the
/// [`MatchingLifecycleDatabase`] trait.
pub struct MatchingFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for MatchingFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MatchingFlowApi")
    }
}

impl<B> MatchingFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> MatchingFlowApi<B>
where B: MatchingLifecycleDatabase
{
    /// Creates a new solo offer in `Pending` status.
    ///
    /// The schedule must name exactly one of an absolute date or an offset from now, the duration
    /// must lie within the platform band, and the offered rate must not undercut the platform
    /// minimum. `total_points` is fixed here, once, from the duration and rate; extensions are
    /// billed separately and never revisit it.
    pub async fn create_solo_matching(&self, offer: NewSoloMatching) -> Result<SoloMatching, MatchingEngineError> {
        validate_duration(offer.duration_minutes)?;
        if offer.hourly_rate < minimum_hourly_rate() {
            return Err(MatchingEngineError::Validation(format!(
                "The hourly rate must be at least {}",
                minimum_hourly_rate()
            )));
        }
        let proposed_date =
            offer.schedule.resolve(Utc::now()).map_err(|e| MatchingEngineError::Validation(e.to_string()))?;
        let total_points = helpers::points_for(offer.duration_minutes, offer.hourly_rate);
        let matching = self.db.insert_solo_matching(&offer, proposed_date, total_points).await?;
        debug!(
            "🔄️🤝️ Solo offer {} created: guest {} to cast {}, {} minutes for {}",
            matching.id, matching.guest_id, matching.cast_id, matching.proposed_duration_minutes, matching.total_points
        );
        Ok(matching)
    }

    /// Creates a new group offer and fans out one `Pending` invitation per eligible cast.
    ///
    /// The eligible set is snapshotted before the fan-out transaction opens and passed in
    /// explicitly, so the whole operation is deterministic for a given snapshot. An empty
    /// snapshot aborts the creation; no matching row is written. The budget is fixed from the
    /// base rate and the *requested* head count, regardless of how many casts the snapshot
    /// holds or how many eventually accept.
    pub async fn create_group_matching(
        &self,
        offer: NewGroupMatching,
    ) -> Result<GroupCreationResult, MatchingEngineError> {
        if offer.requested_cast_count < 1 {
            return Err(MatchingEngineError::Validation(
                "At least one cast must be requested for a group offer".to_string(),
            ));
        }
        validate_duration(offer.duration_minutes)?;
        let now = Utc::now();
        let proposed_date = offer.schedule.resolve(now).map_err(|e| MatchingEngineError::Validation(e.to_string()))?;
        let eligible: Vec<CastProfile> = self.db.eligible_casts(offer.age_filter.as_ref(), now.date_naive()).await?;
        if eligible.is_empty() {
            debug!("🔄️🤝️ Group offer from guest {} matched no eligible casts; nothing created", offer.guest_id);
            return Err(MatchingEngineError::NoEligibleCasts);
        }
        let total_points = helpers::group_total_points(offer.duration_minutes, offer.requested_cast_count);
        let matching = self.db.insert_group_matching(&offer, proposed_date, total_points, &eligible).await?;
        debug!(
            "🔄️🤝️ Group offer {} created: guest {} requested {} casts, invited {}, budget {}",
            matching.id,
            matching.guest_id,
            matching.requested_cast_count,
            eligible.len(),
            matching.total_points
        );
        Ok(GroupCreationResult { matching, participant_count: eligible.len() })
    }

    /// Applies the cast's accept/reject to a pending solo offer. Exactly-once: a second response,
    /// however it races, fails with an invalid-state error. Acceptance does not start the
    /// session.
    pub async fn respond_to_solo_matching(
        &self,
        matching_id: i64,
        cast_id: i64,
        response: CastResponse,
    ) -> Result<SoloMatching, MatchingEngineError> {
        let matching = self.db.respond_to_solo_matching(matching_id, cast_id, response).await?;
        if response == CastResponse::Accepted {
            self.call_accepted_hook(Matching::Solo(matching.clone()), cast_id).await;
        }
        Ok(matching)
    }

    /// Applies the cast's accept/reject to its own invitation on a group offer. The parent
    /// offer's status is untouched; recruiting stays open until the guest closes it. Returns the
    /// parent matching.
    pub async fn respond_to_group_matching(
        &self,
        matching_id: i64,
        cast_id: i64,
        response: CastResponse,
    ) -> Result<GroupMatching, MatchingEngineError> {
        let matching = self.db.respond_to_group_matching(matching_id, cast_id, response).await?;
        if response == CastResponse::Accepted {
            self.call_accepted_hook(Matching::Group(matching.clone()), cast_id).await;
        }
        Ok(matching)
    }

    /// Starts the session on an accepted offer. Solo: the assigned cast; group: any cast with an
    /// accepted invitation (its row moves to joined, the first one also starts the clock).
    pub async fn start(&self, key: MatchingKey, cast_id: i64) -> Result<Matching, MatchingEngineError> {
        self.db.start_session(key, cast_id, Utc::now()).await
    }

    /// Extends a running session. Only the owning guest may extend; extensions come in
    /// 30-minute blocks, accumulate, and are billed on top of the fixed offer budget.
    pub async fn extend(
        &self,
        key: MatchingKey,
        guest_id: i64,
        extension_minutes: i64,
    ) -> Result<Matching, MatchingEngineError> {
        if extension_minutes <= 0 {
            return Err(MatchingEngineError::Validation(
                "The extension must be a positive number of minutes".to_string(),
            ));
        }
        if extension_minutes % helpers::EXTENSION_STEP_MINUTES != 0 {
            return Err(MatchingEngineError::Validation(format!(
                "The extension must be specified in {}-minute increments",
                helpers::EXTENSION_STEP_MINUTES
            )));
        }
        let matching = self.db.extend_session(key, guest_id, extension_minutes).await?;
        debug!("🔄️⏳️ {key} extended by {extension_minutes} minutes (total {})", matching.extension_minutes());
        Ok(matching)
    }

    /// Ends a running session. Completing twice fails; it never silently succeeds.
    pub async fn complete(&self, key: MatchingKey, cast_id: i64) -> Result<Matching, MatchingEngineError> {
        let matching = self.db.complete_session(key, cast_id, Utc::now()).await?;
        debug!("🔄️🏁️ {key} completed");
        self.call_completed_hook(matching.clone(), cast_id).await;
        Ok(matching)
    }

    /// Withdraws an offer that has not started yet.
    pub async fn cancel(&self, key: MatchingKey, guest_id: i64) -> Result<Matching, MatchingEngineError> {
        self.db.cancel_matching(key, guest_id).await
    }

    /// Records the chat room the chat collaborator created for this matching. Write-once.
    pub async fn assign_chat_room(&self, key: MatchingKey, room_id: &str) -> Result<Matching, MatchingEngineError> {
        self.db.assign_chat_room(key, room_id).await
    }

    /// Closes recruiting on a group offer and rejects the invitations nobody answered.
    /// Recruiting never closes automatically, whatever the acceptance count; this call is the
    /// guest's explicit decision.
    pub async fn close_recruiting(&self, matching_id: i64, guest_id: i64) -> Result<GroupMatching, MatchingEngineError> {
        self.db.close_recruiting(matching_id, guest_id, Utc::now()).await
    }

    /// Admin/test seeding for the cast registry; production profiles are written by the profile
    /// subsystem.
    pub async fn register_cast_profile(&self, profile: NewCastProfile) -> Result<CastProfile, MatchingEngineError> {
        self.db.upsert_cast_profile(&profile).await
    }

    async fn call_accepted_hook(&self, matching: Matching, cast_id: i64) {
        for emitter in &self.producers.matching_accepted_producer {
            debug!("🔄️📬️ Notifying matching-accepted hook subscribers");
            let event = MatchingAcceptedEvent { matching: matching.clone(), cast_id };
            emitter.publish_event(event).await;
        }
    }

    async fn call_completed_hook(&self, matching: Matching, cast_id: i64) {
        for emitter in &self.producers.matching_completed_producer {
            debug!("🔄️📬️ Notifying matching-completed hook subscribers");
            let event = MatchingCompletedEvent { matching: matching.clone(), cast_id };
            emitter.publish_event(event).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

fn validate_duration(duration_minutes: i64) -> Result<(), MatchingEngineError> {
    if !helpers::is_valid_duration(duration_minutes) {
        return Err(MatchingEngineError::Validation(format!(
            "The proposed duration must be between {} and {} minutes",
            helpers::MIN_DURATION_MINUTES,
            helpers::MAX_DURATION_MINUTES
        )));
    }
    Ok(())
}
