use std::fmt::Debug;

use chrono::{DateTime, NaiveDate, Utc};
use log::*;
use mmp_common::Points;
use sqlx::{SqliteConnection, SqlitePool};

use super::{casts, db_url, group_matchings, new_pool, participants, solo_matchings};
use crate::{
    db_types::{
        AgeRange,
        CastProfile,
        CastResponse,
        GroupMatching,
        Matching,
        MatchingKey,
        MatchingParticipant,
        MatchingStatus,
        NewCastProfile,
        NewGroupMatching,
        NewSoloMatching,
        ParticipantStatus,
        SoloMatching,
    },
    helpers,
    matching_objects::{CastParticipation, MatchingQueryFilter, ParticipantTally},
    traits::{MatchingEngineError, MatchingLifecycleDatabase, MatchingQueries},
};

/// How often the group fan-out transaction is attempted before a busy storage engine is reported
/// to the caller.
const MAX_FANOUT_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL from the environment.
    pub async fn new(max_connections: u32) -> Result<Self, MatchingEngineError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, MatchingEngineError> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn try_insert_group_matching(
        &self,
        offer: &NewGroupMatching,
        proposed_date: DateTime<Utc>,
        total_points: Points,
        cast_ids: &[i64],
    ) -> Result<GroupMatching, MatchingEngineError> {
        let mut tx = self.pool.begin().await?;
        let matching = group_matchings::insert(offer, proposed_date, total_points, &mut tx).await?;
        participants::insert_for_casts(matching.id, cast_ids, &mut tx).await?;
        tx.commit().await?;
        Ok(matching)
    }
}

impl MatchingLifecycleDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_solo_matching(
        &self,
        offer: &NewSoloMatching,
        proposed_date: DateTime<Utc>,
        total_points: Points,
    ) -> Result<SoloMatching, MatchingEngineError> {
        let mut conn = self.pool.acquire().await?;
        let matching = solo_matchings::insert(offer, proposed_date, total_points, &mut conn).await?;
        debug!("🗃️ Solo offer saved as {} for guest {} and cast {}", matching.id, matching.guest_id, matching.cast_id);
        Ok(matching)
    }

    async fn eligible_casts(
        &self,
        filter: Option<&AgeRange>,
        today: NaiveDate,
    ) -> Result<Vec<CastProfile>, MatchingEngineError> {
        let mut conn = self.pool.acquire().await?;
        casts::eligible_casts(filter, today, &mut conn).await
    }

    /// The fan-out runs snapshot-then-insert: the eligible set was taken by the caller and is
    /// passed in verbatim, and the matching insert plus all participant inserts commit or roll
    /// back as one. Only a busy/locked storage engine is retried, and always the whole
    /// transaction.
    async fn insert_group_matching(
        &self,
        offer: &NewGroupMatching,
        proposed_date: DateTime<Utc>,
        total_points: Points,
        eligible: &[CastProfile],
    ) -> Result<GroupMatching, MatchingEngineError> {
        let cast_ids: Vec<i64> = eligible.iter().map(|c| c.id).collect();
        let mut attempt = 1;
        loop {
            match self.try_insert_group_matching(offer, proposed_date, total_points, &cast_ids).await {
                Ok(matching) => {
                    debug!(
                        "🗃️ Group offer saved as {} for guest {} with {} candidate casts",
                        matching.id,
                        matching.guest_id,
                        cast_ids.len()
                    );
                    return Ok(matching);
                },
                Err(e) if is_transient(&e) && attempt < MAX_FANOUT_ATTEMPTS => {
                    warn!("🗃️ Group offer fan-out hit a transient failure (attempt {attempt}): {e}. Retrying.");
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn respond_to_solo_matching(
        &self,
        matching_id: i64,
        cast_id: i64,
        response: CastResponse,
    ) -> Result<SoloMatching, MatchingEngineError> {
        let mut conn = self.pool.acquire().await?;
        match solo_matchings::respond(matching_id, cast_id, response, &mut conn).await? {
            Some(matching) => {
                debug!("🗃️ Cast {cast_id} responded {response} to solo offer {matching_id}");
                Ok(matching)
            },
            None => {
                Err(classify_solo_failure(
                    matching_id,
                    Some(cast_id),
                    None,
                    "The offer has already been responded to",
                    &mut conn,
                )
                .await)
            },
        }
    }

    async fn respond_to_group_matching(
        &self,
        matching_id: i64,
        cast_id: i64,
        response: CastResponse,
    ) -> Result<GroupMatching, MatchingEngineError> {
        let mut conn = self.pool.acquire().await?;
        match participants::respond(matching_id, cast_id, response, &mut conn).await? {
            Some(_) => {
                debug!("🗃️ Cast {cast_id} responded {response} on group offer {matching_id}");
                let parent = group_matchings::fetch(matching_id, &mut conn)
                    .await?
                    .ok_or(MatchingEngineError::MatchingNotFound(MatchingKey::Group(matching_id)))?;
                Ok(parent)
            },
            None => Err(classify_participant_failure(
                matching_id,
                cast_id,
                "The invitation has already been responded to",
                &mut conn,
            )
            .await),
        }
    }

    async fn start_session(
        &self,
        key: MatchingKey,
        cast_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Matching, MatchingEngineError> {
        match key {
            MatchingKey::Solo(id) => {
                let mut conn = self.pool.acquire().await?;
                let current = solo_matchings::fetch(id, &mut conn)
                    .await?
                    .ok_or(MatchingEngineError::MatchingNotFound(key))?;
                if current.cast_id != cast_id {
                    return Err(MatchingEngineError::Forbidden(format!(
                        "Cast {cast_id} is not assigned to matching {key}"
                    )));
                }
                let scheduled_end =
                    now + chrono::Duration::minutes(current.proposed_duration_minutes + current.extension_minutes);
                match solo_matchings::start(id, cast_id, now, scheduled_end, &mut conn).await? {
                    Some(m) => {
                        debug!("🗃️ Session started on {key}; scheduled to end at {scheduled_end}");
                        Ok(Matching::Solo(m))
                    },
                    None => Err(classify_solo_failure(
                        id,
                        Some(cast_id),
                        None,
                        "The session can only be started once the offer is accepted",
                        &mut conn,
                    )
                    .await),
                }
            },
            MatchingKey::Group(id) => {
                let mut tx = self.pool.begin().await?;
                let joined = participants::mark_joined(id, cast_id, now, &mut tx).await?;
                if joined.is_none() {
                    let err = classify_participant_failure(
                        id,
                        cast_id,
                        "Only a cast with an accepted invitation can join the session",
                        &mut tx,
                    )
                    .await;
                    return Err(err);
                }
                let current = group_matchings::fetch(id, &mut tx)
                    .await?
                    .ok_or(MatchingEngineError::MatchingNotFound(key))?;
                let parent = if current.status.is_terminal() {
                    return Err(MatchingEngineError::InvalidState(format!(
                        "The session cannot be joined any more (status: {})",
                        current.status
                    )));
                } else if current.started_at.is_some() {
                    // Another participant already started the clock; this cast just joins.
                    current
                } else {
                    let scheduled_end = now
                        + chrono::Duration::minutes(current.proposed_duration_minutes + current.extension_minutes);
                    match group_matchings::start(id, now, scheduled_end, &mut tx).await? {
                        Some(m) => m,
                        None => {
                            // Lost a benign race: another participant started the clock between
                            // our read and our guarded write.
                            let refreshed = group_matchings::fetch(id, &mut tx)
                                .await?
                                .ok_or(MatchingEngineError::MatchingNotFound(key))?;
                            if refreshed.status == MatchingStatus::InProgress {
                                refreshed
                            } else {
                                return Err(MatchingEngineError::InvalidState(format!(
                                    "The session cannot be started from status {}",
                                    refreshed.status
                                )));
                            }
                        },
                    }
                };
                tx.commit().await?;
                debug!("🗃️ Cast {cast_id} joined the session on {key}");
                Ok(Matching::Group(parent))
            },
        }
    }

    async fn extend_session(
        &self,
        key: MatchingKey,
        guest_id: i64,
        extension_minutes: i64,
    ) -> Result<Matching, MatchingEngineError> {
        match key {
            MatchingKey::Solo(id) => {
                let mut conn = self.pool.acquire().await?;
                let current = solo_matchings::fetch(id, &mut conn)
                    .await?
                    .ok_or(MatchingEngineError::MatchingNotFound(key))?;
                check_extendable(guest_id, current.guest_id, current.started_at, key)?;
                let end = current.scheduled_end_at.ok_or_else(|| {
                    MatchingEngineError::InvalidState("The session has not started yet".to_string())
                })?;
                let points = helpers::points_for(extension_minutes, current.hourly_rate);
                let new_end = end + chrono::Duration::minutes(extension_minutes);
                match solo_matchings::extend(
                    id,
                    extension_minutes,
                    points,
                    new_end,
                    current.extension_minutes,
                    &mut conn,
                )
                .await?
                {
                    Some(m) => {
                        debug!("🗃️ {key} extended by {extension_minutes} minutes for {points}");
                        Ok(Matching::Solo(m))
                    },
                    None => Err(classify_solo_failure(
                        id,
                        None,
                        Some(guest_id),
                        "The session can only be extended while it is in progress",
                        &mut conn,
                    )
                    .await),
                }
            },
            MatchingKey::Group(id) => {
                let mut conn = self.pool.acquire().await?;
                let current = group_matchings::fetch(id, &mut conn)
                    .await?
                    .ok_or(MatchingEngineError::MatchingNotFound(key))?;
                check_extendable(guest_id, current.guest_id, current.started_at, key)?;
                let end = current.scheduled_end_at.ok_or_else(|| {
                    MatchingEngineError::InvalidState("The session has not started yet".to_string())
                })?;
                let points = helpers::group_extension_points(extension_minutes, current.requested_cast_count);
                let new_end = end + chrono::Duration::minutes(extension_minutes);
                match group_matchings::extend(
                    id,
                    extension_minutes,
                    points,
                    new_end,
                    current.extension_minutes,
                    &mut conn,
                )
                .await?
                {
                    Some(m) => {
                        debug!("🗃️ {key} extended by {extension_minutes} minutes for {points}");
                        Ok(Matching::Group(m))
                    },
                    None => Err(classify_group_failure(
                        id,
                        Some(guest_id),
                        "The session can only be extended while it is in progress",
                        &mut conn,
                    )
                    .await),
                }
            },
        }
    }

    async fn complete_session(
        &self,
        key: MatchingKey,
        cast_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Matching, MatchingEngineError> {
        match key {
            MatchingKey::Solo(id) => {
                let mut conn = self.pool.acquire().await?;
                match solo_matchings::complete(id, cast_id, now, &mut conn).await? {
                    Some(m) => {
                        debug!("🗃️ Session on {key} completed at {now}");
                        Ok(Matching::Solo(m))
                    },
                    None => Err(classify_solo_failure(
                        id,
                        Some(cast_id),
                        None,
                        "The session can only be completed while it is in progress",
                        &mut conn,
                    )
                    .await),
                }
            },
            MatchingKey::Group(id) => {
                let mut tx = self.pool.begin().await?;
                match participants::fetch(id, cast_id, &mut tx).await? {
                    None => {
                        let err = match group_matchings::fetch(id, &mut tx).await? {
                            Some(_) => MatchingEngineError::ParticipantNotFound { matching_id: id, cast_id },
                            None => MatchingEngineError::MatchingNotFound(key),
                        };
                        return Err(err);
                    },
                    Some(p) if p.status != ParticipantStatus::Joined => {
                        return Err(MatchingEngineError::InvalidState(format!(
                            "Only a cast who joined the session can complete it (participant status: {})",
                            p.status
                        )));
                    },
                    Some(_) => {},
                }
                let completed = match group_matchings::complete(id, now, &mut tx).await? {
                    Some(m) => m,
                    None => {
                        let err =
                            classify_group_failure(id, None, "The session can only be completed while it is in progress", &mut tx)
                                .await;
                        return Err(err);
                    },
                };
                participants::complete_joined(id, &mut tx).await?;
                tx.commit().await?;
                debug!("🗃️ Session on {key} completed at {now}");
                Ok(Matching::Group(completed))
            },
        }
    }

    async fn cancel_matching(&self, key: MatchingKey, guest_id: i64) -> Result<Matching, MatchingEngineError> {
        let mut conn = self.pool.acquire().await?;
        match key {
            MatchingKey::Solo(id) => match solo_matchings::cancel(id, guest_id, &mut conn).await? {
                Some(m) => {
                    debug!("🗃️ {key} cancelled by guest {guest_id}");
                    Ok(Matching::Solo(m))
                },
                None => Err(classify_solo_failure(
                    id,
                    None,
                    Some(guest_id),
                    "Only an offer that has not started can be cancelled",
                    &mut conn,
                )
                .await),
            },
            MatchingKey::Group(id) => match group_matchings::cancel(id, guest_id, &mut conn).await? {
                Some(m) => {
                    debug!("🗃️ {key} cancelled by guest {guest_id}");
                    Ok(Matching::Group(m))
                },
                None => Err(classify_group_failure(
                    id,
                    Some(guest_id),
                    "Only an offer that has not started can be cancelled",
                    &mut conn,
                )
                .await),
            },
        }
    }

    async fn assign_chat_room(&self, key: MatchingKey, room_id: &str) -> Result<Matching, MatchingEngineError> {
        let mut conn = self.pool.acquire().await?;
        match key {
            MatchingKey::Solo(id) => match solo_matchings::assign_chat_room(id, room_id, &mut conn).await? {
                Some(m) => Ok(Matching::Solo(m)),
                None => Err(classify_solo_failure(id, None, None, "A chat room is already assigned", &mut conn).await),
            },
            MatchingKey::Group(id) => match group_matchings::assign_chat_room(id, room_id, &mut conn).await? {
                Some(m) => Ok(Matching::Group(m)),
                None => Err(classify_group_failure(id, None, "A chat room is already assigned", &mut conn).await),
            },
        }
    }

    async fn close_recruiting(
        &self,
        matching_id: i64,
        guest_id: i64,
        now: DateTime<Utc>,
    ) -> Result<GroupMatching, MatchingEngineError> {
        let mut tx = self.pool.begin().await?;
        match group_matchings::close_recruiting(matching_id, guest_id, now, &mut tx).await? {
            Some(matching) => {
                let rejected = participants::reject_pending(matching_id, &mut tx).await?;
                tx.commit().await?;
                debug!("🗃️ Recruiting closed on group/{matching_id}; {rejected} pending invitations rejected");
                Ok(matching)
            },
            None => {
                let err = classify_group_failure(
                    matching_id,
                    Some(guest_id),
                    "Recruiting is already closed or the offer is finished",
                    &mut tx,
                )
                .await;
                Err(err)
            },
        }
    }

    async fn upsert_cast_profile(&self, profile: &NewCastProfile) -> Result<CastProfile, MatchingEngineError> {
        let mut conn = self.pool.acquire().await?;
        casts::upsert(profile, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), MatchingEngineError> {
        self.pool.close().await;
        Ok(())
    }
}

impl MatchingQueries for SqliteDatabase {
    async fn fetch_solo_matching(&self, id: i64) -> Result<Option<SoloMatching>, MatchingEngineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(solo_matchings::fetch(id, &mut conn).await?)
    }

    async fn fetch_group_matching(&self, id: i64) -> Result<Option<GroupMatching>, MatchingEngineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(group_matchings::fetch(id, &mut conn).await?)
    }

    async fn fetch_participant(
        &self,
        matching_id: i64,
        cast_id: i64,
    ) -> Result<Option<MatchingParticipant>, MatchingEngineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(participants::fetch(matching_id, cast_id, &mut conn).await?)
    }

    async fn fetch_cast_profile(&self, cast_id: i64) -> Result<Option<CastProfile>, MatchingEngineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(casts::fetch(cast_id, &mut conn).await?)
    }

    async fn search_solo_matchings(
        &self,
        query: MatchingQueryFilter,
    ) -> Result<Vec<SoloMatching>, MatchingEngineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(solo_matchings::search(query, &mut conn).await?)
    }

    async fn search_group_matchings(
        &self,
        query: MatchingQueryFilter,
    ) -> Result<Vec<GroupMatching>, MatchingEngineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(group_matchings::search(query, &mut conn).await?)
    }

    async fn participant_tally(&self, matching_id: i64) -> Result<ParticipantTally, MatchingEngineError> {
        let mut conn = self.pool.acquire().await?;
        participants::tally(matching_id, &mut conn).await
    }

    async fn participations_for_cast(
        &self,
        cast_id: i64,
        statuses: &[ParticipantStatus],
    ) -> Result<Vec<CastParticipation>, MatchingEngineError> {
        let mut conn = self.pool.acquire().await?;
        participants::for_cast(cast_id, statuses, &mut conn).await
    }
}

/// Shared precondition checks for extensions: only the owning guest, and only once the session
/// clock is running.
fn check_extendable(
    caller: i64,
    owner: i64,
    started_at: Option<DateTime<Utc>>,
    key: MatchingKey,
) -> Result<(), MatchingEngineError> {
    if owner != caller {
        return Err(MatchingEngineError::Forbidden(format!("Guest {caller} does not own matching {key}")));
    }
    if started_at.is_none() {
        return Err(MatchingEngineError::InvalidState("The session has not started yet".to_string()));
    }
    Ok(())
}

/// A conditional update on a solo matching affected zero rows; work out which error the caller
/// deserves. The guarded write stays the gate, this read only picks the message.
async fn classify_solo_failure(
    matching_id: i64,
    cast_id: Option<i64>,
    guest_id: Option<i64>,
    state_msg: &str,
    conn: &mut SqliteConnection,
) -> MatchingEngineError {
    match solo_matchings::fetch(matching_id, conn).await {
        Ok(None) => MatchingEngineError::MatchingNotFound(MatchingKey::Solo(matching_id)),
        Ok(Some(m)) => {
            if let Some(cast) = cast_id {
                if m.cast_id != cast {
                    return MatchingEngineError::Forbidden(format!(
                        "Cast {cast} is not assigned to matching solo/{matching_id}"
                    ));
                }
            }
            if let Some(guest) = guest_id {
                if m.guest_id != guest {
                    return MatchingEngineError::Forbidden(format!(
                        "Guest {guest} does not own matching solo/{matching_id}"
                    ));
                }
            }
            MatchingEngineError::InvalidState(format!("{state_msg} (status: {})", m.status))
        },
        Err(e) => e.into(),
    }
}

async fn classify_group_failure(
    matching_id: i64,
    guest_id: Option<i64>,
    state_msg: &str,
    conn: &mut SqliteConnection,
) -> MatchingEngineError {
    match group_matchings::fetch(matching_id, conn).await {
        Ok(None) => MatchingEngineError::MatchingNotFound(MatchingKey::Group(matching_id)),
        Ok(Some(m)) => {
            if let Some(guest) = guest_id {
                if m.guest_id != guest {
                    return MatchingEngineError::Forbidden(format!(
                        "Guest {guest} does not own matching group/{matching_id}"
                    ));
                }
            }
            MatchingEngineError::InvalidState(format!("{state_msg} (status: {})", m.status))
        },
        Err(e) => e.into(),
    }
}

async fn classify_participant_failure(
    matching_id: i64,
    cast_id: i64,
    state_msg: &str,
    conn: &mut SqliteConnection,
) -> MatchingEngineError {
    match participants::fetch(matching_id, cast_id, &mut *conn).await {
        Ok(Some(p)) => MatchingEngineError::InvalidState(format!("{state_msg} (participant status: {})", p.status)),
        Ok(None) => match group_matchings::fetch(matching_id, conn).await {
            Ok(Some(_)) => MatchingEngineError::ParticipantNotFound { matching_id, cast_id },
            Ok(None) => MatchingEngineError::MatchingNotFound(MatchingKey::Group(matching_id)),
            Err(e) => e.into(),
        },
        Err(e) => e.into(),
    }
}

fn is_transient(e: &MatchingEngineError) -> bool {
    match e {
        MatchingEngineError::DatabaseError(msg) => {
            let msg = msg.to_ascii_lowercase();
            msg.contains("database is locked") || msg.contains("database table is locked") || msg.contains("busy")
        },
        _ => false,
    }
}
