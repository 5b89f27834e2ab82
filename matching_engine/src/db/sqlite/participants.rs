use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{CastResponse, GroupMatching, MatchingParticipant, ParticipantStatus},
    matching_objects::{CastParticipation, ParticipantTally},
    MatchingEngineError,
};

/// Fans out one `Pending` participant row per cast in the snapshot. Callers embed this inside
/// the same transaction as the parent insert; a failure here must roll the parent back too.
pub async fn insert_for_casts(
    matching_id: i64,
    cast_ids: &[i64],
    conn: &mut SqliteConnection,
) -> Result<Vec<MatchingParticipant>, MatchingEngineError> {
    let mut rows = Vec::with_capacity(cast_ids.len());
    for cast_id in cast_ids {
        let row: MatchingParticipant = sqlx::query_as(
            "INSERT INTO matching_participants (matching_id, cast_id) VALUES ($1, $2) RETURNING *;",
        )
        .bind(matching_id)
        .bind(cast_id)
        .fetch_one(&mut *conn)
        .await?;
        rows.push(row);
    }
    trace!("🗃️ Fanned out {} participant rows for group matching {matching_id}", rows.len());
    Ok(rows)
}

pub async fn fetch(
    matching_id: i64,
    cast_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<MatchingParticipant>, sqlx::Error> {
    let participant =
        sqlx::query_as("SELECT * FROM matching_participants WHERE matching_id = $1 AND cast_id = $2")
            .bind(matching_id)
            .bind(cast_id)
            .fetch_optional(conn)
            .await?;
    Ok(participant)
}

/// Records one cast's answer on its own participant row if and only if it is still `Pending`.
/// Many casts hit disjoint rows of the same matching concurrently; per-row atomicity is all the
/// coordination there is, and all that is needed.
pub async fn respond(
    matching_id: i64,
    cast_id: i64,
    response: CastResponse,
    conn: &mut SqliteConnection,
) -> Result<Option<MatchingParticipant>, sqlx::Error> {
    let status = response.as_participant_status().to_string();
    sqlx::query_as(
        "UPDATE matching_participants SET status = $1, responded_at = CURRENT_TIMESTAMP, updated_at = \
         CURRENT_TIMESTAMP WHERE matching_id = $2 AND cast_id = $3 AND status = 'Pending' RETURNING *",
    )
    .bind(status)
    .bind(matching_id)
    .bind(cast_id)
    .fetch_optional(conn)
    .await
}

/// Moves an `Accepted` participant to `Joined` when the cast shows up and starts the session.
pub async fn mark_joined(
    matching_id: i64,
    cast_id: i64,
    joined_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<MatchingParticipant>, sqlx::Error> {
    sqlx::query_as(
        "UPDATE matching_participants SET status = 'Joined', joined_at = $1, updated_at = CURRENT_TIMESTAMP \
         WHERE matching_id = $2 AND cast_id = $3 AND status = 'Accepted' RETURNING *",
    )
    .bind(joined_at)
    .bind(matching_id)
    .bind(cast_id)
    .fetch_optional(conn)
    .await
}

/// Session over: every cast who joined is marked `Completed`. Casts that accepted but never
/// joined keep their `Accepted` standing for the guest's records.
pub async fn complete_joined(matching_id: i64, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE matching_participants SET status = 'Completed', updated_at = CURRENT_TIMESTAMP WHERE \
         matching_id = $1 AND status = 'Joined'",
    )
    .bind(matching_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Recruiting closed: whoever has not answered yet is out.
pub async fn reject_pending(matching_id: i64, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE matching_participants SET status = 'Rejected', updated_at = CURRENT_TIMESTAMP WHERE \
         matching_id = $1 AND status = 'Pending'",
    )
    .bind(matching_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Aggregate standing per status for one group offer. This is the only participant view guests
/// ever see.
pub async fn tally(matching_id: i64, conn: &mut SqliteConnection) -> Result<ParticipantTally, MatchingEngineError> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM matching_participants WHERE matching_id = $1 GROUP BY status")
            .bind(matching_id)
            .fetch_all(conn)
            .await?;
    let mut result = ParticipantTally::default();
    for (status, count) in rows {
        match ParticipantStatus::from(status) {
            ParticipantStatus::Pending => result.pending = count,
            ParticipantStatus::Accepted => result.accepted = count,
            ParticipantStatus::Rejected => result.rejected = count,
            ParticipantStatus::Joined => result.joined = count,
            ParticipantStatus::Completed => result.completed = count,
        }
    }
    Ok(result)
}

/// A cast's participant rows in the given standings, paired with their parent offers. Two
/// queries: the rows first, then the parents batched by id.
pub async fn for_cast(
    cast_id: i64,
    statuses: &[ParticipantStatus],
    conn: &mut SqliteConnection,
) -> Result<Vec<CastParticipation>, MatchingEngineError> {
    let status_clause = statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<String>>().join(",");
    let participants: Vec<MatchingParticipant> = sqlx::query_as(
        format!(
            "SELECT * FROM matching_participants WHERE cast_id = $1 AND status IN ({status_clause}) ORDER BY \
             created_at ASC"
        )
        .as_str(),
    )
    .bind(cast_id)
    .fetch_all(&mut *conn)
    .await?;
    if participants.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder = QueryBuilder::new("SELECT * FROM group_matchings WHERE id IN (");
    let mut ids = builder.separated(", ");
    for p in &participants {
        ids.push_bind(p.matching_id);
    }
    builder.push(")");
    let matchings: Vec<GroupMatching> = builder.build_query_as().fetch_all(conn).await?;

    let result = participants
        .into_iter()
        .filter_map(|participant| {
            matchings
                .iter()
                .find(|m| m.id == participant.matching_id)
                .cloned()
                .map(|matching| CastParticipation { participant, matching })
        })
        .collect();
    Ok(result)
}
