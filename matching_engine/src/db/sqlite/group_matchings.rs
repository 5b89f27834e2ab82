use chrono::{DateTime, Utc};
use log::trace;
use mmp_common::Points;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{GroupMatching, NewGroupMatching},
    matching_objects::MatchingQueryFilter,
    MatchingEngineError,
};

/// Inserts a new group offer. This is not atomic on its own; the fan-out caller embeds this call
/// inside a transaction together with the participant inserts and passes `&mut *tx` as the
/// connection argument.
pub async fn insert(
    offer: &NewGroupMatching,
    proposed_date: DateTime<Utc>,
    total_points: Points,
    conn: &mut SqliteConnection,
) -> Result<GroupMatching, MatchingEngineError> {
    let matching = sqlx::query_as(
        r#"
            INSERT INTO group_matchings (
                guest_id,
                proposed_date,
                proposed_duration_minutes,
                proposed_location,
                requested_cast_count,
                total_points
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(offer.guest_id)
    .bind(proposed_date)
    .bind(offer.duration_minutes)
    .bind(&offer.location)
    .bind(offer.requested_cast_count)
    .bind(total_points)
    .fetch_one(conn)
    .await?;
    Ok(matching)
}

pub async fn fetch(id: i64, conn: &mut SqliteConnection) -> Result<Option<GroupMatching>, sqlx::Error> {
    let matching =
        sqlx::query_as("SELECT * FROM group_matchings WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(matching)
}

/// Moves the parent offer to `InProgress` and stamps the session clock, unless it is already
/// running. Individual participant acceptances never drive this; only a joining cast does.
pub async fn start(
    matching_id: i64,
    started_at: DateTime<Utc>,
    scheduled_end_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<GroupMatching>, sqlx::Error> {
    sqlx::query_as(
        "UPDATE group_matchings SET status = 'InProgress', started_at = $1, scheduled_end_at = $2, updated_at = \
         CURRENT_TIMESTAMP WHERE id = $3 AND status IN ('Pending', 'Accepted', 'Meeting') RETURNING *",
    )
    .bind(started_at)
    .bind(scheduled_end_at)
    .bind(matching_id)
    .fetch_optional(conn)
    .await
}

/// Same guarded-accumulate statement as the solo variant; see there for the race story.
pub async fn extend(
    matching_id: i64,
    extension_minutes: i64,
    extension_points: Points,
    new_scheduled_end_at: DateTime<Utc>,
    prior_extension_minutes: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<GroupMatching>, sqlx::Error> {
    sqlx::query_as(
        "UPDATE group_matchings SET extension_minutes = extension_minutes + $1, extension_points = \
         extension_points + $2, scheduled_end_at = $3, updated_at = CURRENT_TIMESTAMP WHERE id = $4 AND status = \
         'InProgress' AND extension_minutes = $5 RETURNING *",
    )
    .bind(extension_minutes)
    .bind(extension_points)
    .bind(new_scheduled_end_at)
    .bind(matching_id)
    .bind(prior_extension_minutes)
    .fetch_optional(conn)
    .await
}

pub async fn complete(
    matching_id: i64,
    actual_end_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<GroupMatching>, sqlx::Error> {
    sqlx::query_as(
        "UPDATE group_matchings SET status = 'Completed', actual_end_at = $1, updated_at = CURRENT_TIMESTAMP \
         WHERE id = $2 AND status = 'InProgress' RETURNING *",
    )
    .bind(actual_end_at)
    .bind(matching_id)
    .fetch_optional(conn)
    .await
}

pub async fn cancel(
    matching_id: i64,
    guest_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<GroupMatching>, sqlx::Error> {
    sqlx::query_as(
        "UPDATE group_matchings SET status = 'Cancelled', updated_at = CURRENT_TIMESTAMP WHERE id = $1 AND \
         guest_id = $2 AND status IN ('Pending', 'Accepted') RETURNING *",
    )
    .bind(matching_id)
    .bind(guest_id)
    .fetch_optional(conn)
    .await
}

pub async fn assign_chat_room(
    matching_id: i64,
    room_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<GroupMatching>, sqlx::Error> {
    sqlx::query_as(
        "UPDATE group_matchings SET chat_room_id = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND \
         chat_room_id IS NULL RETURNING *",
    )
    .bind(room_id)
    .bind(matching_id)
    .fetch_optional(conn)
    .await
}

/// Stamps the end of recruiting exactly once. Rejecting the leftover `Pending` participants is a
/// separate statement the caller runs in the same transaction.
pub async fn close_recruiting(
    matching_id: i64,
    guest_id: i64,
    closed_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<GroupMatching>, sqlx::Error> {
    sqlx::query_as(
        "UPDATE group_matchings SET recruiting_ended_at = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND \
         guest_id = $3 AND recruiting_ended_at IS NULL AND status NOT IN ('Rejected', 'Completed', 'Cancelled') \
         RETURNING *",
    )
    .bind(closed_at)
    .bind(matching_id)
    .bind(guest_id)
    .fetch_optional(conn)
    .await
}

/// Fetches group matchings according to criteria specified in the `MatchingQueryFilter`. A
/// `cast_id` criterion selects offers on which the cast holds a participant row.
pub async fn search(
    query: MatchingQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<GroupMatching>, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        r#"
    SELECT * FROM group_matchings
    "#,
    );
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(guest_id) = query.guest_id {
        where_clause.push("guest_id = ");
        where_clause.push_bind_unseparated(guest_id);
    }
    if let Some(cast_id) = query.cast_id {
        where_clause.push("id IN (SELECT matching_id FROM matching_participants WHERE cast_id = ");
        where_clause.push_bind_unseparated(cast_id);
        where_clause.push_unseparated(")");
    }
    if query.statuses.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let mut statuses = vec![];
        query.statuses.as_ref().unwrap().iter().for_each(|s| {
            statuses.push(format!("'{s}'"));
        });
        let status_clause = statuses.join(",");
        where_clause.push(format!("status IN ({status_clause})"));
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC");

    trace!("🗃️ Executing query: {}", builder.sql());
    let query = builder.build_query_as::<GroupMatching>();
    let matchings = query.fetch_all(conn).await?;
    trace!("🗃️ Result of group search: {} rows", matchings.len());
    Ok(matchings)
}
