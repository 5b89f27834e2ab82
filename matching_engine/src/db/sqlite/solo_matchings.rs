use chrono::{DateTime, Utc};
use log::trace;
use mmp_common::Points;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{CastResponse, NewSoloMatching, SoloMatching},
    matching_objects::MatchingQueryFilter,
    MatchingEngineError,
};

pub async fn insert(
    offer: &NewSoloMatching,
    proposed_date: DateTime<Utc>,
    total_points: Points,
    conn: &mut SqliteConnection,
) -> Result<SoloMatching, MatchingEngineError> {
    let matching = sqlx::query_as(
        r#"
            INSERT INTO solo_matchings (
                guest_id,
                cast_id,
                proposed_date,
                proposed_duration_minutes,
                proposed_location,
                hourly_rate,
                total_points
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(offer.guest_id)
    .bind(offer.cast_id)
    .bind(proposed_date)
    .bind(offer.duration_minutes)
    .bind(&offer.location)
    .bind(offer.hourly_rate)
    .bind(total_points)
    .fetch_one(conn)
    .await?;
    Ok(matching)
}

pub async fn fetch(id: i64, conn: &mut SqliteConnection) -> Result<Option<SoloMatching>, sqlx::Error> {
    let matching =
        sqlx::query_as("SELECT * FROM solo_matchings WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(matching)
}

/// Records the cast's answer if and only if the offer is still `Pending`. The status check and
/// the write are one statement, so a double submit can never apply two transitions; the loser
/// sees `None`.
pub async fn respond(
    matching_id: i64,
    cast_id: i64,
    response: CastResponse,
    conn: &mut SqliteConnection,
) -> Result<Option<SoloMatching>, sqlx::Error> {
    let status = response.as_matching_status().to_string();
    sqlx::query_as(
        "UPDATE solo_matchings SET status = $1, cast_responded_at = CURRENT_TIMESTAMP, updated_at = \
         CURRENT_TIMESTAMP WHERE id = $2 AND cast_id = $3 AND status = 'Pending' RETURNING *",
    )
    .bind(status)
    .bind(matching_id)
    .bind(cast_id)
    .fetch_optional(conn)
    .await
}

/// Moves an `Accepted` (or `Meeting`) offer into `InProgress` and stamps the session clock.
/// `scheduled_end_at` is computed by the caller from the row it just read; the guarded status
/// keeps a racing second start out.
pub async fn start(
    matching_id: i64,
    cast_id: i64,
    started_at: DateTime<Utc>,
    scheduled_end_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<SoloMatching>, sqlx::Error> {
    sqlx::query_as(
        "UPDATE solo_matchings SET status = 'InProgress', started_at = $1, scheduled_end_at = $2, updated_at = \
         CURRENT_TIMESTAMP WHERE id = $3 AND cast_id = $4 AND status IN ('Accepted', 'Meeting') RETURNING *",
    )
    .bind(started_at)
    .bind(scheduled_end_at)
    .bind(matching_id)
    .bind(cast_id)
    .fetch_optional(conn)
    .await
}

/// Accumulates an extension. Guarded by the status *and* the extension counter the caller read,
/// so two racing extension requests serialize: the loser's counter no longer matches and it gets
/// `None` back.
pub async fn extend(
    matching_id: i64,
    extension_minutes: i64,
    extension_points: Points,
    new_scheduled_end_at: DateTime<Utc>,
    prior_extension_minutes: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<SoloMatching>, sqlx::Error> {
    sqlx::query_as(
        "UPDATE solo_matchings SET extension_minutes = extension_minutes + $1, extension_points = \
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
    cast_id: i64,
    actual_end_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<SoloMatching>, sqlx::Error> {
    sqlx::query_as(
        "UPDATE solo_matchings SET status = 'Completed', actual_end_at = $1, updated_at = CURRENT_TIMESTAMP \
         WHERE id = $2 AND cast_id = $3 AND status = 'InProgress' RETURNING *",
    )
    .bind(actual_end_at)
    .bind(matching_id)
    .bind(cast_id)
    .fetch_optional(conn)
    .await
}

pub async fn cancel(
    matching_id: i64,
    guest_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<SoloMatching>, sqlx::Error> {
    sqlx::query_as(
        "UPDATE solo_matchings SET status = 'Cancelled', updated_at = CURRENT_TIMESTAMP WHERE id = $1 AND \
         guest_id = $2 AND status IN ('Pending', 'Accepted') RETURNING *",
    )
    .bind(matching_id)
    .bind(guest_id)
    .fetch_optional(conn)
    .await
}

/// The room id is opaque to the engine and can be written exactly once.
pub async fn assign_chat_room(
    matching_id: i64,
    room_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<SoloMatching>, sqlx::Error> {
    sqlx::query_as(
        "UPDATE solo_matchings SET chat_room_id = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND \
         chat_room_id IS NULL RETURNING *",
    )
    .bind(room_id)
    .bind(matching_id)
    .fetch_optional(conn)
    .await
}

/// Fetches solo matchings according to criteria specified in the `MatchingQueryFilter`.
///
/// Resulting matchings are ordered by `created_at` in ascending order.
pub async fn search(
    query: MatchingQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<SoloMatching>, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        r#"
    SELECT * FROM solo_matchings
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
        where_clause.push("cast_id = ");
        where_clause.push_bind_unseparated(cast_id);
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
    let query = builder.build_query_as::<SoloMatching>();
    let matchings = query.fetch_all(conn).await?;
    trace!("🗃️ Result of solo search: {} rows", matchings.len());
    Ok(matchings)
}
