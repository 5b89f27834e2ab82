use chrono::NaiveDate;
use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{AgeRange, CastProfile, NewCastProfile},
    helpers::birth_date_window,
    MatchingEngineError,
};

/// Creates or refreshes the cast profile row for an externally-issued user id.
pub async fn upsert(profile: &NewCastProfile, conn: &mut SqliteConnection) -> Result<CastProfile, MatchingEngineError> {
    let cast = sqlx::query_as(
        r#"
            INSERT INTO casts (id, nickname, rank, hourly_rate, birth_date, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                nickname = excluded.nickname,
                rank = excluded.rank,
                hourly_rate = excluded.hourly_rate,
                birth_date = excluded.birth_date,
                is_active = excluded.is_active,
                updated_at = CURRENT_TIMESTAMP
            RETURNING *;
        "#,
    )
    .bind(profile.id)
    .bind(&profile.nickname)
    .bind(profile.rank)
    .bind(profile.hourly_rate)
    .bind(profile.birth_date)
    .bind(profile.is_active)
    .fetch_one(conn)
    .await?;
    Ok(cast)
}

pub async fn fetch(cast_id: i64, conn: &mut SqliteConnection) -> Result<Option<CastProfile>, sqlx::Error> {
    let cast = sqlx::query_as("SELECT * FROM casts WHERE id = $1").bind(cast_id).fetch_optional(conn).await?;
    Ok(cast)
}

/// The point-in-time recruiting snapshot: active casts, optionally restricted to an age band as
/// of `today`. Ordered by id so fan-out row creation is deterministic.
pub async fn eligible_casts(
    filter: Option<&AgeRange>,
    today: NaiveDate,
    conn: &mut SqliteConnection,
) -> Result<Vec<CastProfile>, MatchingEngineError> {
    let casts: Vec<CastProfile> = match filter {
        Some(range) => {
            let (earliest, latest) = birth_date_window(range, today);
            trace!("🗃️ Recruiting snapshot for ages {}-{}: birth dates {earliest} to {latest}", range.min, range.max);
            sqlx::query_as(
                "SELECT * FROM casts WHERE is_active = 1 AND birth_date BETWEEN $1 AND $2 ORDER BY id",
            )
            .bind(earliest)
            .bind(latest)
            .fetch_all(conn)
            .await?
        },
        None => {
            sqlx::query_as("SELECT * FROM casts WHERE is_active = 1 ORDER BY id").fetch_all(conn).await?
        },
    };
    Ok(casts)
}
