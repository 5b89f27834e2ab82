#![allow(dead_code)]
use chrono::NaiveDate;
use matching_engine::{
    db_types::{NewCastProfile, NewGroupMatching, NewSoloMatching, ProposedSchedule},
    events::EventProducers,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    MatchingFlowApi,
    MatchingQueryApi,
    SqliteDatabase,
};
use mmp_common::{CastRank, Points};

pub async fn new_test_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

pub fn flow_api(db: &SqliteDatabase) -> MatchingFlowApi<SqliteDatabase> {
    MatchingFlowApi::new(db.clone(), EventProducers::default())
}

pub fn query_api(db: &SqliteDatabase) -> MatchingQueryApi<SqliteDatabase> {
    MatchingQueryApi::new(db.clone())
}

/// Registers an active Standard-rank cast born on the given date.
pub async fn seed_cast(api: &MatchingFlowApi<SqliteDatabase>, id: i64, birth_date: NaiveDate) {
    let profile = NewCastProfile::new(id, format!("cast-{id}"), CastRank::Standard, birth_date);
    api.register_cast_profile(profile).await.expect("Error seeding cast profile");
}

pub fn birthday(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("invalid date in test")
}

/// A well-formed solo offer: 120 minutes at 3000/h, meeting in an hour.
pub fn solo_offer(guest_id: i64, cast_id: i64) -> NewSoloMatching {
    NewSoloMatching::new(
        guest_id,
        cast_id,
        ProposedSchedule::in_minutes(60),
        120,
        "Shibuya",
        Points::from(3_000),
    )
}

/// A well-formed group offer for `count` casts, 60 minutes, meeting in an hour.
pub fn group_offer(guest_id: i64, count: i64) -> NewGroupMatching {
    NewGroupMatching::new(guest_id, count, ProposedSchedule::in_minutes(60), 60, "Ginza")
}
