mod support;

use chrono::Duration;
use matching_engine::{
    db_types::{CastResponse, MatchingKey, MatchingStatus, NewSoloMatching, ProposedSchedule},
    MatchingEngineError,
    MatchingQueries,
};
use mmp_common::Points;
use support::{flow_api, new_test_db, solo_offer};

const GUEST: i64 = 1;
const CAST: i64 = 101;

#[tokio::test]
async fn full_session_scenario() {
    let db = new_test_db().await;
    let api = flow_api(&db);

    // 120 minutes at 3000/h costs 6000 points, fixed at creation
    let matching = api.create_solo_matching(solo_offer(GUEST, CAST)).await.unwrap();
    assert_eq!(matching.status, MatchingStatus::Pending);
    assert_eq!(matching.total_points, Points::from(6_000));
    assert_eq!(matching.extension_minutes, 0);
    assert_eq!(matching.extension_points, Points::from(0));
    assert!(matching.chat_room_id.is_none());
    assert!(matching.cast_responded_at.is_none());

    let key = MatchingKey::Solo(matching.id);

    let accepted = api.respond_to_solo_matching(matching.id, CAST, CastResponse::Accepted).await.unwrap();
    assert_eq!(accepted.status, MatchingStatus::Accepted);
    assert!(accepted.cast_responded_at.is_some());
    // accepting does not start the session
    assert!(accepted.started_at.is_none());

    let started = api.start(key, CAST).await.unwrap();
    assert_eq!(started.status(), MatchingStatus::InProgress);
    let started_at = started.started_at().unwrap();
    assert_eq!(started.scheduled_end_at().unwrap(), started_at + Duration::minutes(120));

    let extended = api.extend(key, GUEST, 30).await.unwrap();
    assert_eq!(extended.extension_minutes(), 30);
    assert_eq!(extended.extension_points(), Points::from(1_500));
    assert_eq!(extended.scheduled_end_at().unwrap(), started_at + Duration::minutes(150));
    // the creation-time budget never moves
    assert_eq!(extended.as_solo().unwrap().total_points, Points::from(6_000));

    let completed = api.complete(key, CAST).await.unwrap();
    assert_eq!(completed.status(), MatchingStatus::Completed);
    assert!(completed.actual_end_at().is_some());
}

#[tokio::test]
async fn second_response_always_fails() {
    let db = new_test_db().await;
    let api = flow_api(&db);
    let matching = api.create_solo_matching(solo_offer(GUEST, CAST)).await.unwrap();

    api.respond_to_solo_matching(matching.id, CAST, CastResponse::Accepted).await.unwrap();
    let again = api.respond_to_solo_matching(matching.id, CAST, CastResponse::Accepted).await;
    assert!(matches!(again, Err(MatchingEngineError::InvalidState(_))), "got {again:?}");
    let flipped = api.respond_to_solo_matching(matching.id, CAST, CastResponse::Rejected).await;
    assert!(matches!(flipped, Err(MatchingEngineError::InvalidState(_))), "got {flipped:?}");

    // only the first response is recorded
    let stored = api.db().fetch_solo_matching(matching.id).await.unwrap().unwrap();
    assert_eq!(stored.status, MatchingStatus::Accepted);
}

#[tokio::test]
async fn responding_is_restricted_to_the_assigned_cast() {
    let db = new_test_db().await;
    let api = flow_api(&db);
    let matching = api.create_solo_matching(solo_offer(GUEST, CAST)).await.unwrap();

    let err = api.respond_to_solo_matching(matching.id, 999, CastResponse::Accepted).await;
    assert!(matches!(err, Err(MatchingEngineError::Forbidden(_))), "got {err:?}");
    let missing = api.respond_to_solo_matching(4242, CAST, CastResponse::Accepted).await;
    assert!(matches!(missing, Err(MatchingEngineError::MatchingNotFound(_))), "got {missing:?}");
}

#[tokio::test]
async fn offer_validation() {
    let db = new_test_db().await;
    let api = flow_api(&db);

    let mut too_short = solo_offer(GUEST, CAST);
    too_short.duration_minutes = 20;
    assert!(matches!(
        api.create_solo_matching(too_short).await,
        Err(MatchingEngineError::Validation(_))
    ));

    let mut too_long = solo_offer(GUEST, CAST);
    too_long.duration_minutes = 481;
    assert!(matches!(
        api.create_solo_matching(too_long).await,
        Err(MatchingEngineError::Validation(_))
    ));

    let mut cheap = solo_offer(GUEST, CAST);
    cheap.hourly_rate = Points::from(1_000);
    assert!(matches!(api.create_solo_matching(cheap).await, Err(MatchingEngineError::Validation(_))));

    let mut no_schedule = solo_offer(GUEST, CAST);
    no_schedule.schedule = ProposedSchedule::default();
    assert!(matches!(
        api.create_solo_matching(no_schedule).await,
        Err(MatchingEngineError::Validation(_))
    ));

    let mut double_schedule = solo_offer(GUEST, CAST);
    double_schedule.schedule =
        ProposedSchedule { date: Some(chrono::Utc::now()), offset_minutes: Some(30) };
    assert!(matches!(
        api.create_solo_matching(double_schedule).await,
        Err(MatchingEngineError::Validation(_))
    ));
}

#[tokio::test]
async fn absolute_schedule_is_stored_verbatim() {
    let db = new_test_db().await;
    let api = flow_api(&db);
    let date = "2024-12-24T10:00:00Z".parse().unwrap();
    let offer = NewSoloMatching::new(GUEST, CAST, ProposedSchedule::at(date), 60, "Ebisu", Points::from(3_000));
    let matching = api.create_solo_matching(offer).await.unwrap();
    assert_eq!(matching.proposed_date, date);
    assert_eq!(matching.total_points, Points::from(3_000));
}

#[tokio::test]
async fn extension_increments_are_validated() {
    let db = new_test_db().await;
    let api = flow_api(&db);
    let matching = api.create_solo_matching(solo_offer(GUEST, CAST)).await.unwrap();
    let key = MatchingKey::Solo(matching.id);
    api.respond_to_solo_matching(matching.id, CAST, CastResponse::Accepted).await.unwrap();
    api.start(key, CAST).await.unwrap();

    for bad in [15, 25, 45, 75] {
        let err = api.extend(key, GUEST, bad).await;
        assert!(matches!(err, Err(MatchingEngineError::Validation(_))), "{bad} minutes must be rejected");
    }
    for bad in [0, -30] {
        let err = api.extend(key, GUEST, bad).await;
        assert!(matches!(err, Err(MatchingEngineError::Validation(_))), "{bad} minutes must be rejected");
    }

    let started_at = api.db().fetch_solo_matching(matching.id).await.unwrap().unwrap().started_at.unwrap();
    let mut total_minutes = 0;
    let mut total_points = Points::from(0);
    for good in [30, 60, 90, 120] {
        let updated = api.extend(key, GUEST, good).await.unwrap();
        total_minutes += good;
        total_points += Points::from(good * 3_000 / 60);
        assert_eq!(updated.extension_minutes(), total_minutes);
        assert_eq!(updated.extension_points(), total_points);
        assert_eq!(
            updated.scheduled_end_at().unwrap(),
            started_at + Duration::minutes(120 + total_minutes)
        );
    }
}

#[tokio::test]
async fn extension_preconditions() {
    let db = new_test_db().await;
    let api = flow_api(&db);
    let matching = api.create_solo_matching(solo_offer(GUEST, CAST)).await.unwrap();
    let key = MatchingKey::Solo(matching.id);

    // not started yet
    let err = api.extend(key, GUEST, 30).await;
    assert!(matches!(err, Err(MatchingEngineError::InvalidState(_))), "got {err:?}");

    api.respond_to_solo_matching(matching.id, CAST, CastResponse::Accepted).await.unwrap();
    api.start(key, CAST).await.unwrap();

    // only the owning guest extends
    let err = api.extend(key, 2, 30).await;
    assert!(matches!(err, Err(MatchingEngineError::Forbidden(_))), "got {err:?}");

    api.complete(key, CAST).await.unwrap();
    let err = api.extend(key, GUEST, 30).await;
    assert!(matches!(err, Err(MatchingEngineError::InvalidState(_))), "got {err:?}");
}

#[tokio::test]
async fn session_state_machine_is_enforced() {
    let db = new_test_db().await;
    let api = flow_api(&db);
    let matching = api.create_solo_matching(solo_offer(GUEST, CAST)).await.unwrap();
    let key = MatchingKey::Solo(matching.id);

    // cannot start or complete a pending offer
    assert!(matches!(api.start(key, CAST).await, Err(MatchingEngineError::InvalidState(_))));
    assert!(matches!(api.complete(key, CAST).await, Err(MatchingEngineError::InvalidState(_))));

    api.respond_to_solo_matching(matching.id, CAST, CastResponse::Accepted).await.unwrap();
    // only the assigned cast can start
    assert!(matches!(api.start(key, 999).await, Err(MatchingEngineError::Forbidden(_))));
    api.start(key, CAST).await.unwrap();
    // a second start does not reset the clock
    assert!(matches!(api.start(key, CAST).await, Err(MatchingEngineError::InvalidState(_))));

    api.complete(key, CAST).await.unwrap();
    // completing twice fails rather than silently succeeding
    let again = api.complete(key, CAST).await;
    assert!(matches!(again, Err(MatchingEngineError::InvalidState(_))), "got {again:?}");
}

#[tokio::test]
async fn rejected_offers_go_no_further() {
    let db = new_test_db().await;
    let api = flow_api(&db);
    let matching = api.create_solo_matching(solo_offer(GUEST, CAST)).await.unwrap();
    let key = MatchingKey::Solo(matching.id);

    let rejected = api.respond_to_solo_matching(matching.id, CAST, CastResponse::Rejected).await.unwrap();
    assert_eq!(rejected.status, MatchingStatus::Rejected);
    assert!(matches!(api.start(key, CAST).await, Err(MatchingEngineError::InvalidState(_))));
}

#[tokio::test]
async fn guests_can_cancel_before_the_session_starts() {
    let db = new_test_db().await;
    let api = flow_api(&db);

    let pending = api.create_solo_matching(solo_offer(GUEST, CAST)).await.unwrap();
    let cancelled = api.cancel(MatchingKey::Solo(pending.id), GUEST).await.unwrap();
    assert_eq!(cancelled.status(), MatchingStatus::Cancelled);

    let accepted = api.create_solo_matching(solo_offer(GUEST, CAST)).await.unwrap();
    api.respond_to_solo_matching(accepted.id, CAST, CastResponse::Accepted).await.unwrap();
    let cancelled = api.cancel(MatchingKey::Solo(accepted.id), GUEST).await.unwrap();
    assert_eq!(cancelled.status(), MatchingStatus::Cancelled);

    // but not once the session is running, and not somebody else's offer
    let running = api.create_solo_matching(solo_offer(GUEST, CAST)).await.unwrap();
    let key = MatchingKey::Solo(running.id);
    api.respond_to_solo_matching(running.id, CAST, CastResponse::Accepted).await.unwrap();
    api.start(key, CAST).await.unwrap();
    assert!(matches!(api.cancel(key, GUEST).await, Err(MatchingEngineError::InvalidState(_))));
    let other = api.create_solo_matching(solo_offer(GUEST, CAST)).await.unwrap();
    assert!(matches!(
        api.cancel(MatchingKey::Solo(other.id), 2).await,
        Err(MatchingEngineError::Forbidden(_))
    ));
}

#[tokio::test]
async fn chat_rooms_are_assigned_once() {
    let db = new_test_db().await;
    let api = flow_api(&db);
    let matching = api.create_solo_matching(solo_offer(GUEST, CAST)).await.unwrap();
    let key = MatchingKey::Solo(matching.id);

    let updated = api.assign_chat_room(key, "room-abc").await.unwrap();
    assert_eq!(updated.chat_room_id(), Some("room-abc"));
    let again = api.assign_chat_room(key, "room-xyz").await;
    assert!(matches!(again, Err(MatchingEngineError::InvalidState(_))), "got {again:?}");
}
