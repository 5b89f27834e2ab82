mod support;

use chrono::Duration;
use matching_engine::{
    db_types::{CastResponse, MatchingKey, MatchingStatus, ParticipantStatus},
    MatchingEngineError,
    MatchingQueries,
};
use mmp_common::Points;
use support::{birthday, flow_api, group_offer, new_test_db, seed_cast};
use matching_engine::db_types::AgeRange;

const GUEST: i64 = 1;

#[tokio::test]
async fn fanout_creates_one_pending_row_per_eligible_cast() {
    let db = new_test_db().await;
    let api = flow_api(&db);
    for id in [201, 202, 203, 204] {
        seed_cast(&api, id, birthday(1999, 4, 1)).await;
    }
    // inactive casts are not part of the snapshot
    let inactive = matching_engine::db_types::NewCastProfile::new(
        205,
        "cast-205",
        mmp_common::CastRank::Standard,
        birthday(1999, 4, 1),
    )
    .inactive();
    api.register_cast_profile(inactive).await.unwrap();

    let result = api.create_group_matching(group_offer(GUEST, 2)).await.unwrap();
    assert_eq!(result.participant_count, 4);
    assert_eq!(result.matching.status, MatchingStatus::Pending);

    let tally = api.db().participant_tally(result.matching.id).await.unwrap();
    assert_eq!(tally.pending, 4);
    assert_eq!(tally.total(), 4);
    for cast_id in [201, 202, 203, 204] {
        let row = api.db().fetch_participant(result.matching.id, cast_id).await.unwrap().unwrap();
        assert_eq!(row.status, ParticipantStatus::Pending);
    }
}

#[tokio::test]
async fn empty_eligible_set_creates_nothing() {
    let db = new_test_db().await;
    let api = flow_api(&db);

    let err = api.create_group_matching(group_offer(GUEST, 3)).await;
    assert!(matches!(err, Err(MatchingEngineError::NoEligibleCasts)), "got {err:?}");

    // no matching row was written
    let offers = api
        .db()
        .search_group_matchings(matching_engine::matching_objects::MatchingQueryFilter::default().with_guest_id(GUEST))
        .await
        .unwrap();
    assert!(offers.is_empty());
}

#[tokio::test]
async fn age_filter_restricts_the_snapshot() {
    let db = new_test_db().await;
    let api = flow_api(&db);
    seed_cast(&api, 301, birthday(2004, 1, 1)).await; // ~20
    seed_cast(&api, 302, birthday(1999, 1, 1)).await; // ~25
    seed_cast(&api, 303, birthday(1989, 1, 1)).await; // ~35

    let offer = group_offer(GUEST, 2).with_age_filter(AgeRange::new(20, 29));
    let result = api.create_group_matching(offer).await.unwrap();
    assert_eq!(result.participant_count, 2);
    assert!(api.db().fetch_participant(result.matching.id, 303).await.unwrap().is_none());
}

#[tokio::test]
async fn budget_is_fixed_by_the_requested_count() {
    let db = new_test_db().await;
    let api = flow_api(&db);
    for id in [401, 402, 403, 404, 405] {
        seed_cast(&api, id, birthday(2000, 6, 15)).await;
    }

    // 3 casts requested, base rate 3000, 60 minutes: 9000 points
    let result = api.create_group_matching(group_offer(GUEST, 3)).await.unwrap();
    assert_eq!(result.matching.total_points, Points::from(9_000));
    assert_eq!(result.participant_count, 5);

    // a single acceptance changes nothing about the budget
    api.respond_to_group_matching(result.matching.id, 401, CastResponse::Accepted).await.unwrap();
    let stored = api.db().fetch_group_matching(result.matching.id).await.unwrap().unwrap();
    assert_eq!(stored.total_points, Points::from(9_000));
}

#[tokio::test]
async fn group_offer_validation() {
    let db = new_test_db().await;
    let api = flow_api(&db);
    seed_cast(&api, 501, birthday(2000, 6, 15)).await;

    let zero_casts = group_offer(GUEST, 0);
    assert!(matches!(
        api.create_group_matching(zero_casts).await,
        Err(MatchingEngineError::Validation(_))
    ));

    let mut bad_duration = group_offer(GUEST, 1);
    bad_duration.duration_minutes = 10;
    assert!(matches!(
        api.create_group_matching(bad_duration).await,
        Err(MatchingEngineError::Validation(_))
    ));
}

#[tokio::test]
async fn responses_touch_only_the_participant_row() {
    let db = new_test_db().await;
    let api = flow_api(&db);
    for id in [601, 602] {
        seed_cast(&api, id, birthday(2001, 2, 2)).await;
    }
    let result = api.create_group_matching(group_offer(GUEST, 2)).await.unwrap();
    let matching_id = result.matching.id;

    let parent = api.respond_to_group_matching(matching_id, 601, CastResponse::Accepted).await.unwrap();
    // the parent offer is not flipped by individual responses
    assert_eq!(parent.status, MatchingStatus::Pending);
    let row = api.db().fetch_participant(matching_id, 601).await.unwrap().unwrap();
    assert_eq!(row.status, ParticipantStatus::Accepted);
    assert!(row.responded_at.is_some());

    // the second cast declines, independently
    api.respond_to_group_matching(matching_id, 602, CastResponse::Rejected).await.unwrap();
    let row = api.db().fetch_participant(matching_id, 602).await.unwrap().unwrap();
    assert_eq!(row.status, ParticipantStatus::Rejected);

    // double submit on one row fails
    let again = api.respond_to_group_matching(matching_id, 601, CastResponse::Accepted).await;
    assert!(matches!(again, Err(MatchingEngineError::InvalidState(_))), "got {again:?}");

    // a cast with no invitation is turned away
    let stranger = api.respond_to_group_matching(matching_id, 999, CastResponse::Accepted).await;
    assert!(matches!(stranger, Err(MatchingEngineError::ParticipantNotFound { .. })), "got {stranger:?}");

    let missing = api.respond_to_group_matching(4242, 601, CastResponse::Accepted).await;
    assert!(matches!(missing, Err(MatchingEngineError::MatchingNotFound(_))), "got {missing:?}");
}

#[tokio::test]
async fn group_session_lifecycle() {
    let db = new_test_db().await;
    let api = flow_api(&db);
    for id in [701, 702, 703] {
        seed_cast(&api, id, birthday(2000, 3, 3)).await;
    }
    let result = api.create_group_matching(group_offer(GUEST, 2)).await.unwrap();
    let matching_id = result.matching.id;
    let key = MatchingKey::Group(matching_id);

    api.respond_to_group_matching(matching_id, 701, CastResponse::Accepted).await.unwrap();
    api.respond_to_group_matching(matching_id, 702, CastResponse::Accepted).await.unwrap();

    // a pending participant cannot join
    let early = api.start(key, 703).await;
    assert!(matches!(early, Err(MatchingEngineError::InvalidState(_))), "got {early:?}");

    // the first joiner starts the clock
    let started = api.start(key, 701).await.unwrap();
    assert_eq!(started.status(), MatchingStatus::InProgress);
    let started_at = started.started_at().unwrap();
    assert_eq!(started.scheduled_end_at().unwrap(), started_at + Duration::minutes(60));
    let row = api.db().fetch_participant(matching_id, 701).await.unwrap().unwrap();
    assert_eq!(row.status, ParticipantStatus::Joined);
    assert!(row.joined_at.is_some());

    // the second joiner does not reset it
    let joined = api.start(key, 702).await.unwrap();
    assert_eq!(joined.started_at().unwrap(), started_at);

    // guest extends: 30 minutes at the base rate, times the requested head count
    let extended = api.extend(key, GUEST, 30).await.unwrap();
    assert_eq!(extended.extension_minutes(), 30);
    assert_eq!(extended.extension_points(), Points::from(3_000));
    assert_eq!(extended.scheduled_end_at().unwrap(), started_at + Duration::minutes(90));

    // a cast that never joined cannot complete the session
    let outsider = api.complete(key, 703).await;
    assert!(matches!(outsider, Err(MatchingEngineError::InvalidState(_))), "got {outsider:?}");

    let completed = api.complete(key, 701).await.unwrap();
    assert_eq!(completed.status(), MatchingStatus::Completed);
    assert!(completed.actual_end_at().is_some());

    // every joined cast is marked completed; the pending invitee is untouched
    for cast_id in [701, 702] {
        let row = api.db().fetch_participant(matching_id, cast_id).await.unwrap().unwrap();
        assert_eq!(row.status, ParticipantStatus::Completed);
    }
    let row = api.db().fetch_participant(matching_id, 703).await.unwrap().unwrap();
    assert_eq!(row.status, ParticipantStatus::Pending);

    // completing twice fails
    let again = api.complete(key, 701).await;
    assert!(matches!(again, Err(MatchingEngineError::InvalidState(_))), "got {again:?}");
}

#[tokio::test]
async fn closing_recruiting_rejects_the_unanswered() {
    let db = new_test_db().await;
    let api = flow_api(&db);
    for id in [801, 802, 803] {
        seed_cast(&api, id, birthday(2002, 7, 7)).await;
    }
    let result = api.create_group_matching(group_offer(GUEST, 3)).await.unwrap();
    let matching_id = result.matching.id;

    api.respond_to_group_matching(matching_id, 801, CastResponse::Accepted).await.unwrap();

    // only the owning guest can close
    let stranger = api.close_recruiting(matching_id, 2).await;
    assert!(matches!(stranger, Err(MatchingEngineError::Forbidden(_))), "got {stranger:?}");

    let closed = api.close_recruiting(matching_id, GUEST).await.unwrap();
    assert!(closed.recruiting_ended_at.is_some());

    let tally = api.db().participant_tally(matching_id).await.unwrap();
    assert_eq!(tally.accepted, 1);
    assert_eq!(tally.rejected, 2);
    assert_eq!(tally.pending, 0);

    // closing twice fails
    let again = api.close_recruiting(matching_id, GUEST).await;
    assert!(matches!(again, Err(MatchingEngineError::InvalidState(_))), "got {again:?}");
}

#[tokio::test]
async fn acceptances_beyond_the_requested_count_are_allowed() {
    let db = new_test_db().await;
    let api = flow_api(&db);
    for id in [901, 902, 903] {
        seed_cast(&api, id, birthday(2000, 8, 8)).await;
    }
    // one cast requested, three invited; nothing caps the acceptance count
    let result = api.create_group_matching(group_offer(GUEST, 1)).await.unwrap();
    for cast_id in [901, 902, 903] {
        api.respond_to_group_matching(result.matching.id, cast_id, CastResponse::Accepted).await.unwrap();
    }
    let tally = api.db().participant_tally(result.matching.id).await.unwrap();
    assert_eq!(tally.accepted, 3);
    // and the budget still reflects the requested count only
    let stored = api.db().fetch_group_matching(result.matching.id).await.unwrap().unwrap();
    assert_eq!(stored.total_points, Points::from(3_000));
}
