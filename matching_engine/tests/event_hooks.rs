mod support;

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

use matching_engine::{
    db_types::{CastResponse, MatchingKey},
    events::{EventHandlers, EventHooks},
    MatchingFlowApi,
};
use support::{new_test_db, solo_offer};

const GUEST: i64 = 1;
const CAST: i64 = 101;

#[tokio::test]
async fn notification_hooks_observe_the_lifecycle() {
    let db = new_test_db().await;

    let accepted = Arc::new(AtomicI64::new(0));
    let completed = Arc::new(AtomicI64::new(0));
    let mut hooks = EventHooks::default();
    let counter = accepted.clone();
    hooks.on_matching_accepted(move |ev| {
        let counter = counter.clone();
        Box::pin(async move {
            counter.fetch_add(ev.cast_id, Ordering::SeqCst);
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let counter = completed.clone();
    hooks.on_matching_completed(move |ev| {
        let counter = counter.clone();
        Box::pin(async move {
            counter.fetch_add(ev.cast_id, Ordering::SeqCst);
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(8, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let api = MatchingFlowApi::new(db, producers);
    let matching = api.create_solo_matching(solo_offer(GUEST, CAST)).await.unwrap();
    let key = MatchingKey::Solo(matching.id);
    api.respond_to_solo_matching(matching.id, CAST, CastResponse::Accepted).await.unwrap();
    api.start(key, CAST).await.unwrap();
    api.complete(key, CAST).await.unwrap();

    // delivery is fire-and-forget on dedicated tasks; give them a beat
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), CAST);
    assert_eq!(completed.load(Ordering::SeqCst), CAST);
}

#[tokio::test]
async fn rejections_do_not_notify() {
    let db = new_test_db().await;

    let accepted = Arc::new(AtomicI64::new(0));
    let mut hooks = EventHooks::default();
    let counter = accepted.clone();
    hooks.on_matching_accepted(move |_ev| {
        let counter = counter.clone();
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(8, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let api = MatchingFlowApi::new(db, producers);
    let matching = api.create_solo_matching(solo_offer(GUEST, CAST)).await.unwrap();
    api.respond_to_solo_matching(matching.id, CAST, CastResponse::Rejected).await.unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 0);
}
