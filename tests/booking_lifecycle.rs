//! End-to-end booking lifecycle against the in-memory backend.

use std::time::Duration;

use ridebook::{
    AttachState, AuthSession, BookingDraft, BookingStore, BookingView, DraftFlow,
    InMemoryBookingService, RemoteError, Route, StoreConfig, StoreError, UserId, bind_identity,
};
use tokio::sync::watch;

fn jhb() -> Route {
    Route::new("1", "Johannesburg", "Pretoria", 580, 58)
}

fn cpt() -> Route {
    Route::new("2", "Cape Town", "Stellenbosch", 500, 50)
}

async fn wait_for(
    rx: &mut watch::Receiver<BookingView>,
    pred: impl FnMut(&BookingView) -> bool,
) -> BookingView {
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
        .await
        .expect("timed out waiting for view")
        .expect("store dropped")
        .clone()
}

fn is_newest_first(view: &BookingView) -> bool {
    view.bookings
        .windows(2)
        .all(|w| w[0].created_at > w[1].created_at)
}

#[tokio::test]
async fn create_update_remove_scenario() {
    let store = BookingStore::new(InMemoryBookingService::new());
    let mut rx = store.watch();

    store.attach(UserId::from("u1")).await.expect("attach");
    let view = wait_for(&mut rx, |v| v.state == AttachState::Attached).await;
    assert!(view.bookings.is_empty());

    let id = store.create(jhb()).await.expect("create");
    let view = wait_for(&mut rx, |v| v.bookings.len() == 1).await;
    let created = view.bookings[0].clone();
    assert_eq!(created.id, id);
    assert_eq!(created.route.from, "Johannesburg");
    assert_eq!(created.route.to, "Pretoria");
    assert_eq!(created.route.price, 580);
    assert_eq!(created.route.distance, 58);

    store.update(&id, cpt()).await.expect("update");
    let view = wait_for(&mut rx, |v| {
        v.bookings.first().is_some_and(|b| b.route == cpt())
    })
    .await;
    assert_eq!(view.bookings.len(), 1);
    assert_eq!(view.bookings[0].id, created.id);
    assert_eq!(view.bookings[0].created_at, created.created_at);

    store.remove(&id).await.expect("remove");
    let view = wait_for(&mut rx, |v| v.bookings.is_empty()).await;
    assert_eq!(view.state, AttachState::Attached);
}

#[tokio::test]
async fn every_push_is_newest_first() {
    let store = BookingStore::new(InMemoryBookingService::new());
    let mut rx = store.watch();
    store.attach(UserId::from("u1")).await.expect("attach");
    wait_for(&mut rx, |v| v.state == AttachState::Attached).await;

    for route_id in ["1", "2", "3", "4", "1"] {
        store.book(route_id).await.expect("book");
        rx.changed().await.expect("store alive");
        assert!(is_newest_first(&rx.borrow_and_update()));
    }
    let view = wait_for(&mut rx, |v| v.bookings.len() == 5).await;
    assert!(is_newest_first(&view));
    assert_eq!(view.bookings[0].route.id, "1");
    assert_eq!(view.bookings[1].route.id, "4");
}

#[tokio::test]
async fn detach_then_attach_ignores_earlier_subscription() {
    let backend = InMemoryBookingService::new();
    let store = BookingStore::new(backend.clone());
    let alice = UserId::from("alice");
    let bob = UserId::from("bob");
    let mut rx = store.watch();

    store.attach(alice.clone()).await.expect("attach alice");
    wait_for(&mut rx, |v| v.state == AttachState::Attached).await;
    store.detach();
    store.attach(bob.clone()).await.expect("attach bob");
    wait_for(&mut rx, |v| v.state == AttachState::Attached).await;

    for _ in 0..3 {
        backend.insert_external(&alice, BookingDraft::new(jhb()));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let view = store.view();
    assert_eq!(view.user_id, Some(bob));
    assert!(view.bookings.is_empty());
}

#[tokio::test]
async fn crud_in_error_state_is_not_attached() {
    let backend = InMemoryBookingService::new();
    let store = BookingStore::new(backend.clone());
    let user = UserId::from("u1");
    let mut rx = store.watch();
    store.attach(user.clone()).await.expect("attach");
    wait_for(&mut rx, |v| v.state == AttachState::Attached).await;

    backend.fail_subscriptions(&user, RemoteError::PermissionDenied("token revoked".into()));
    let before = wait_for(&mut rx, |v| v.state == AttachState::Error).await;

    let id = ridebook::BookingId::from("any");
    for result in [
        store.create(jhb()).await.map(|_| ()),
        store.update(&id, cpt()).await,
        store.remove(&id).await,
    ] {
        assert!(
            matches!(
                result,
                Err(StoreError::NotAttached {
                    state: AttachState::Error
                })
            ),
            "expected NotAttached(Error), got: {result:?}"
        );
    }
    assert_eq!(store.view(), before);
}

#[tokio::test]
async fn configured_catalog_drives_booking() {
    let config = StoreConfig::from_json_str(
        r#"{
            "name": "rides",
            "routes": [
                { "id": "x", "from": "Soweto", "to": "Rosebank", "price": 250, "distance": 25, "icon": "bus" }
            ]
        }"#,
    )
    .expect("config");
    let backend = InMemoryBookingService::new();
    let store = BookingStore::builder(backend.clone()).config(config).build();
    let user = UserId::from("u1");
    let mut rx = store.watch();
    store.attach(user.clone()).await.expect("attach");
    wait_for(&mut rx, |v| v.state == AttachState::Attached).await;

    assert!(matches!(store.book("1").await, Err(StoreError::UnknownRoute(_))));

    let outcome = DraftFlow::from_catalog(store.catalog(), "x")
        .expect("route x")
        .confirm(&store)
        .await
        .expect("confirm");
    assert_eq!(outcome.to_string(), "Your ride from Soweto to Rosebank is confirmed.");

    let view = wait_for(&mut rx, |v| v.bookings.len() == 1).await;
    let flow = store.manage(&view.bookings[0].id).expect("manageable");
    let outcome = flow.cancel(&store).await.expect("cancel");
    assert_eq!(outcome.to_string(), "Your booking has been canceled.");
    assert!(backend.bookings(&user).is_empty());
}

#[tokio::test]
async fn identity_drives_attach_and_detach() {
    let backend = InMemoryBookingService::new();
    let store = BookingStore::new(backend.clone());
    let session = AuthSession::new();
    let binding = bind_identity(store.clone(), &session);
    let mut rx = store.watch();

    let user = UserId::from("u1");
    backend.insert_external(&user, BookingDraft::new(jhb()));

    session.sign_in(user.clone());
    let view = wait_for(&mut rx, |v| v.bookings.len() == 1).await;
    assert_eq!(view.state, AttachState::Attached);

    session.sign_out();
    let view = wait_for(&mut rx, |v| v.state == AttachState::Detached).await;
    assert!(view.bookings.is_empty());
    assert_eq!(view.user_id, None);

    binding.shutdown().await.expect("shutdown");
    assert_eq!(backend.bookings(&user).len(), 1);
}

#[tokio::test]
async fn two_stores_share_one_backend() {
    let backend = InMemoryBookingService::new();
    let phone = BookingStore::new(backend.clone());
    let tablet = BookingStore::new(backend.clone());
    let user = UserId::from("u1");

    let mut phone_rx = phone.watch();
    let mut tablet_rx = tablet.watch();
    phone.attach(user.clone()).await.expect("attach phone");
    tablet.attach(user.clone()).await.expect("attach tablet");
    wait_for(&mut phone_rx, |v| v.state == AttachState::Attached).await;
    wait_for(&mut tablet_rx, |v| v.state == AttachState::Attached).await;

    let id = phone.create(jhb()).await.expect("create on phone");
    let view = wait_for(&mut tablet_rx, |v| v.bookings.len() == 1).await;
    assert_eq!(view.bookings[0].id, id);

    tablet.remove(&id).await.expect("remove on tablet");
    wait_for(&mut phone_rx, |v| v.bookings.is_empty()).await;
}
