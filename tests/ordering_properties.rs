//! Property-based tests for the store's view under arbitrary mutation
//! sequences.
//!
//! A simple model (insertion-ordered list of `(id, route)`) is kept next to
//! the store. After every acknowledged mutation the pushed view must equal
//! the model reversed: newest first, with routes as last written.

use std::time::Duration;

use proptest::prelude::*;
use ridebook::{
    AttachState, BookingId, BookingStore, BookingView, InMemoryBookingService, Route,
    RouteCatalog, StoreError, UserId,
};

#[derive(Debug, Clone)]
enum Op {
    Create { route: usize },
    Update { target: usize, route: usize },
    Remove { target: usize },
    /// Remove an id that never existed.
    RemoveMissing,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0usize..4).prop_map(|route| Op::Create { route }),
        2 => (0usize..16, 0usize..4).prop_map(|(target, route)| Op::Update { target, route }),
        2 => (0usize..16).prop_map(|target| Op::Remove { target }),
        1 => Just(Op::RemoveMissing),
    ]
}

fn routes() -> Vec<Route> {
    RouteCatalog::builtin().iter().cloned().collect()
}

fn expected_view(model: &[(BookingId, Route)]) -> Vec<(BookingId, Route)> {
    model.iter().rev().cloned().collect()
}

fn actual_view(view: &BookingView) -> Vec<(BookingId, Route)> {
    view.bookings
        .iter()
        .map(|b| (b.id.clone(), b.route.clone()))
        .collect()
}

async fn run_ops(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let store = BookingStore::new(InMemoryBookingService::new());
    let mut rx = store.watch();
    store
        .attach(UserId::from("prop"))
        .await
        .map_err(|e| TestCaseError::fail(format!("attach: {e}")))?;
    tokio::time::timeout(
        Duration::from_secs(2),
        rx.wait_for(|v| v.state == AttachState::Attached),
    )
    .await
    .map_err(|_| TestCaseError::fail("never attached"))?
    .map_err(|_| TestCaseError::fail("store dropped"))?;

    let routes = routes();
    let mut model: Vec<(BookingId, Route)> = Vec::new();

    for op in ops {
        match op {
            Op::Create { route } => {
                let id = store
                    .create(routes[route].clone())
                    .await
                    .map_err(|e| TestCaseError::fail(format!("create: {e}")))?;
                prop_assert!(!id.as_str().is_empty());
                model.push((id, routes[route].clone()));
            }
            Op::Update { target, route } => {
                if model.is_empty() {
                    continue;
                }
                let idx = target % model.len();
                let id = model[idx].0.clone();
                store
                    .update(&id, routes[route].clone())
                    .await
                    .map_err(|e| TestCaseError::fail(format!("update: {e}")))?;
                model[idx].1 = routes[route].clone();
            }
            Op::Remove { target } => {
                if model.is_empty() {
                    continue;
                }
                let idx = target % model.len();
                let (id, _) = model.remove(idx);
                store
                    .remove(&id)
                    .await
                    .map_err(|e| TestCaseError::fail(format!("remove: {e}")))?;
                let again = store.remove(&id).await;
                prop_assert!(
                    matches!(again, Err(StoreError::NotFound { .. })),
                    "second remove should be NotFound, got: {:?}",
                    again
                );
            }
            Op::RemoveMissing => {
                let before = store.bookings();
                let result = store.remove(&BookingId::from("missing")).await;
                prop_assert!(result.is_err_and(|e| e.is_not_found()));
                prop_assert_eq!(store.bookings(), before);
                continue;
            }
        }

        let expected = expected_view(&model);
        let view = tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|v| v.state == AttachState::Attached && actual_view(v) == expected),
        )
        .await
        .map_err(|_| TestCaseError::fail("view never matched the model"))?
        .map_err(|_| TestCaseError::fail("store dropped"))?
        .clone();

        prop_assert!(
            view.bookings
                .windows(2)
                .all(|w| w[0].created_at > w[1].created_at),
            "bookings not newest first: {:?}",
            view.bookings
        );
    }

    store.dispose().await;
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_view_tracks_mutations_newest_first(ops in prop::collection::vec(op_strategy(), 0..24)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        runtime.block_on(run_ops(ops))?;
    }
}
