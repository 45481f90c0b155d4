//! In-process implementation of [`RemoteBookingService`].
//!
//! Keeps one collection per user, stamps writes with a strictly increasing
//! server clock and fans a full snapshot out to every live subscriber after
//! each change. Fault switches let callers reproduce permission failures,
//! outages and dropped subscriptions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::booking::{
    Booking, BookingDraft, BookingId, RoutePatch, Timestamp, UserId, sort_newest_first,
};
use crate::error::RemoteError;
use crate::remote::{RemoteBookingService, SnapshotOrder, SnapshotResult, SnapshotStream};

/// Everything stored under one user.
#[derive(Default)]
struct UserCollection {
    docs: HashMap<BookingId, Booking>,
    subscribers: Vec<mpsc::UnboundedSender<SnapshotResult>>,
    writes_denied: bool,
}

impl UserCollection {
    fn snapshot(&self) -> Vec<Booking> {
        let mut bookings: Vec<Booking> = self.docs.values().cloned().collect();
        sort_newest_first(&mut bookings);
        bookings
    }

    /// Push the current snapshot to every subscriber, forgetting those whose
    /// stream has been dropped.
    fn publish(&mut self) {
        let snapshot = self.snapshot();
        self.subscribers
            .retain(|tx| tx.send(Ok(snapshot.clone())).is_ok());
    }
}

#[derive(Default)]
struct Backend {
    users: HashMap<UserId, UserCollection>,
    last_timestamp: u64,
    offline: bool,
}

impl Backend {
    /// Next server timestamp: wall clock, bumped so it always increases.
    fn next_timestamp(&mut self) -> Timestamp {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        self.last_timestamp = now.max(self.last_timestamp + 1);
        Timestamp(self.last_timestamp)
    }

    fn check_online(&self) -> Result<(), RemoteError> {
        if self.offline {
            Err(RemoteError::Unavailable("backend offline".into()))
        } else {
            Ok(())
        }
    }

    fn check_writable(&self, user_id: &UserId) -> Result<(), RemoteError> {
        self.check_online()?;
        match self.users.get(user_id) {
            Some(c) if c.writes_denied => Err(RemoteError::PermissionDenied(format!(
                "writes to users/{user_id}/bookings are denied"
            ))),
            _ => Ok(()),
        }
    }
}

/// In-memory booking backend. `Clone` shares the same data.
///
/// # Examples
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use ridebook::{BookingDraft, InMemoryBookingService, RemoteBookingService, RouteCatalog, UserId};
///
/// let backend = InMemoryBookingService::new();
/// let user = UserId::from("u1");
/// let route = RouteCatalog::builtin().get("1").cloned().unwrap();
/// let id = backend.write(&user, BookingDraft::new(route)).await.unwrap();
/// assert_eq!(backend.bookings(&user)[0].id, id);
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryBookingService {
    inner: Arc<Mutex<Backend>>,
}

impl std::fmt::Debug for InMemoryBookingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = self.lock();
        f.debug_struct("InMemoryBookingService")
            .field("users", &backend.users.len())
            .field("offline", &backend.offline)
            .finish()
    }
}

impl InMemoryBookingService {
    /// An empty, online backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Backend> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current bookings of `user_id`, newest first.
    pub fn bookings(&self, user_id: &UserId) -> Vec<Booking> {
        self.lock()
            .users
            .get(user_id)
            .map(UserCollection::snapshot)
            .unwrap_or_default()
    }

    /// Number of live subscriptions on `user_id`.
    ///
    /// Subscriptions whose stream was dropped are counted until the next
    /// change under that user prunes them.
    pub fn subscriber_count(&self, user_id: &UserId) -> usize {
        self.lock()
            .users
            .get(user_id)
            .map_or(0, |c| c.subscribers.iter().filter(|tx| !tx.is_closed()).count())
    }

    /// Make every mutation under `user_id` fail with `PermissionDenied`.
    pub fn deny_writes(&self, user_id: &UserId, denied: bool) {
        self.lock()
            .users
            .entry(user_id.clone())
            .or_default()
            .writes_denied = denied;
    }

    /// Simulate a network outage: every call fails with `Unavailable`.
    ///
    /// Existing subscriptions stay open.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Terminate every live subscription on `user_id` with `error`.
    pub fn fail_subscriptions(&self, user_id: &UserId, error: RemoteError) {
        let mut backend = self.lock();
        if let Some(collection) = backend.users.get_mut(user_id) {
            for tx in collection.subscribers.drain(..) {
                let _ = tx.send(Err(error.clone()));
            }
        }
    }

    /// Change `user_id`'s data as another device would, notifying subscribers.
    ///
    /// Returns the id of the new booking.
    pub fn insert_external(&self, user_id: &UserId, draft: BookingDraft) -> BookingId {
        let mut backend = self.lock();
        insert(&mut backend, user_id, draft)
    }
}

fn insert(backend: &mut Backend, user_id: &UserId, draft: BookingDraft) -> BookingId {
    let created_at = backend.next_timestamp();
    let id = BookingId::new(Uuid::new_v4().simple().to_string());
    let collection = backend.users.entry(user_id.clone()).or_default();
    collection.docs.insert(
        id.clone(),
        Booking {
            id: id.clone(),
            route: draft.route,
            created_at,
        },
    );
    collection.publish();
    id
}

#[async_trait::async_trait]
impl RemoteBookingService for InMemoryBookingService {
    async fn subscribe(
        &self,
        user_id: &UserId,
        order: SnapshotOrder,
    ) -> Result<SnapshotStream, RemoteError> {
        let SnapshotOrder::CreatedAtDesc = order;
        let mut backend = self.lock();
        backend.check_online()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let collection = backend.users.entry(user_id.clone()).or_default();
        // Receiver is alive, the initial send cannot fail.
        let _ = tx.send(Ok(collection.snapshot()));
        collection.subscribers.push(tx);

        tracing::debug!(user_id = %user_id, "memory backend: subscriber added");
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn write(
        &self,
        user_id: &UserId,
        draft: BookingDraft,
    ) -> Result<BookingId, RemoteError> {
        let mut backend = self.lock();
        backend.check_writable(user_id)?;
        Ok(insert(&mut backend, user_id, draft))
    }

    async fn patch(
        &self,
        user_id: &UserId,
        booking_id: &BookingId,
        patch: RoutePatch,
    ) -> Result<(), RemoteError> {
        let mut backend = self.lock();
        backend.check_writable(user_id)?;
        let collection = backend
            .users
            .get_mut(user_id)
            .ok_or(RemoteError::NotFound)?;
        let booking = collection
            .docs
            .get_mut(booking_id)
            .ok_or(RemoteError::NotFound)?;
        booking.route = patch.route;
        collection.publish();
        Ok(())
    }

    async fn delete(&self, user_id: &UserId, booking_id: &BookingId) -> Result<(), RemoteError> {
        let mut backend = self.lock();
        backend.check_writable(user_id)?;
        let collection = backend
            .users
            .get_mut(user_id)
            .ok_or(RemoteError::NotFound)?;
        collection
            .docs
            .remove(booking_id)
            .ok_or(RemoteError::NotFound)?;
        collection.publish();
        Ok(())
    }
}
