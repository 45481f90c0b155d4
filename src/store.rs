//! Top-level entry point: the [`BookingStore`] and its builder.
//!
//! The store keeps the signed-in user's bookings as a live, ordered view
//! fed by a backend subscription, and routes create/update/remove calls to
//! the backend. It never edits the view on its own: every change the caller
//! sees arrives as a full snapshot pushed by the subscription.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::booking::{Booking, BookingDraft, BookingId, RoutePatch, UserId, sort_newest_first};
use crate::config::StoreConfig;
use crate::error::{RemoteError, StoreError};
use crate::manage::ExistingFlow;
use crate::remote::{RemoteBookingService, SnapshotOrder};
use crate::route::{Route, RouteCatalog};
use crate::subscription::{self, SubscriptionHandle};

/// Attachment state of a store.
///
/// ```text
/// Detached --attach--> Attaching --first push--> Attached
/// Attached --detach--> Detached
/// Attached --subscription error--> Error --attach--> Attaching
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttachState {
    /// No user, no subscription.
    #[default]
    Detached,
    /// Subscription requested, first snapshot not yet received.
    Attaching,
    /// Live: the view mirrors the backend.
    Attached,
    /// The subscription failed. Only a new `attach` recovers.
    Error,
}

impl AttachState {
    /// Lowercase name, as used in log fields and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Detached => "detached",
            Self::Attaching => "attaching",
            Self::Attached => "attached",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AttachState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable state of a store, published on every transition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BookingView {
    /// The attached (or last failed) user. `None` when detached.
    pub user_id: Option<UserId>,
    /// Last confirmed snapshot, newest first.
    pub bookings: Vec<Booking>,
    /// Where the store is in its attach lifecycle.
    pub state: AttachState,
    /// Why the subscription failed, while in [`AttachState::Error`].
    pub subscription_error: Option<RemoteError>,
}

/// Mutable session data guarded by [`Shared::session`].
#[derive(Default)]
struct SessionState {
    user_id: Option<UserId>,
    /// Bumped by every attach and detach. A subscription task only writes to
    /// the view while its generation is current.
    generation: u64,
    subscription: Option<SubscriptionHandle>,
}

/// State shared between store clones and the subscription task.
pub(crate) struct Shared {
    name: String,
    remote: Arc<dyn RemoteBookingService>,
    catalog: RouteCatalog,
    session: Mutex<SessionState>,
    /// Written only while `session` is locked.
    view: watch::Sender<BookingView>,
}

impl Shared {
    fn lock_session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the view with a pushed snapshot.
    ///
    /// Returns `false`, leaving the view untouched, if `generation` has been
    /// superseded.
    pub(crate) fn apply_snapshot(&self, generation: u64, mut bookings: Vec<Booking>) -> bool {
        let session = self.lock_session();
        if session.generation != generation {
            tracing::warn!(
                store = %self.name,
                generation,
                current = session.generation,
                "dropping push from superseded subscription"
            );
            return false;
        }
        sort_newest_first(&mut bookings);
        tracing::debug!(
            store = %self.name,
            generation,
            count = bookings.len(),
            "snapshot applied"
        );
        self.view.send_modify(|view| {
            view.bookings = bookings;
            view.state = AttachState::Attached;
            view.subscription_error = None;
        });
        drop(session);
        true
    }

    /// Move to [`AttachState::Error`] if `generation` is still current.
    pub(crate) fn fail_subscription(&self, generation: u64, error: RemoteError) {
        let mut session = self.lock_session();
        if session.generation != generation {
            return;
        }
        session.subscription = None;
        tracing::error!(
            store = %self.name,
            user_id = ?session.user_id,
            generation,
            error = %error,
            "subscription failed"
        );
        self.view.send_modify(|view| {
            view.state = AttachState::Error;
            view.subscription_error = Some(error);
        });
    }

    /// Start a new generation for `user_id` without opening a subscription.
    #[cfg(test)]
    pub(crate) fn begin_external_generation(&self, user_id: UserId) -> u64 {
        let mut session = self.lock_session();
        session.generation += 1;
        session.user_id = Some(user_id.clone());
        self.view.send_modify(|view| {
            view.user_id = Some(user_id);
            view.state = AttachState::Attaching;
        });
        session.generation
    }
}

/// Live view of one user's bookings plus the mutations that act on them.
///
/// `Clone` is cheap -- all clones share the same session and view.
///
/// # Examples
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), ridebook::StoreError> {
/// use ridebook::{AttachState, BookingStore, InMemoryBookingService, UserId};
///
/// let store = BookingStore::new(InMemoryBookingService::new());
/// store.attach(UserId::from("u1")).await?;
///
/// let mut view = store.watch();
/// view.wait_for(|v| v.state == AttachState::Attached).await.unwrap();
///
/// store.book("1").await?;
/// let view = view.wait_for(|v| v.bookings.len() == 1).await.unwrap();
/// assert_eq!(view.bookings[0].route.from, "Johannesburg");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BookingStore {
    shared: Arc<Shared>,
}

impl fmt::Debug for BookingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let view = self.shared.view.borrow();
        f.debug_struct("BookingStore")
            .field("name", &self.shared.name)
            .field("user_id", &view.user_id)
            .field("state", &view.state)
            .field("bookings", &view.bookings.len())
            .finish()
    }
}

impl BookingStore {
    /// Build a store over `remote` with the default configuration.
    pub fn new<R: RemoteBookingService>(remote: R) -> Self {
        Self::builder(remote).build()
    }

    /// Start configuring a store over `remote`.
    pub fn builder<R: RemoteBookingService>(remote: R) -> BookingStoreBuilder {
        BookingStoreBuilder::new(remote)
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Subscribe to `user_id`'s bookings.
    ///
    /// Any previous subscription is cancelled first; from this call on, no
    /// push from it reaches the view. The store is `Attaching` until the
    /// first snapshot arrives, then `Attached`. Switching to a different user
    /// clears the view immediately; re-attaching the same user keeps the last
    /// snapshot on screen until the new one arrives.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`StoreError::Subscription`] if the backend refuses the subscription.
    /// The store is then in [`AttachState::Error`].
    pub async fn attach(&self, user_id: UserId) -> Result<(), StoreError> {
        let generation = {
            let mut session = self.shared.lock_session();
            session.generation += 1;
            if let Some(previous) = session.subscription.take() {
                // Not awaited: the generation bump already fences it off.
                drop(previous.cancel());
            }
            let switching = session.user_id.as_ref() != Some(&user_id);
            session.user_id = Some(user_id.clone());
            self.shared.view.send_modify(|view| {
                view.user_id = Some(user_id.clone());
                if switching {
                    view.bookings.clear();
                }
                view.state = AttachState::Attaching;
                view.subscription_error = None;
            });
            session.generation
        };

        tracing::info!(
            store = %self.shared.name,
            user_id = %user_id,
            generation,
            "attaching"
        );

        let result = self
            .shared
            .remote
            .subscribe(&user_id, SnapshotOrder::CreatedAtDesc)
            .await;

        let mut session = self.shared.lock_session();
        if session.generation != generation {
            // A later attach or detach won; drop whatever we got.
            tracing::warn!(
                store = %self.shared.name,
                user_id = %user_id,
                generation,
                "attach superseded before the subscription started"
            );
            return Ok(());
        }

        match result {
            Ok(stream) => {
                session.subscription = Some(subscription::spawn(
                    Arc::downgrade(&self.shared),
                    generation,
                    stream,
                ));
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    store = %self.shared.name,
                    user_id = %user_id,
                    error = %e,
                    "subscribe failed"
                );
                self.shared.view.send_modify(|view| {
                    view.state = AttachState::Error;
                    view.subscription_error = Some(e.clone());
                });
                Err(StoreError::Subscription(e))
            }
        }
    }

    /// Re-attach the current user, e.g. to recover from
    /// [`AttachState::Error`].
    ///
    /// # Errors
    ///
    /// [`StoreError::NotAttached`] if no user was ever attached (or the store
    /// was detached since), otherwise as [`attach`](Self::attach).
    pub async fn reattach(&self) -> Result<(), StoreError> {
        let user_id = self.shared.lock_session().user_id.clone();
        match user_id {
            Some(user_id) => self.attach(user_id).await,
            None => Err(StoreError::NotAttached {
                state: self.state(),
            }),
        }
    }

    /// Cancel the subscription and clear the view. Safe to call repeatedly.
    ///
    /// Watchers are only notified if something actually changed.
    pub fn detach(&self) {
        // The task stops on its own; its late pushes are fenced off.
        drop(self.teardown());
    }

    /// Detach and wait for the subscription task to exit.
    pub async fn dispose(&self) {
        if let Some(task) = self.teardown()
            && let Err(e) = task.await
        {
            tracing::error!(store = %self.shared.name, error = %e, "subscription task panicked");
        }
    }

    fn teardown(&self) -> Option<tokio::task::JoinHandle<()>> {
        let mut session = self.shared.lock_session();
        session.generation += 1;
        let task = session.subscription.take().map(SubscriptionHandle::cancel);
        if let Some(user_id) = session.user_id.take() {
            tracing::info!(store = %self.shared.name, user_id = %user_id, "detached");
        }
        self.shared.view.send_if_modified(|view| {
            if *view == BookingView::default() {
                false
            } else {
                *view = BookingView::default();
                true
            }
        });
        task
    }

    /// Create a booking from a copy of `route`.
    ///
    /// Resolves once the backend acknowledged the write. The booking shows
    /// up in [`bookings`](Self::bookings) with a later push, not necessarily
    /// by the time this returns.
    ///
    /// # Returns
    ///
    /// The id the backend assigned.
    ///
    /// # Errors
    ///
    /// * [`StoreError::NotAttached`] -- the store is not `Attached`.
    /// * [`StoreError::Write`] -- the backend rejected the write.
    pub async fn create(&self, route: Route) -> Result<BookingId, StoreError> {
        let user_id = self.attached_user()?;
        let draft = BookingDraft::new(route);

        match self.shared.remote.write(&user_id, draft).await {
            Ok(booking_id) => {
                tracing::info!(
                    store = %self.shared.name,
                    user_id = %user_id,
                    booking_id = %booking_id,
                    "booking created"
                );
                Ok(booking_id)
            }
            Err(e) => {
                tracing::warn!(
                    store = %self.shared.name,
                    user_id = %user_id,
                    error = %e,
                    "create rejected"
                );
                Err(StoreError::Write(e))
            }
        }
    }

    /// Create a booking from the catalog route with id `route_id`.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownRoute`] if the catalog has no such route,
    /// otherwise as [`create`](Self::create).
    pub async fn book(&self, route_id: &str) -> Result<BookingId, StoreError> {
        let route = self
            .shared
            .catalog
            .get(route_id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownRoute(route_id.to_owned()))?;
        self.create(route).await
    }

    /// Replace the route of `booking_id`. Its id and `created_at` stay.
    ///
    /// # Errors
    ///
    /// * [`StoreError::NotAttached`] -- the store is not `Attached`.
    /// * [`StoreError::NotFound`] -- the booking no longer exists.
    /// * [`StoreError::Write`] -- the backend rejected the update.
    pub async fn update(&self, booking_id: &BookingId, new_route: Route) -> Result<(), StoreError> {
        let user_id = self.attached_user()?;
        let patch = RoutePatch { route: new_route };

        self.shared
            .remote
            .patch(&user_id, booking_id, patch)
            .await
            .map_err(|e| self.mutation_failed("update", &user_id, booking_id, e))?;
        tracing::info!(
            store = %self.shared.name,
            user_id = %user_id,
            booking_id = %booking_id,
            "booking updated"
        );
        Ok(())
    }

    /// Delete `booking_id`.
    ///
    /// Deleting twice is an error: the second call fails with `NotFound`.
    ///
    /// # Errors
    ///
    /// * [`StoreError::NotAttached`] -- the store is not `Attached`.
    /// * [`StoreError::NotFound`] -- the booking does not exist.
    /// * [`StoreError::Write`] -- the backend rejected the delete.
    pub async fn remove(&self, booking_id: &BookingId) -> Result<(), StoreError> {
        let user_id = self.attached_user()?;

        self.shared
            .remote
            .delete(&user_id, booking_id)
            .await
            .map_err(|e| self.mutation_failed("remove", &user_id, booking_id, e))?;
        tracing::info!(
            store = %self.shared.name,
            user_id = %user_id,
            booking_id = %booking_id,
            "booking removed"
        );
        Ok(())
    }

    fn mutation_failed(
        &self,
        op: &'static str,
        user_id: &UserId,
        booking_id: &BookingId,
        err: RemoteError,
    ) -> StoreError {
        tracing::warn!(
            store = %self.shared.name,
            user_id = %user_id,
            booking_id = %booking_id,
            op,
            error = %err,
            "mutation rejected"
        );
        StoreError::from_mutation(booking_id, err)
    }

    /// The attached user, or `NotAttached` unless the state is `Attached`.
    fn attached_user(&self) -> Result<UserId, StoreError> {
        let view = self.shared.view.borrow();
        match (&view.user_id, view.state) {
            (Some(user_id), AttachState::Attached) => Ok(user_id.clone()),
            (_, state) => Err(StoreError::NotAttached { state }),
        }
    }

    /// Start managing a booking currently in the view.
    ///
    /// Returns `None` if no booking with this id is in the last snapshot.
    pub fn manage(&self, booking_id: &BookingId) -> Option<ExistingFlow> {
        self.shared
            .view
            .borrow()
            .bookings
            .iter()
            .find(|b| &b.id == booking_id)
            .cloned()
            .map(ExistingFlow::new)
    }

    /// Copy of the last confirmed snapshot, newest first.
    pub fn bookings(&self) -> Vec<Booking> {
        self.shared.view.borrow().bookings.clone()
    }

    /// Current attachment state.
    pub fn state(&self) -> AttachState {
        self.shared.view.borrow().state
    }

    /// The attached (or last failed) user, `None` when detached.
    pub fn user_id(&self) -> Option<UserId> {
        self.shared.view.borrow().user_id.clone()
    }

    /// Copy of the whole observable state.
    pub fn view(&self) -> BookingView {
        self.shared.view.borrow().clone()
    }

    /// Receiver notified on every state transition and push.
    pub fn watch(&self) -> watch::Receiver<BookingView> {
        self.shared.view.subscribe()
    }

    /// Routes this store books from.
    pub fn catalog(&self) -> &RouteCatalog {
        &self.shared.catalog
    }
}

/// Builder for a [`BookingStore`].
///
/// # Examples
///
/// ```
/// use ridebook::{BookingStore, InMemoryBookingService, RouteCatalog, Route};
///
/// let store = BookingStore::builder(InMemoryBookingService::new())
///     .name("rides")
///     .catalog(RouteCatalog::new(vec![Route::new("9", "Soweto", "Rosebank", 250, 25)]))
///     .build();
/// assert_eq!(store.catalog().len(), 1);
/// ```
pub struct BookingStoreBuilder {
    remote: Arc<dyn RemoteBookingService>,
    config: StoreConfig,
}

impl BookingStoreBuilder {
    /// Start from the default configuration over `remote`.
    pub fn new<R: RemoteBookingService>(remote: R) -> Self {
        Self::from_shared(Arc::new(remote))
    }

    /// Use a backend that is already shared elsewhere.
    pub fn from_shared(remote: Arc<dyn RemoteBookingService>) -> Self {
        Self {
            remote,
            config: StoreConfig::default(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Label used in log fields.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Replace the routes offered by [`BookingStore::book`].
    pub fn catalog(mut self, catalog: RouteCatalog) -> Self {
        self.config.routes = catalog;
        self
    }

    /// Assemble a detached store.
    pub fn build(self) -> BookingStore {
        let (view, _) = watch::channel(BookingView::default());
        BookingStore {
            shared: Arc::new(Shared {
                name: self.config.name,
                remote: self.remote,
                catalog: self.config.routes,
                session: Mutex::new(SessionState::default()),
                view,
            }),
        }
    }
}

/// Wait until the view satisfies `pred`, failing the test after 2 seconds.
#[cfg(test)]
pub(crate) async fn wait_for(
    rx: &mut watch::Receiver<BookingView>,
    pred: impl FnMut(&BookingView) -> bool,
) -> BookingView {
    tokio::time::timeout(std::time::Duration::from_secs(2), rx.wait_for(pred))
        .await
        .expect("timed out waiting for view")
        .expect("store dropped")
        .clone()
}
