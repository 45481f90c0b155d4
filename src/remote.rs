//! Contract with the remote booking backend.
//!
//! The backend owns persistence, multi-writer consistency and the wire
//! protocol. The store only depends on this trait, so the same store logic
//! runs against a hosted document database or [`InMemoryBookingService`].
//!
//! [`InMemoryBookingService`]: crate::InMemoryBookingService

use std::pin::Pin;

use tokio_stream::Stream;

use crate::booking::{Booking, BookingDraft, BookingId, RoutePatch, UserId};
use crate::error::RemoteError;

/// One full, ordered snapshot of a user's bookings, or the failure that
/// ended the subscription.
pub type SnapshotResult = Result<Vec<Booking>, RemoteError>;

/// Live stream of snapshots. Dropping it cancels the subscription.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = SnapshotResult> + Send>>;

/// Ordering requested from [`RemoteBookingService::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotOrder {
    /// Newest booking first, by server `created_at`.
    #[default]
    CreatedAtDesc,
}

/// Persistent, multi-tenant booking collection addressed by
/// `(user_id, booking_id)`.
#[async_trait::async_trait]
pub trait RemoteBookingService: Send + Sync + 'static {
    /// Open a live subscription on `user_id`'s bookings.
    ///
    /// The stream yields the current snapshot first, then a full snapshot
    /// after every change under that user. An `Err` item means the channel
    /// has failed and no further items follow.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the subscription cannot be established.
    async fn subscribe(
        &self,
        user_id: &UserId,
        order: SnapshotOrder,
    ) -> Result<SnapshotStream, RemoteError>;

    /// Persist a new booking, resolving the draft's server-timestamp marker.
    ///
    /// # Returns
    ///
    /// The id the backend assigned to the booking.
    async fn write(&self, user_id: &UserId, draft: BookingDraft)
    -> Result<BookingId, RemoteError>;

    /// Replace the route of an existing booking.
    ///
    /// # Errors
    ///
    /// [`RemoteError::NotFound`] if the booking does not exist.
    async fn patch(
        &self,
        user_id: &UserId,
        booking_id: &BookingId,
        patch: RoutePatch,
    ) -> Result<(), RemoteError>;

    /// Delete a booking.
    ///
    /// # Errors
    ///
    /// [`RemoteError::NotFound`] if the booking does not exist.
    async fn delete(&self, user_id: &UserId, booking_id: &BookingId) -> Result<(), RemoteError>;
}
