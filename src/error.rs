//! Crate-level error types for store operations and backend calls.

use crate::booking::BookingId;
use crate::store::AttachState;

/// Failure reported by a [`RemoteBookingService`](crate::RemoteBookingService).
///
/// The backend owns its protocol; these variants are the outcomes the store
/// needs to tell apart.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The addressed document does not exist.
    #[error("document not found")]
    NotFound,

    /// The backend's security rules rejected the call.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the payload (validation, quota, etc.).
    #[error("rejected by backend: {0}")]
    Rejected(String),

    /// A live subscription ended without being cancelled by the client.
    #[error("subscription closed by backend")]
    Closed,
}

/// Error returned by [`BookingStore`](crate::BookingStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A mutation was attempted while the store was not `Attached`.
    #[error("store is not attached (state: {state})")]
    NotAttached {
        /// The attachment state at the time of the call.
        state: AttachState,
    },

    /// The target booking no longer exists on the backend.
    #[error("booking {booking_id} not found")]
    NotFound {
        /// Id of the booking the caller addressed.
        booking_id: BookingId,
    },

    /// The backend rejected a mutation.
    #[error("write rejected: {0}")]
    Write(#[source] RemoteError),

    /// The live subscription failed to start or terminated unexpectedly.
    #[error("subscription failed: {0}")]
    Subscription(#[source] RemoteError),

    /// No route with this id exists in the store's catalog.
    #[error("unknown route: {0}")]
    UnknownRoute(String),
}

impl StoreError {
    /// Classify a backend failure from a call that addressed `booking_id`.
    ///
    /// `NotFound` keeps its identity; everything else is a rejected write.
    pub(crate) fn from_mutation(booking_id: &BookingId, err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound => Self::NotFound {
                booking_id: booking_id.clone(),
            },
            other => Self::Write(other),
        }
    }

    /// Returns `true` for [`StoreError::NotFound`].
    ///
    /// Callers that treat a double delete as benign can use this to filter
    /// the error explicitly.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
