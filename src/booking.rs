//! Booking records and the identifiers that address them.
//!
//! A booking exists in two shapes: a [`BookingDraft`] that has not been
//! written yet (no id, no timestamp) and a persisted [`Booking`] as the
//! backend reports it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::route::Route;

/// Identity of an authenticated user, as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

/// Backend-assigned booking identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            /// Wrap a raw identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(UserId);
string_id!(BookingId);

/// Server clock value in milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Milliseconds since the Unix epoch.
    pub fn as_millis(self) -> u64 {
        self.0
    }
}

/// "Set on write" marker for the `created_at` field of a draft.
///
/// The backend replaces it with its own clock when the write lands, so every
/// client sees one consistent server time instead of its local clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerTimestamp;

/// A booking awaiting its first write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingDraft {
    /// Value copy of the selected route.
    pub route: Route,
    /// Always the server-timestamp marker.
    pub created_at: ServerTimestamp,
}

impl BookingDraft {
    /// Draft a booking for `route`, to be stamped by the server.
    pub fn new(route: Route) -> Self {
        Self {
            route,
            created_at: ServerTimestamp,
        }
    }
}

/// A persisted booking, as delivered by the live subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Backend-assigned id.
    pub id: BookingId,
    /// Route snapshot taken at creation or at the last update.
    pub route: Route,
    /// Server time of the original write. Never changed by updates.
    pub created_at: Timestamp,
}

/// Partial update applied by [`RemoteBookingService::patch`](crate::RemoteBookingService::patch).
///
/// Only the route is replaceable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePatch {
    /// Replacement route.
    pub route: Route,
}

/// Sort bookings newest first by `created_at`.
pub(crate) fn sort_newest_first(bookings: &mut [Booking]) {
    bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
