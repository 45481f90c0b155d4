//! Confirmation flows behind the booking screens.
//!
//! A [`DraftFlow`] holds a route the user picked but has not booked yet; the
//! only step it offers is `confirm`. An [`ExistingFlow`] wraps a persisted
//! booking and offers `update` and `cancel`. Both consume themselves, so a
//! flow completes at most once.

use std::fmt;

use crate::booking::{Booking, BookingId};
use crate::error::StoreError;
use crate::route::{Route, RouteCatalog};
use crate::store::BookingStore;

/// Result of a completed flow step, ready to show to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A draft was booked.
    Confirmed { booking_id: BookingId, route: Route },
    /// An existing booking got a new route.
    Updated { booking_id: BookingId, route: Route },
    /// An existing booking was deleted.
    Canceled { booking_id: BookingId },
}

impl Outcome {
    /// Dialog title.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Confirmed { .. } => "Booking Confirmed",
            Self::Updated { .. } => "Booking Updated",
            Self::Canceled { .. } => "Booking Canceled",
        }
    }

    /// The booking the step acted on.
    pub fn booking_id(&self) -> &BookingId {
        match self {
            Self::Confirmed { booking_id, .. }
            | Self::Updated { booking_id, .. }
            | Self::Canceled { booking_id } => booking_id,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirmed { route, .. } => {
                write!(f, "Your ride from {} to {} is confirmed.", route.from, route.to)
            }
            Self::Updated { .. } => f.write_str("Your booking has been updated."),
            Self::Canceled { .. } => f.write_str("Your booking has been canceled."),
        }
    }
}

/// A route picked for booking, awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftFlow {
    route: Route,
}

impl DraftFlow {
    /// Start a draft for `route`.
    pub fn new(route: Route) -> Self {
        Self { route }
    }

    /// Start a draft for the catalog route `route_id`.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownRoute`] if the catalog has no such route.
    pub fn from_catalog(catalog: &RouteCatalog, route_id: &str) -> Result<Self, StoreError> {
        catalog
            .get(route_id)
            .cloned()
            .map(Self::new)
            .ok_or_else(|| StoreError::UnknownRoute(route_id.to_owned()))
    }

    /// The route that `confirm` will book.
    pub fn draft(&self) -> &Route {
        &self.route
    }

    /// Create the booking.
    ///
    /// # Errors
    ///
    /// As [`BookingStore::create`].
    pub async fn confirm(self, store: &BookingStore) -> Result<Outcome, StoreError> {
        let booking_id = store.create(self.route.clone()).await?;
        Ok(Outcome::Confirmed {
            booking_id,
            route: self.route,
        })
    }
}

/// A persisted booking opened for changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingFlow {
    booking: Booking,
}

impl ExistingFlow {
    /// Open `booking` for changes.
    pub fn new(booking: Booking) -> Self {
        Self { booking }
    }

    /// The booking as it was when the flow was opened.
    pub fn booking(&self) -> &Booking {
        &self.booking
    }

    /// Replace the booking's route with `route`.
    ///
    /// # Errors
    ///
    /// As [`BookingStore::update`].
    pub async fn update(self, store: &BookingStore, route: Route) -> Result<Outcome, StoreError> {
        store.update(&self.booking.id, route.clone()).await?;
        Ok(Outcome::Updated {
            booking_id: self.booking.id,
            route,
        })
    }

    /// Delete the booking.
    ///
    /// # Errors
    ///
    /// As [`BookingStore::remove`].
    pub async fn cancel(self, store: &BookingStore) -> Result<Outcome, StoreError> {
        store.remove(&self.booking.id).await?;
        Ok(Outcome::Canceled {
            booking_id: self.booking.id,
        })
    }
}
