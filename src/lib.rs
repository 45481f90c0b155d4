//! Live-synchronized booking store for a ride-booking client.

mod booking;
mod config;
mod error;
mod identity;
mod manage;
mod memory;
mod remote;
mod route;
mod store;
mod subscription;

pub use booking::{Booking, BookingDraft, BookingId, RoutePatch, ServerTimestamp, Timestamp, UserId};
pub use config::StoreConfig;
pub use error::{RemoteError, StoreError};
pub use identity::{AuthSession, IdentityBinding, IdentityProvider, bind_identity};
pub use manage::{DraftFlow, ExistingFlow, Outcome};
pub use memory::InMemoryBookingService;
pub use remote::{RemoteBookingService, SnapshotOrder, SnapshotResult, SnapshotStream};
pub use route::{Route, RouteCatalog};
pub use store::{AttachState, BookingStore, BookingStoreBuilder, BookingView};
