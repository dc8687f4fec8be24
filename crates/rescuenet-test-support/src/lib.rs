//! In-memory adapters and test utilities for RescueNet.

mod booking_log;
mod clock;
mod fleet;
mod identity;
mod repository;

pub use booking_log::InMemoryBookingLogs;
pub use clock::FixedClock;
pub use fleet::{InMemoryFleet, north_of, station_at, unit_at};
pub use identity::StaticIdentityDirectory;
pub use repository::{FailingEventRepository, InMemoryEventRepository, json_contains};
