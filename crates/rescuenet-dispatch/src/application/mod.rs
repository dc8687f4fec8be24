//! Application layer: command and query handlers.

pub mod allocation;
pub mod command_handlers;
pub mod query_handlers;

#[cfg(test)]
mod testing;

use rescuenet_core::booking_log::BookingLogRepository;
use rescuenet_core::clock::Clock;
use rescuenet_core::fleet::FleetRepository;
use rescuenet_core::identity::IdentityDirectory;
use rescuenet_core::repository::EventRepository;

use crate::config::DispatchConfig;

/// The collaborators a command handler works against.
#[derive(Clone, Copy)]
pub struct DispatchContext<'a> {
    /// Source of timestamps.
    pub clock: &'a dyn Clock,
    /// Event store holding emergency requests.
    pub events: &'a dyn EventRepository,
    /// Units and police stations.
    pub fleet: &'a dyn FleetRepository,
    /// Booking log audit store.
    pub booking_logs: &'a dyn BookingLogRepository,
    /// Resolves user ids to actors.
    pub identity: &'a dyn IdentityDirectory,
    /// Search radii.
    pub config: &'a DispatchConfig,
}
