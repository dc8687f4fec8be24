//! Shared application state.

use std::sync::Arc;

use rescuenet_core::booking_log::BookingLogRepository;
use rescuenet_core::clock::Clock;
use rescuenet_core::fleet::FleetRepository;
use rescuenet_core::identity::IdentityDirectory;
use rescuenet_core::repository::EventRepository;
use rescuenet_dispatch::application::DispatchContext;
use rescuenet_dispatch::config::DispatchConfig;
use rescuenet_store::pg_booking_log_repository::PgBookingLogRepository;
use rescuenet_store::pg_event_repository::PgEventRepository;
use rescuenet_store::pg_fleet_repository::PgFleetRepository;
use rescuenet_store::pg_identity_directory::PgIdentityDirectory;
use sqlx::PgPool;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Clock for deterministic timestamps.
    pub clock: Arc<dyn Clock>,
    /// Event repository for emergency requests.
    pub event_repository: Arc<dyn EventRepository>,
    /// Units and police stations.
    pub fleet: Arc<dyn FleetRepository>,
    /// Booking log audit store.
    pub booking_logs: Arc<dyn BookingLogRepository>,
    /// Resolves `x-user-id` to an actor.
    pub identity: Arc<dyn IdentityDirectory>,
    /// Search radii for allocation.
    pub dispatch_config: DispatchConfig,
}

impl AppState {
    /// Wires every port to its `PostgreSQL` adapter over one pool.
    #[must_use]
    pub fn from_pool(pool: PgPool, clock: Arc<dyn Clock>, dispatch_config: DispatchConfig) -> Self {
        Self {
            clock,
            event_repository: Arc::new(PgEventRepository::new(pool.clone())),
            fleet: Arc::new(PgFleetRepository::new(pool.clone())),
            booking_logs: Arc::new(PgBookingLogRepository::new(pool.clone())),
            identity: Arc::new(PgIdentityDirectory::new(pool)),
            dispatch_config,
        }
    }

    /// Borrows the collaborators the dispatch handlers work against.
    #[must_use]
    pub fn dispatch(&self) -> DispatchContext<'_> {
        DispatchContext {
            clock: self.clock.as_ref(),
            events: self.event_repository.as_ref(),
            fleet: self.fleet.as_ref(),
            booking_logs: self.booking_logs.as_ref(),
            identity: self.identity.as_ref(),
            config: &self.dispatch_config,
        }
    }
}
