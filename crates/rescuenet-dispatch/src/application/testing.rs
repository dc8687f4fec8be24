//! In-memory collaborators wired into a `DispatchContext` for handler tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rescuenet_core::error::DomainError;
use rescuenet_core::fleet::{
    FleetRepository, NearbyStation, NearbyUnit, PoliceStation, Unit, UnitClaim, UnitKind,
};
use rescuenet_core::geo::GeoPoint;
use rescuenet_core::identity::Actor;
use rescuenet_test_support::{
    FixedClock, InMemoryBookingLogs, InMemoryEventRepository, InMemoryFleet,
    StaticIdentityDirectory, north_of, station_at, unit_at,
};
use uuid::Uuid;

use super::DispatchContext;
use super::command_handlers::handle_withdraw_request;
use crate::config::DispatchConfig;
use crate::domain::commands::{CreateEmergencyRequest, WithdrawRequest};
use crate::domain::events::Demand;

pub(crate) const ORIGIN: GeoPoint = GeoPoint::new(12.9716, 77.5946);

pub(crate) struct Harness {
    pub clock: FixedClock,
    pub events: InMemoryEventRepository,
    pub fleet: InMemoryFleet,
    pub booking_logs: InMemoryBookingLogs,
    pub identity: StaticIdentityDirectory,
    pub config: DispatchConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_booking_logs(InMemoryBookingLogs::new())
    }

    pub fn with_booking_logs(booking_logs: InMemoryBookingLogs) -> Self {
        Self {
            clock: FixedClock(Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()),
            events: InMemoryEventRepository::new(),
            fleet: InMemoryFleet::new(),
            booking_logs,
            identity: StaticIdentityDirectory::default(),
            config: DispatchConfig::default(),
        }
    }

    pub fn ctx(&self) -> DispatchContext<'_> {
        DispatchContext {
            clock: &self.clock,
            events: &self.events,
            fleet: &self.fleet,
            booking_logs: &self.booking_logs,
            identity: &self.identity,
            config: &self.config,
        }
    }

    /// Same collaborators, read at a later time.
    pub fn ctx_at<'a>(&'a self, clock: &'a FixedClock) -> DispatchContext<'a> {
        DispatchContext {
            clock,
            ..self.ctx()
        }
    }

    pub fn citizen(&self) -> Uuid {
        let user_id = Uuid::new_v4();
        self.identity.register(Actor::Citizen { user_id });
        user_id
    }

    /// A driven unit `km` north of the origin, returning its driver and id.
    pub fn driven_unit(&self, kind: UnitKind, registration: &str, km: f64) -> (Actor, Uuid) {
        let user_id = Uuid::new_v4();
        let actor = match kind {
            UnitKind::Ambulance => Actor::AmbulanceDriver { user_id },
            UnitKind::FireTruck => Actor::FireDriver { user_id },
        };
        let mut unit = unit_at(kind, registration, north_of(ORIGIN, km));
        unit.driver_id = Some(user_id);
        self.identity.register(actor);
        (actor, self.fleet.add_unit(unit))
    }

    pub fn station(&self, name: &str, km: f64, officers: u32) -> Uuid {
        self.fleet
            .add_station(station_at(name, north_of(ORIGIN, km), officers))
    }

    pub fn officer(&self, station_id: Uuid) -> Actor {
        let actor = Actor::PoliceOfficer {
            user_id: Uuid::new_v4(),
            station_id,
        };
        self.identity.register(actor);
        actor
    }
}

pub(crate) fn create_command(requester_id: Uuid, demand: Demand) -> CreateEmergencyRequest {
    CreateEmergencyRequest {
        correlation_id: Uuid::new_v4(),
        requester_id,
        location: ORIGIN,
        issue_type: "road accident".to_owned(),
        demand,
        for_self: true,
        victim_phone: None,
        notes: Some("two cars, one overturned".to_owned()),
    }
}

pub(crate) fn demand(ambulances: u32, officers: u32, fire_trucks: u32) -> Demand {
    Demand {
        ambulances,
        officers,
        fire_trucks,
    }
}

/// The harness fleet with another caller's actions slipped in between a
/// handler's fleet change and its append.
pub(crate) struct InterleavedFleet<'a> {
    harness: &'a Harness,
    withdrawal: Mutex<Option<WithdrawRequest>>,
    failing_returns: bool,
}

impl<'a> InterleavedFleet<'a> {
    /// Withdraws `request_id` right after the next unit transition or
    /// officer return succeeds.
    pub fn withdrawing(harness: &'a Harness, request_id: Uuid, requester_id: Uuid) -> Self {
        Self {
            harness,
            withdrawal: Mutex::new(Some(WithdrawRequest {
                correlation_id: Uuid::new_v4(),
                request_id,
                caller_id: requester_id,
            })),
            failing_returns: false,
        }
    }

    /// Rejects every officer return.
    pub fn failing_returns(harness: &'a Harness) -> Self {
        Self {
            harness,
            withdrawal: Mutex::new(None),
            failing_returns: true,
        }
    }

    pub fn ctx(&self) -> DispatchContext<'_> {
        DispatchContext {
            fleet: self,
            ..self.harness.ctx()
        }
    }

    async fn interleave(&self) {
        let pending = self.withdrawal.lock().unwrap().take();
        if let Some(command) = pending {
            handle_withdraw_request(&command, self.harness.ctx())
                .await
                .unwrap();
        }
    }
}

#[async_trait]
impl FleetRepository for InterleavedFleet<'_> {
    async fn find_available_units(
        &self,
        kind: UnitKind,
        origin: GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<NearbyUnit>, DomainError> {
        self.harness
            .fleet
            .find_available_units(kind, origin, radius_km)
            .await
    }

    async fn find_unit(&self, unit_id: Uuid) -> Result<Option<Unit>, DomainError> {
        self.harness.fleet.find_unit(unit_id).await
    }

    async fn find_unit_by_driver(&self, driver_id: Uuid) -> Result<Option<Unit>, DomainError> {
        self.harness.fleet.find_unit_by_driver(driver_id).await
    }

    async fn transition_unit(
        &self,
        unit_id: Uuid,
        expected: UnitClaim,
        next: UnitClaim,
        at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let moved = self
            .harness
            .fleet
            .transition_unit(unit_id, expected, next, at)
            .await?;
        if moved {
            self.interleave().await;
        }
        Ok(moved)
    }

    async fn update_unit_location(
        &self,
        unit_id: Uuid,
        location: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.harness
            .fleet
            .update_unit_location(unit_id, location, at)
            .await
    }

    async fn stations_by_proximity(
        &self,
        origin: GeoPoint,
    ) -> Result<Vec<NearbyStation>, DomainError> {
        self.harness.fleet.stations_by_proximity(origin).await
    }

    async fn find_station(&self, station_id: Uuid) -> Result<Option<PoliceStation>, DomainError> {
        self.harness.fleet.find_station(station_id).await
    }

    async fn take_officers(
        &self,
        station_id: Uuid,
        count: u32,
        at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        self.harness.fleet.take_officers(station_id, count, at).await
    }

    async fn return_officers(
        &self,
        station_id: Uuid,
        count: u32,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.failing_returns {
            return Err(DomainError::Infrastructure(
                "station store unavailable".to_owned(),
            ));
        }
        self.harness
            .fleet
            .return_officers(station_id, count, at)
            .await?;
        self.interleave().await;
        Ok(())
    }
}
