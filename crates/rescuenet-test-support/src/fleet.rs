//! In-memory fleet store with contention injection.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rescuenet_core::error::DomainError;
use rescuenet_core::fleet::{
    FleetRepository, NearbyStation, NearbyUnit, PoliceStation, Unit, UnitClaim, UnitKind,
    UnitStatus,
};
use rescuenet_core::geo::GeoPoint;
use uuid::Uuid;

/// Kilometres per degree of latitude on the haversine sphere.
const KM_PER_DEGREE: f64 = 111.194_926_644_558_73;

/// The point `km` due north of `origin`.
#[must_use]
pub fn north_of(origin: GeoPoint, km: f64) -> GeoPoint {
    GeoPoint::new(origin.latitude + km / KM_PER_DEGREE, origin.longitude)
}

/// An available unit with a fresh id and no driver.
#[must_use]
pub fn unit_at(kind: UnitKind, registration: &str, location: GeoPoint) -> Unit {
    Unit {
        id: Uuid::new_v4(),
        kind,
        registration: registration.to_owned(),
        location,
        status: UnitStatus::Available,
        active_request: None,
        home_base_id: Uuid::new_v4(),
        driver_id: None,
        last_updated: Utc::now(),
    }
}

/// A station with a fresh id.
#[must_use]
pub fn station_at(name: &str, location: GeoPoint, available_officers: u32) -> PoliceStation {
    PoliceStation {
        id: Uuid::new_v4(),
        name: name.to_owned(),
        location,
        available_officers,
        last_updated: Utc::now(),
    }
}

/// A fleet held in memory.
///
/// `preempt_unit` and `preempt_officers` simulate a concurrent dispatcher
/// winning the race between a proximity read and the conditional update.
#[derive(Debug, Default)]
pub struct InMemoryFleet {
    units: Mutex<BTreeMap<Uuid, Unit>>,
    stations: Mutex<BTreeMap<Uuid, PoliceStation>>,
    preempted_units: Mutex<HashSet<Uuid>>,
    preempted_officers: Mutex<HashMap<Uuid, u32>>,
}

impl InMemoryFleet {
    /// Creates an empty fleet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a unit.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_unit(&self, unit: Unit) -> Uuid {
        let id = unit.id;
        self.units.lock().unwrap().insert(id, unit);
        id
    }

    /// Adds or replaces a station.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_station(&self, station: PoliceStation) -> Uuid {
        let id = station.id;
        self.stations.lock().unwrap().insert(id, station);
        id
    }

    /// Snapshot of a unit.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn unit(&self, unit_id: Uuid) -> Option<Unit> {
        self.units.lock().unwrap().get(&unit_id).cloned()
    }

    /// Snapshot of a station.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn station(&self, station_id: Uuid) -> Option<PoliceStation> {
        self.stations.lock().unwrap().get(&station_id).cloned()
    }

    /// The next conditional update of `unit_id` finds it already claimed by
    /// another request.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn preempt_unit(&self, unit_id: Uuid) {
        self.preempted_units.lock().unwrap().insert(unit_id);
    }

    /// Just before the next officer take at `station_id`, `count` officers are
    /// taken by someone else.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn preempt_officers(&self, station_id: Uuid, count: u32) {
        self.preempted_officers
            .lock()
            .unwrap()
            .insert(station_id, count);
    }
}

#[async_trait]
impl FleetRepository for InMemoryFleet {
    async fn find_available_units(
        &self,
        kind: UnitKind,
        origin: GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<NearbyUnit>, DomainError> {
        let units = self.units.lock().unwrap();
        let mut nearby: Vec<NearbyUnit> = units
            .values()
            .filter(|unit| unit.kind == kind && unit.status == UnitStatus::Available)
            .map(|unit| NearbyUnit {
                distance_km: origin.distance_km(&unit.location),
                unit: unit.clone(),
            })
            .filter(|candidate| candidate.distance_km <= radius_km)
            .collect();
        nearby.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then_with(|| a.unit.id.cmp(&b.unit.id))
        });
        Ok(nearby)
    }

    async fn find_unit(&self, unit_id: Uuid) -> Result<Option<Unit>, DomainError> {
        Ok(self.unit(unit_id))
    }

    async fn find_unit_by_driver(&self, driver_id: Uuid) -> Result<Option<Unit>, DomainError> {
        Ok(self
            .units
            .lock()
            .unwrap()
            .values()
            .find(|unit| unit.driver_id == Some(driver_id))
            .cloned())
    }

    async fn transition_unit(
        &self,
        unit_id: Uuid,
        expected: UnitClaim,
        next: UnitClaim,
        at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let mut units = self.units.lock().unwrap();
        let Some(unit) = units.get_mut(&unit_id) else {
            return Ok(false);
        };
        if self.preempted_units.lock().unwrap().remove(&unit_id) {
            unit.status = UnitStatus::PendingAcceptance;
            unit.active_request = Some(Uuid::new_v4());
            unit.last_updated = at;
        }
        if unit.claim() != expected {
            return Ok(false);
        }
        unit.status = next.status;
        unit.active_request = next.request_id;
        unit.last_updated = at;
        Ok(true)
    }

    async fn update_unit_location(
        &self,
        unit_id: Uuid,
        location: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let mut units = self.units.lock().unwrap();
        let unit = units
            .get_mut(&unit_id)
            .ok_or(DomainError::not_found("unit", unit_id))?;
        unit.location = location;
        unit.last_updated = at;
        Ok(())
    }

    async fn stations_by_proximity(
        &self,
        origin: GeoPoint,
    ) -> Result<Vec<NearbyStation>, DomainError> {
        let mut nearby: Vec<NearbyStation> = self
            .stations
            .lock()
            .unwrap()
            .values()
            .map(|station| NearbyStation {
                distance_km: origin.distance_km(&station.location),
                station: station.clone(),
            })
            .collect();
        nearby.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then_with(|| a.station.id.cmp(&b.station.id))
        });
        Ok(nearby)
    }

    async fn find_station(&self, station_id: Uuid) -> Result<Option<PoliceStation>, DomainError> {
        Ok(self.station(station_id))
    }

    async fn take_officers(
        &self,
        station_id: Uuid,
        count: u32,
        at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let mut stations = self.stations.lock().unwrap();
        let Some(station) = stations.get_mut(&station_id) else {
            return Ok(false);
        };
        if let Some(taken) = self.preempted_officers.lock().unwrap().remove(&station_id) {
            station.available_officers = station.available_officers.saturating_sub(taken);
        }
        if station.available_officers < count {
            return Ok(false);
        }
        station.available_officers -= count;
        station.last_updated = at;
        Ok(true)
    }

    async fn return_officers(
        &self,
        station_id: Uuid,
        count: u32,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let mut stations = self.stations.lock().unwrap();
        let station = stations
            .get_mut(&station_id)
            .ok_or(DomainError::not_found("police station", station_id))?;
        station.available_officers += count;
        station.last_updated = at;
        Ok(())
    }
}
