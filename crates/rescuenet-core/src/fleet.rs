//! Fleet records and the proximity store port.
//!
//! Units (ambulances, fire trucks) and police stations are owned by an
//! external store. The dispatch engine reads them through proximity queries
//! and changes them only through the conditional updates on
//! [`FleetRepository`], so two dispatchers can never both claim the same unit
//! or overdraw a station's officer pool.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::geo::GeoPoint;

/// The two kinds of individually tracked units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitKind {
    /// An ambulance based at a hospital.
    Ambulance,
    /// A fire truck based at a fire station.
    FireTruck,
}

impl UnitKind {
    /// Stable lowercase name, used in storage and log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ambulance => "ambulance",
            Self::FireTruck => "fire_truck",
        }
    }

    /// Human-readable label for audit messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ambulance => "Ambulance",
            Self::FireTruck => "Fire truck",
        }
    }

    /// Parses the storage name produced by [`UnitKind::as_str`].
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` for unknown names.
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "ambulance" => Ok(Self::Ambulance),
            "fire_truck" => Ok(Self::FireTruck),
            other => Err(DomainError::Infrastructure(format!(
                "unknown unit kind: {other}"
            ))),
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a unit.
///
/// Used both as a unit's coarse status and as the per-(unit, request) state
/// recorded on an emergency request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    /// Free to be dispatched.
    Available,
    /// Reserved for a request, waiting for the driver to accept.
    PendingAcceptance,
    /// Driver accepted and is travelling to the incident.
    EnRoute,
    /// Out of service for reasons outside dispatch.
    Busy,
    /// The unit finished its part of a request.
    Completed,
}

impl UnitStatus {
    /// Stable storage name, matching the serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::PendingAcceptance => "PENDING_ACCEPTANCE",
            Self::EnRoute => "EN_ROUTE",
            Self::Busy => "BUSY",
            Self::Completed => "COMPLETED",
        }
    }

    /// Parses the storage name produced by [`UnitStatus::as_str`].
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` for unknown names.
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "AVAILABLE" => Ok(Self::Available),
            "PENDING_ACCEPTANCE" => Ok(Self::PendingAcceptance),
            "EN_ROUTE" => Ok(Self::EnRoute),
            "BUSY" => Ok(Self::Busy),
            "COMPLETED" => Ok(Self::Completed),
            other => Err(DomainError::Infrastructure(format!(
                "unknown unit status: {other}"
            ))),
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dispatchable physical asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    /// Unit identifier.
    pub id: Uuid,
    /// Ambulance or fire truck.
    pub kind: UnitKind,
    /// Registration plate.
    pub registration: String,
    /// Last reported position.
    pub location: GeoPoint,
    /// Coarse availability.
    pub status: UnitStatus,
    /// The request currently holding this unit, if any.
    pub active_request: Option<Uuid>,
    /// Hospital or fire station the unit belongs to.
    pub home_base_id: Uuid,
    /// The driver operating the unit.
    pub driver_id: Option<Uuid>,
    /// When status or location last changed.
    pub last_updated: DateTime<Utc>,
}

impl Unit {
    /// The `(status, active_request)` pair conditional updates compare against.
    #[must_use]
    pub fn claim(&self) -> UnitClaim {
        UnitClaim {
            status: self.status,
            request_id: self.active_request,
        }
    }
}

/// The `(status, active_request)` pair of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitClaim {
    /// Coarse status.
    pub status: UnitStatus,
    /// Request holding the unit.
    pub request_id: Option<Uuid>,
}

impl UnitClaim {
    /// Free and unattached.
    #[must_use]
    pub const fn available() -> Self {
        Self {
            status: UnitStatus::Available,
            request_id: None,
        }
    }

    /// Reserved for `request_id`, awaiting the driver.
    #[must_use]
    pub const fn pending(request_id: Uuid) -> Self {
        Self {
            status: UnitStatus::PendingAcceptance,
            request_id: Some(request_id),
        }
    }

    /// Accepted and travelling for `request_id`.
    #[must_use]
    pub const fn en_route(request_id: Uuid) -> Self {
        Self {
            status: UnitStatus::EnRoute,
            request_id: Some(request_id),
        }
    }
}

/// A unit returned by a proximity query, with its distance from the origin.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyUnit {
    /// The unit record.
    pub unit: Unit,
    /// Great-circle distance from the query origin.
    pub distance_km: f64,
}

/// A police station holding a pool of officers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoliceStation {
    /// Station identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Station position.
    pub location: GeoPoint,
    /// Officers currently free to be allocated.
    pub available_officers: u32,
    /// When the pool last changed.
    pub last_updated: DateTime<Utc>,
}

/// A station returned by a proximity query.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyStation {
    /// The station record.
    pub station: PoliceStation,
    /// Great-circle distance from the query origin.
    pub distance_km: f64,
}

/// Officers drawn from one station for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfficerAllocation {
    /// The station the officers come from.
    pub station_id: Uuid,
    /// Station name at allocation time.
    pub station_name: String,
    /// Number of officers drawn.
    pub officers: u32,
}

/// Port over the store holding units and police stations.
///
/// Query results are ordered nearest first; equal distances are ordered by
/// id ascending so allocation is deterministic.
#[async_trait]
pub trait FleetRepository: Send + Sync {
    /// Units of `kind` with status `AVAILABLE` within `radius_km` of `origin`.
    async fn find_available_units(
        &self,
        kind: UnitKind,
        origin: GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<NearbyUnit>, DomainError>;

    /// Loads a unit by id.
    async fn find_unit(&self, unit_id: Uuid) -> Result<Option<Unit>, DomainError>;

    /// Loads the unit operated by `driver_id`.
    async fn find_unit_by_driver(&self, driver_id: Uuid) -> Result<Option<Unit>, DomainError>;

    /// Atomically moves a unit from `expected` to `next`, stamping
    /// `last_updated`. Returns `false` and changes nothing if the unit's
    /// current claim differs from `expected`.
    async fn transition_unit(
        &self,
        unit_id: Uuid,
        expected: UnitClaim,
        next: UnitClaim,
        at: DateTime<Utc>,
    ) -> Result<bool, DomainError>;

    /// Records a new position for a unit.
    async fn update_unit_location(
        &self,
        unit_id: Uuid,
        location: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError>;

    /// Every station, nearest to `origin` first.
    async fn stations_by_proximity(&self, origin: GeoPoint)
    -> Result<Vec<NearbyStation>, DomainError>;

    /// Loads a station by id.
    async fn find_station(&self, station_id: Uuid) -> Result<Option<PoliceStation>, DomainError>;

    /// Atomically subtracts `count` officers if at least `count` are
    /// available. Returns `false` and changes nothing otherwise.
    async fn take_officers(
        &self,
        station_id: Uuid,
        count: u32,
        at: DateTime<Utc>,
    ) -> Result<bool, DomainError>;

    /// Returns `count` officers to a station's pool.
    async fn return_officers(
        &self,
        station_id: Uuid,
        count: u32,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_status_storage_names_round_trip() {
        for status in [
            UnitStatus::Available,
            UnitStatus::PendingAcceptance,
            UnitStatus::EnRoute,
            UnitStatus::Busy,
            UnitStatus::Completed,
        ] {
            assert_eq!(UnitStatus::parse(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn test_unit_kind_storage_names_round_trip() {
        for kind in [UnitKind::Ambulance, UnitKind::FireTruck] {
            assert_eq!(UnitKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(UnitKind::parse("helicopter").is_err());
    }

    #[test]
    fn test_unit_status_serializes_like_storage_name() {
        let json = serde_json::to_value(UnitStatus::PendingAcceptance).unwrap();

        assert_eq!(json, serde_json::json!("PENDING_ACCEPTANCE"));
    }

    #[test]
    fn test_unknown_unit_status_is_infrastructure_error() {
        assert!(matches!(
            UnitStatus::parse("PARKED"),
            Err(DomainError::Infrastructure(_))
        ));
    }
}
