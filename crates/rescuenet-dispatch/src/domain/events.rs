//! Domain events for the Dispatch context.

use std::fmt;

use rescuenet_core::error::DomainError;
use rescuenet_core::event::{DomainEvent, EventMetadata};
use rescuenet_core::fleet::{OfficerAllocation, UnitKind};
use rescuenet_core::geo::GeoPoint;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Event type for [`RequestCreated`].
pub const REQUEST_CREATED_EVENT_TYPE: &str = "dispatch.request_created";
/// Event type for [`UnitAccepted`].
pub const UNIT_ACCEPTED_EVENT_TYPE: &str = "dispatch.unit_accepted";
/// Event type for [`UnitCompleted`].
pub const UNIT_COMPLETED_EVENT_TYPE: &str = "dispatch.unit_completed";
/// Event type for [`PoliceSettled`].
pub const POLICE_SETTLED_EVENT_TYPE: &str = "dispatch.police_settled";
/// Event type for [`RequestCompleted`].
pub const REQUEST_COMPLETED_EVENT_TYPE: &str = "dispatch.request_completed";
/// Event type for [`RequestWithdrawn`].
pub const REQUEST_WITHDRAWN_EVENT_TYPE: &str = "dispatch.request_withdrawn";

/// Overall status of an emergency request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Every requested service was fully assigned; no unit has accepted yet.
    Pending,
    /// At least one unit accepted.
    InProgress,
    /// Some requested service came up short at dispatch.
    PartiallyAssigned,
    /// Every assignment finished. Terminal.
    Completed,
}

impl RequestStatus {
    /// The status name as exposed to callers.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::PartiallyAssigned => "PARTIALLY_ASSIGNED",
            Self::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the requester asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demand {
    /// Ambulances requested; zero when not needed.
    pub ambulances: u32,
    /// Police officers requested; zero when not needed.
    pub officers: u32,
    /// Fire trucks requested; zero when not needed.
    pub fire_trucks: u32,
}

impl Demand {
    /// Builds a demand from per-service "needed" flags and counts. Counts of
    /// services that are not needed are ignored.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` when no service is needed, or a
    /// needed service has a zero count.
    pub fn from_needs(
        ambulance: Option<u32>,
        police: Option<u32>,
        fire_brigade: Option<u32>,
    ) -> Result<Self, DomainError> {
        if ambulance.is_none() && police.is_none() && fire_brigade.is_none() {
            return Err(DomainError::Validation(
                "at least one of ambulance, police or fire brigade must be requested".to_owned(),
            ));
        }
        for (service, count) in [
            ("ambulance", ambulance),
            ("police", police),
            ("fire brigade", fire_brigade),
        ] {
            if count == Some(0) {
                return Err(DomainError::Validation(format!(
                    "{service} is requested with a count of zero"
                )));
            }
        }
        Ok(Self {
            ambulances: ambulance.unwrap_or(0),
            officers: police.unwrap_or(0),
            fire_trucks: fire_brigade.unwrap_or(0),
        })
    }

    /// Units requested of `kind`.
    #[must_use]
    pub const fn units(&self, kind: UnitKind) -> u32 {
        match kind {
            UnitKind::Ambulance => self.ambulances,
            UnitKind::FireTruck => self.fire_trucks,
        }
    }

    /// True when nothing at all was requested.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.ambulances == 0 && self.officers == 0 && self.fire_trucks == 0
    }
}

/// A unit reserved for a request at dispatch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedUnit {
    /// The unit identifier.
    pub unit_id: Uuid,
    /// Registration plate at dispatch time.
    pub registration: String,
    /// Distance from the incident when selected.
    pub distance_km: f64,
}

/// Emitted once, when a request is dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestCreated {
    /// The request identifier.
    pub request_id: Uuid,
    /// The user who raised the request.
    pub requester_id: Uuid,
    /// Incident location.
    pub location: GeoPoint,
    /// Free-form incident category.
    pub issue_type: String,
    /// Requested counts.
    pub demand: Demand,
    /// Whether the requester is the victim.
    pub for_self: bool,
    /// Victim contact number when reporting for someone else.
    pub victim_phone: Option<String>,
    /// Requester's notes.
    pub notes: Option<String>,
    /// Ambulances reserved, nearest first.
    pub ambulances: Vec<AssignedUnit>,
    /// Fire trucks reserved, nearest first.
    pub fire_trucks: Vec<AssignedUnit>,
    /// Officer allocations, nearest station first.
    pub police: Vec<OfficerAllocation>,
    /// Status at creation.
    pub status: RequestStatus,
}

/// Emitted when a driver accepts a pending assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitAccepted {
    /// The request identifier.
    pub request_id: Uuid,
    /// The unit that accepted.
    pub unit_id: Uuid,
    /// Ambulance or fire truck.
    pub kind: UnitKind,
    /// The accepting driver.
    pub driver_id: Uuid,
}

/// Emitted when a driver completes an en-route assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCompleted {
    /// The request identifier.
    pub request_id: Uuid,
    /// The unit that completed.
    pub unit_id: Uuid,
    /// Ambulance or fire truck.
    pub kind: UnitKind,
    /// The completing driver.
    pub driver_id: Uuid,
}

/// Emitted when a station's officers finish their part of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoliceSettled {
    /// The request identifier.
    pub request_id: Uuid,
    /// The station whose allocation settled.
    pub station_id: Uuid,
    /// Officers returned to the station.
    pub officers: u32,
    /// The officer who reported completion.
    pub officer_id: Uuid,
}

/// Emitted when every assignment of a request is finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCompleted {
    /// The request identifier.
    pub request_id: Uuid,
}

/// Emitted when a request is deleted by its requester, or abandoned
/// because its dispatch could not be recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestWithdrawn {
    /// The request identifier.
    pub request_id: Uuid,
    /// Who withdrew it.
    pub withdrawn_by: Uuid,
}

/// Event payload variants for the Dispatch context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DispatchEventKind {
    /// A request was dispatched.
    RequestCreated(RequestCreated),
    /// A unit accepted its assignment.
    UnitAccepted(UnitAccepted),
    /// A unit completed its assignment.
    UnitCompleted(UnitCompleted),
    /// A police allocation settled.
    PoliceSettled(PoliceSettled),
    /// The request completed.
    RequestCompleted(RequestCompleted),
    /// The request was withdrawn.
    RequestWithdrawn(RequestWithdrawn),
}

impl DispatchEventKind {
    /// The event type string of this variant.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::RequestCreated(_) => REQUEST_CREATED_EVENT_TYPE,
            Self::UnitAccepted(_) => UNIT_ACCEPTED_EVENT_TYPE,
            Self::UnitCompleted(_) => UNIT_COMPLETED_EVENT_TYPE,
            Self::PoliceSettled(_) => POLICE_SETTLED_EVENT_TYPE,
            Self::RequestCompleted(_) => REQUEST_COMPLETED_EVENT_TYPE,
            Self::RequestWithdrawn(_) => REQUEST_WITHDRAWN_EVENT_TYPE,
        }
    }
}

/// Domain event envelope for the Dispatch context.
#[derive(Debug, Clone)]
pub struct DispatchEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: DispatchEventKind,
}

impl DomainEvent for DispatchEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn to_payload(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        serde_json::to_value(&self.kind).expect("DispatchEventKind serialization is infallible")
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

/// Payload filter matching requests raised by `requester_id`.
#[must_use]
pub fn requester_filter(requester_id: Uuid) -> serde_json::Value {
    json!({ "RequestCreated": { "requester_id": requester_id } })
}

/// Payload filter matching requests that reserved unit `unit_id`.
#[must_use]
pub fn unit_filter(kind: UnitKind, unit_id: Uuid) -> serde_json::Value {
    let field = match kind {
        UnitKind::Ambulance => "ambulances",
        UnitKind::FireTruck => "fire_trucks",
    };
    json!({ "RequestCreated": { field: [{ "unit_id": unit_id }] } })
}

/// Payload filter matching requests that drew officers from `station_id`.
#[must_use]
pub fn station_filter(station_id: Uuid) -> serde_json::Value {
    json!({ "RequestCreated": { "police": [{ "station_id": station_id }] } })
}

/// Payload filter matching settlements of `station_id`'s officers.
#[must_use]
pub fn settlement_filter(station_id: Uuid) -> serde_json::Value {
    json!({ "PoliceSettled": { "station_id": station_id } })
}
