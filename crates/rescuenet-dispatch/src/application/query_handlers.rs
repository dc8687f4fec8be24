//! Query handlers for the Dispatch context.
//!
//! Requests are reconstituted from their event streams on every read; lists
//! are found through payload containment on `RequestCreated` events.

use chrono::{DateTime, Utc};
use rescuenet_core::booking_log::{BookingLog, BookingLogRepository};
use rescuenet_core::error::DomainError;
use rescuenet_core::fleet::{FleetRepository, UnitKind, UnitStatus};
use rescuenet_core::geo::GeoPoint;
use rescuenet_core::identity::Actor;
use rescuenet_core::repository::EventRepository;
use serde::Serialize;
use uuid::Uuid;

use crate::application::command_handlers::{driver_unit, load_request};
use crate::domain::aggregates::EmergencyRequest;
use crate::domain::classifier::Fulfillment;
use crate::domain::events::{
    AssignedUnit, REQUEST_CREATED_EVENT_TYPE, RequestStatus, requester_filter, station_filter,
    unit_filter,
};

/// A unit on a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitAssignmentView {
    /// The unit identifier.
    pub unit_id: Uuid,
    /// Registration plate at dispatch time.
    pub registration: String,
    /// Distance from the incident when selected.
    pub distance_km: f64,
    /// The unit's state on this request.
    pub state: UnitStatus,
}

/// A station's allocation on a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoliceAssignmentView {
    /// The station identifier.
    pub station_id: Uuid,
    /// Station name at dispatch time.
    pub station_name: String,
    /// Officers allocated.
    pub officers: u32,
    /// Whether they finished and went back to the station.
    pub settled: bool,
}

/// Read-only view of an emergency request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestView {
    /// The request identifier.
    pub request_id: Uuid,
    /// Who raised it.
    pub requester_id: Uuid,
    /// Overall status.
    pub status: RequestStatus,
    /// Free-form incident category.
    pub issue_type: String,
    /// Incident location.
    pub location: GeoPoint,
    /// Whether the requester is the victim.
    pub for_self: bool,
    /// Victim contact number when reporting for someone else.
    pub victim_phone: Option<String>,
    /// Requester's notes.
    pub notes: Option<String>,
    /// When the request was dispatched.
    pub created_at: DateTime<Utc>,
    /// When the request completed.
    pub completed_at: Option<DateTime<Utc>>,
    /// Ambulance fulfillment.
    pub ambulance_status: Fulfillment,
    /// Ambulances, nearest first.
    pub ambulances: Vec<UnitAssignmentView>,
    /// Police fulfillment.
    pub police_status: Fulfillment,
    /// Police allocations, nearest station first.
    pub police: Vec<PoliceAssignmentView>,
    /// Fire-truck fulfillment.
    pub fire_truck_status: Fulfillment,
    /// Fire trucks, nearest first.
    pub fire_trucks: Vec<UnitAssignmentView>,
    /// Current version (event count).
    pub version: i64,
}

/// One line of a requester's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestSummary {
    /// The request identifier.
    pub request_id: Uuid,
    /// Free-form incident category.
    pub issue_type: String,
    /// Overall status.
    pub status: RequestStatus,
    /// When the request was dispatched.
    pub created_at: DateTime<Utc>,
    /// Victim contact number when reporting for someone else.
    pub victim_phone: Option<String>,
}

/// One request a driver's unit or an officer's station served.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentHistoryEntry {
    /// The request identifier.
    pub request_id: Uuid,
    /// Free-form incident category.
    pub issue_type: String,
    /// Incident location.
    pub location: GeoPoint,
    /// When the request was dispatched.
    pub created_at: DateTime<Utc>,
    /// Overall request status.
    pub request_status: RequestStatus,
    /// Whether the caller's part of it is finished.
    pub finished: bool,
}

/// Where the caller's open assignment is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentLocation {
    /// The request identifier.
    pub request_id: Uuid,
    /// Incident location.
    pub location: GeoPoint,
    /// Free-form incident category.
    pub issue_type: String,
    /// Overall request status.
    pub request_status: RequestStatus,
}

fn unit_views(
    request: &EmergencyRequest,
    kind: UnitKind,
    units: &[AssignedUnit],
) -> Vec<UnitAssignmentView> {
    units
        .iter()
        .map(|unit| UnitAssignmentView {
            unit_id: unit.unit_id,
            registration: unit.registration.clone(),
            distance_km: unit.distance_km,
            state: request
                .unit_state(kind, unit.unit_id)
                .unwrap_or(UnitStatus::PendingAcceptance),
        })
        .collect()
}

fn view(request: &EmergencyRequest) -> Result<RequestView, DomainError> {
    let details = request.details()?;
    let fulfillment = request
        .fulfillment()
        .ok_or(DomainError::AggregateNotFound(request.id))?;
    Ok(RequestView {
        request_id: request.id,
        requester_id: details.requester_id,
        status: request.status(),
        issue_type: details.issue_type.clone(),
        location: details.location,
        for_self: details.for_self,
        victim_phone: details.victim_phone.clone(),
        notes: details.notes.clone(),
        created_at: request.created_at().unwrap_or_default(),
        completed_at: request.completed_at(),
        ambulance_status: fulfillment.ambulance,
        ambulances: unit_views(request, UnitKind::Ambulance, &details.ambulances),
        police_status: fulfillment.police,
        police: request
            .police()
            .iter()
            .map(|p| PoliceAssignmentView {
                station_id: p.allocation.station_id,
                station_name: p.allocation.station_name.clone(),
                officers: p.allocation.officers,
                settled: p.settled,
            })
            .collect(),
        fire_truck_status: fulfillment.fire_truck,
        fire_trucks: unit_views(request, UnitKind::FireTruck, &details.fire_trucks),
        version: request.version,
    })
}

/// The caller's share of a request.
enum Portion {
    Unit(UnitKind, Uuid),
    Station(Uuid),
}

impl Portion {
    fn filter(&self) -> serde_json::Value {
        match *self {
            Self::Unit(kind, unit_id) => unit_filter(kind, unit_id),
            Self::Station(station_id) => station_filter(station_id),
        }
    }

    fn is_finished(&self, request: &EmergencyRequest) -> bool {
        match *self {
            Self::Unit(kind, unit_id) => {
                request.unit_state(kind, unit_id) == Some(UnitStatus::Completed)
            }
            Self::Station(station_id) => request.unsettled_officers(station_id).is_none(),
        }
    }
}

/// Loads every live request matching `filter`, oldest first. Withdrawn
/// requests are skipped.
async fn matching_requests(
    repo: &dyn EventRepository,
    filter: &serde_json::Value,
) -> Result<Vec<EmergencyRequest>, DomainError> {
    let ids = repo
        .find_aggregate_ids(REQUEST_CREATED_EVENT_TYPE, filter)
        .await?;
    let mut requests = Vec::with_capacity(ids.len());
    for id in ids {
        match load_request(repo, id).await {
            Ok(request) => requests.push(request),
            Err(DomainError::AggregateNotFound(_)) => {}
            Err(error) => return Err(error),
        }
    }
    Ok(requests)
}

/// Retrieves a request by its aggregate ID, with every service classified
/// and every unit's state on it.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no live request has the ID.
/// Returns `DomainError::Infrastructure` if event deserialization fails.
pub async fn get_request_detail(
    request_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<RequestView, DomainError> {
    let request = load_request(repo, request_id).await?;
    view(&request)
}

/// Lists the requests raised by `requester_id`, newest first.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the store fails.
pub async fn get_request_history(
    requester_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<Vec<RequestSummary>, DomainError> {
    let mut summaries = Vec::new();
    for request in matching_requests(repo, &requester_filter(requester_id)).await? {
        let details = request.details()?;
        summaries.push(RequestSummary {
            request_id: request.id,
            issue_type: details.issue_type.clone(),
            status: request.status(),
            created_at: request.created_at().unwrap_or_default(),
            victim_phone: details.victim_phone.clone(),
        });
    }
    summaries.reverse();
    Ok(summaries)
}

/// Lists the requests the caller's unit (for a driver) or station (for a
/// police officer) was assigned to, newest first.
///
/// # Errors
///
/// Returns `DomainError::Unauthorized` for citizens and drivers without a
/// unit.
pub async fn get_unit_history(
    actor: &Actor,
    fleet: &dyn FleetRepository,
    repo: &dyn EventRepository,
) -> Result<Vec<AssignmentHistoryEntry>, DomainError> {
    let portion = match *actor {
        Actor::PoliceOfficer { station_id, .. } => Portion::Station(station_id),
        Actor::Citizen { .. } => {
            return Err(DomainError::Unauthorized(
                "only drivers and police officers have assignment history".to_owned(),
            ));
        }
        Actor::AmbulanceDriver { .. } | Actor::FireDriver { .. } => {
            let (kind, unit) = driver_unit(fleet, actor).await?;
            Portion::Unit(kind, unit.id)
        }
    };

    let mut entries = Vec::new();
    for request in matching_requests(repo, &portion.filter()).await? {
        let details = request.details()?;
        entries.push(AssignmentHistoryEntry {
            request_id: request.id,
            issue_type: details.issue_type.clone(),
            location: details.location,
            created_at: request.created_at().unwrap_or_default(),
            request_status: request.status(),
            finished: portion.is_finished(&request),
        });
    }
    entries.reverse();
    Ok(entries)
}

/// Finds the location of the caller's open assignment: the request their
/// unit is held by, or the oldest open allocation of their station.
///
/// # Errors
///
/// Returns `DomainError::EntityNotFound` when the caller has no open
/// assignment and `DomainError::Unauthorized` for citizens.
pub async fn get_current_assignment_location(
    actor: &Actor,
    fleet: &dyn FleetRepository,
    repo: &dyn EventRepository,
) -> Result<AssignmentLocation, DomainError> {
    let no_assignment = || DomainError::not_found("open assignment", actor.user_id());
    let request = match *actor {
        Actor::Citizen { .. } => {
            return Err(DomainError::Unauthorized(
                "only drivers and police officers have assignments".to_owned(),
            ));
        }
        Actor::PoliceOfficer { station_id, .. } => matching_requests(
            repo,
            &station_filter(station_id),
        )
        .await?
        .into_iter()
        .find(|request| {
            request.status() != RequestStatus::Completed
                && request.unsettled_officers(station_id).is_some()
        })
        .ok_or_else(no_assignment)?,
        Actor::AmbulanceDriver { .. } | Actor::FireDriver { .. } => {
            let (_, unit) = driver_unit(fleet, actor).await?;
            let request_id = unit
                .active_request
                .filter(|_| {
                    matches!(
                        unit.status,
                        UnitStatus::PendingAcceptance | UnitStatus::EnRoute
                    )
                })
                .ok_or_else(no_assignment)?;
            load_request(repo, request_id).await?
        }
    };

    let details = request.details()?;
    Ok(AssignmentLocation {
        request_id: request.id,
        location: details.location,
        issue_type: details.issue_type.clone(),
        request_status: request.status(),
    })
}

/// Retrieves the booking log of a request.
///
/// # Errors
///
/// Returns `DomainError::EntityNotFound` if the request has no log.
pub async fn get_booking_log(
    request_id: Uuid,
    booking_logs: &dyn BookingLogRepository,
) -> Result<BookingLog, DomainError> {
    booking_logs
        .find(request_id)
        .await?
        .ok_or_else(|| DomainError::not_found("booking log", request_id))
}

#[cfg(test)]
mod tests {
    use rescuenet_core::error::DomainError;
    use rescuenet_core::fleet::{UnitKind, UnitStatus};
    use rescuenet_core::identity::Actor;
    use uuid::Uuid;

    use super::*;
    use crate::application::command_handlers::{
        handle_accept_assignment, handle_complete_assignment, handle_create_request,
        handle_withdraw_request,
    };
    use crate::application::testing::{Harness, create_command, demand};
    use crate::domain::commands::{AcceptAssignment, CompleteAssignment, WithdrawRequest};

    #[tokio::test]
    async fn test_get_request_detail_classifies_and_reports_unit_states() {
        // Arrange
        let h = Harness::new();
        let requester = h.citizen();
        let (driver, ambulance) = h.driven_unit(UnitKind::Ambulance, "KA-01-A-1", 0.5);
        let station = h.station("X", 1.0, 1);
        let created = handle_create_request(&create_command(requester, demand(2, 3, 0)), h.ctx())
            .await
            .unwrap();
        handle_accept_assignment(
            &AcceptAssignment {
                correlation_id: Uuid::new_v4(),
                request_id: created.request_id,
                actor: driver,
            },
            h.ctx(),
        )
        .await
        .unwrap();

        // Act
        let view = get_request_detail(created.request_id, &h.events)
            .await
            .unwrap();

        // Assert
        assert_eq!(view.status, RequestStatus::InProgress);
        assert_eq!(view.ambulance_status, Fulfillment::Partial);
        assert_eq!(view.police_status, Fulfillment::Partial);
        assert_eq!(view.fire_truck_status, Fulfillment::NotRequested);
        assert_eq!(view.ambulances.len(), 1);
        assert_eq!(view.ambulances[0].unit_id, ambulance);
        assert_eq!(view.ambulances[0].state, UnitStatus::EnRoute);
        assert_eq!(view.police[0].station_id, station);
        assert!(!view.police[0].settled);
        assert_eq!(view.version, 2);
        assert_eq!(view.created_at, h.clock.0);
    }

    #[tokio::test]
    async fn test_get_request_detail_is_idempotent() {
        let h = Harness::new();
        let requester = h.citizen();
        h.driven_unit(UnitKind::FireTruck, "KA-01-F-1", 0.5);
        let created = handle_create_request(&create_command(requester, demand(0, 0, 1)), h.ctx())
            .await
            .unwrap();

        let first = get_request_detail(created.request_id, &h.events)
            .await
            .unwrap();
        let second = get_request_detail(created.request_id, &h.events)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(h.events.stream(created.request_id).len(), 1);
    }

    #[tokio::test]
    async fn test_get_request_detail_returns_not_found_when_no_events() {
        let h = Harness::new();
        let missing = Uuid::new_v4();

        let result = get_request_detail(missing, &h.events).await;

        assert!(matches!(result, Err(DomainError::AggregateNotFound(id)) if id == missing));
    }

    #[tokio::test]
    async fn test_history_lists_own_live_requests_newest_first() {
        // Arrange
        let h = Harness::new();
        let requester = h.citizen();
        let other = h.citizen();
        let first = handle_create_request(&create_command(requester, demand(1, 0, 0)), h.ctx())
            .await
            .unwrap();
        let withdrawn = handle_create_request(&create_command(requester, demand(1, 0, 0)), h.ctx())
            .await
            .unwrap();
        let last = handle_create_request(&create_command(requester, demand(0, 1, 0)), h.ctx())
            .await
            .unwrap();
        handle_create_request(&create_command(other, demand(1, 0, 0)), h.ctx())
            .await
            .unwrap();
        handle_withdraw_request(
            &WithdrawRequest {
                correlation_id: Uuid::new_v4(),
                request_id: withdrawn.request_id,
                caller_id: requester,
            },
            h.ctx(),
        )
        .await
        .unwrap();

        // Act
        let history = get_request_history(requester, &h.events).await.unwrap();

        // Assert
        let ids: Vec<Uuid> = history.iter().map(|s| s.request_id).collect();
        assert_eq!(ids, vec![last.request_id, first.request_id]);
        assert_eq!(history[0].issue_type, "road accident");
    }

    #[tokio::test]
    async fn test_unit_history_marks_finished_assignments() {
        // Arrange
        let h = Harness::new();
        let (driver, _) = h.driven_unit(UnitKind::Ambulance, "KA-01-A-1", 0.5);
        let done = handle_create_request(&create_command(h.citizen(), demand(1, 0, 0)), h.ctx())
            .await
            .unwrap();
        handle_accept_assignment(
            &AcceptAssignment {
                correlation_id: Uuid::new_v4(),
                request_id: done.request_id,
                actor: driver,
            },
            h.ctx(),
        )
        .await
        .unwrap();
        handle_complete_assignment(
            &CompleteAssignment {
                correlation_id: Uuid::new_v4(),
                actor: driver,
            },
            h.ctx(),
        )
        .await
        .unwrap();
        let open = handle_create_request(&create_command(h.citizen(), demand(1, 0, 0)), h.ctx())
            .await
            .unwrap();

        // Act
        let history = get_unit_history(&driver, &h.fleet, &h.events).await.unwrap();

        // Assert
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].request_id, open.request_id);
        assert!(!history[0].finished);
        assert_eq!(history[1].request_id, done.request_id);
        assert!(history[1].finished);
        assert_eq!(history[1].request_status, RequestStatus::Completed);
    }

    #[tokio::test]
    async fn test_citizen_has_no_unit_history() {
        let h = Harness::new();
        let citizen = Actor::Citizen {
            user_id: h.citizen(),
        };

        let result = get_unit_history(&citizen, &h.fleet, &h.events).await;

        assert!(matches!(result, Err(DomainError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_current_location_follows_drivers_held_unit() {
        // Arrange
        let h = Harness::new();
        let (driver, _) = h.driven_unit(UnitKind::FireTruck, "KA-01-F-1", 0.5);
        let created = handle_create_request(&create_command(h.citizen(), demand(0, 0, 1)), h.ctx())
            .await
            .unwrap();

        // Act
        let location = get_current_assignment_location(&driver, &h.fleet, &h.events)
            .await
            .unwrap();

        // Assert
        assert_eq!(location.request_id, created.request_id);
        assert_eq!(location.location, crate::application::testing::ORIGIN);
    }

    #[tokio::test]
    async fn test_current_location_for_officer_is_oldest_open_station_request() {
        let h = Harness::new();
        let station = h.station("X", 1.0, 4);
        let officer = h.officer(station);
        let older = handle_create_request(&create_command(h.citizen(), demand(0, 2, 0)), h.ctx())
            .await
            .unwrap();
        handle_create_request(&create_command(h.citizen(), demand(0, 2, 0)), h.ctx())
            .await
            .unwrap();

        let location = get_current_assignment_location(&officer, &h.fleet, &h.events)
            .await
            .unwrap();

        assert_eq!(location.request_id, older.request_id);
    }

    #[tokio::test]
    async fn test_current_location_without_assignment_is_not_found() {
        let h = Harness::new();
        let (driver, _) = h.driven_unit(UnitKind::Ambulance, "KA-01-A-1", 0.5);

        let result = get_current_assignment_location(&driver, &h.fleet, &h.events).await;

        assert!(matches!(
            result,
            Err(DomainError::EntityNotFound {
                entity: "open assignment",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_booking_log_records_dispatch_snapshot_and_follow_ons() {
        // Arrange
        let h = Harness::new();
        let (driver, ambulance) = h.driven_unit(UnitKind::Ambulance, "KA-01-A-1", 0.5);
        let created = handle_create_request(&create_command(h.citizen(), demand(1, 2, 0)), h.ctx())
            .await
            .unwrap();
        handle_accept_assignment(
            &AcceptAssignment {
                correlation_id: Uuid::new_v4(),
                request_id: created.request_id,
                actor: driver,
            },
            h.ctx(),
        )
        .await
        .unwrap();

        // Act
        let log = get_booking_log(created.request_id, &h.booking_logs)
            .await
            .unwrap();

        // Assert
        assert_eq!(log.ambulances, vec![ambulance]);
        assert!(log.police.is_empty());
        assert_eq!(log.status_message, "Ambulance: FULL, Police: NONE, Fire: N/A");
        assert_eq!(log.entries.len(), 1);
        assert_eq!(
            log.entries[0].message,
            "Ambulance KA-01-A-1 accepted the assignment"
        );
    }

    #[tokio::test]
    async fn test_booking_log_of_unknown_request_is_not_found() {
        let h = Harness::new();

        let result = get_booking_log(Uuid::new_v4(), &h.booking_logs).await;

        assert!(matches!(result, Err(DomainError::EntityNotFound { .. })));
    }
}
