//! Aggregate root for the Dispatch context.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rescuenet_core::aggregate::AggregateRoot;
use rescuenet_core::clock::Clock;
use rescuenet_core::error::DomainError;
use rescuenet_core::event::EventMetadata;
use rescuenet_core::fleet::{OfficerAllocation, UnitKind, UnitStatus};
use uuid::Uuid;

use super::classifier::ServiceFulfillment;
use super::commands::CreateEmergencyRequest;
use super::events::{
    AssignedUnit, Demand, DispatchEvent, DispatchEventKind, PoliceSettled, RequestCompleted,
    RequestCreated, RequestStatus, RequestWithdrawn, UnitAccepted, UnitCompleted,
};

/// Units and officers reserved for a request before it is recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reservation {
    /// Reserved ambulances, nearest first.
    pub ambulances: Vec<AssignedUnit>,
    /// Reserved fire trucks, nearest first.
    pub fire_trucks: Vec<AssignedUnit>,
    /// Officers drawn per station, nearest first.
    pub police: Vec<OfficerAllocation>,
}

impl Reservation {
    /// Units reserved of `kind`.
    #[must_use]
    pub fn units(&self, kind: UnitKind) -> &[AssignedUnit] {
        match kind {
            UnitKind::Ambulance => &self.ambulances,
            UnitKind::FireTruck => &self.fire_trucks,
        }
    }

    /// Officers drawn across all stations.
    #[must_use]
    pub fn officers(&self) -> u32 {
        self.police.iter().map(|allocation| allocation.officers).sum()
    }

    /// Classifies this reservation against `demand`.
    #[must_use]
    pub fn fulfillment(&self, demand: &Demand) -> ServiceFulfillment {
        ServiceFulfillment::assess(
            demand,
            count(self.ambulances.len()),
            self.officers(),
            count(self.fire_trucks.len()),
        )
    }

    /// True when nothing was reserved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ambulances.is_empty() && self.fire_trucks.is_empty() && self.police.is_empty()
    }
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// A police allocation and whether its officers have finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoliceAssignment {
    /// Station and officer count.
    pub allocation: OfficerAllocation,
    /// Set once the station's officers completed and were returned.
    pub settled: bool,
}

/// The aggregate root for one emergency request.
#[derive(Debug)]
pub struct EmergencyRequest {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Current version (event count).
    pub(crate) version: i64,
    /// The dispatch record, once created.
    created: Option<RequestCreated>,
    /// When the request was dispatched.
    created_at: Option<DateTime<Utc>>,
    status: RequestStatus,
    /// Per-(kind, unit) state on this request.
    unit_states: BTreeMap<(UnitKind, Uuid), UnitStatus>,
    police: Vec<PoliceAssignment>,
    completed_at: Option<DateTime<Utc>>,
    withdrawn: bool,
    /// Uncommitted events pending persistence.
    uncommitted_events: Vec<DispatchEvent>,
}

impl EmergencyRequest {
    /// Creates an empty request awaiting its `RequestCreated` event.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            created: None,
            created_at: None,
            status: RequestStatus::Pending,
            unit_states: BTreeMap::new(),
            police: Vec::new(),
            completed_at: None,
            withdrawn: false,
            uncommitted_events: Vec::new(),
        }
    }

    /// The dispatch record of a live request.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if the request was never
    /// created or has been withdrawn.
    pub fn details(&self) -> Result<&RequestCreated, DomainError> {
        match &self.created {
            Some(created) if !self.withdrawn => Ok(created),
            _ => Err(DomainError::AggregateNotFound(self.id)),
        }
    }

    /// Overall status.
    #[must_use]
    pub fn status(&self) -> RequestStatus {
        self.status
    }

    /// When the request was dispatched.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// When the request completed.
    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// True once a `RequestWithdrawn` event has been applied or raised.
    #[must_use]
    pub fn is_withdrawn(&self) -> bool {
        self.withdrawn
    }

    /// State of `unit_id` on this request, if the unit was assigned to it.
    #[must_use]
    pub fn unit_state(&self, kind: UnitKind, unit_id: Uuid) -> Option<UnitStatus> {
        self.unit_states.get(&(kind, unit_id)).copied()
    }

    /// Units still holding an open assignment on this request.
    #[must_use]
    pub fn open_units(&self) -> Vec<(UnitKind, Uuid, UnitStatus)> {
        self.unit_states
            .iter()
            .filter(|(_, state)| {
                matches!(state, UnitStatus::PendingAcceptance | UnitStatus::EnRoute)
            })
            .map(|(&(kind, unit_id), &state)| (kind, unit_id, state))
            .collect()
    }

    /// Police allocations with their settled flags, nearest station first.
    #[must_use]
    pub fn police(&self) -> &[PoliceAssignment] {
        &self.police
    }

    /// Officers from `station_id` still out on this request.
    #[must_use]
    pub fn unsettled_officers(&self, station_id: Uuid) -> Option<u32> {
        self.police
            .iter()
            .find(|p| !p.settled && p.allocation.station_id == station_id)
            .map(|p| p.allocation.officers)
    }

    /// Classification of what was assigned at dispatch.
    #[must_use]
    pub fn fulfillment(&self) -> Option<ServiceFulfillment> {
        self.created.as_ref().map(|created| {
            ServiceFulfillment::assess(
                &created.demand,
                count(created.ambulances.len()),
                created.police.iter().map(|a| a.officers).sum(),
                count(created.fire_trucks.len()),
            )
        })
    }

    /// True when every unit completed and every police allocation settled.
    #[must_use]
    pub fn is_ready_to_complete(&self) -> bool {
        self.created.is_some()
            && self
                .unit_states
                .values()
                .all(|state| *state == UnitStatus::Completed)
            && self.police.iter().all(|p| p.settled)
    }

    /// Records the dispatch of this request, producing a `RequestCreated`
    /// event. Returns the fulfillment of each service.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the request already exists, no
    /// service was requested, or the reservation exceeds the demand.
    pub fn create(
        &mut self,
        command: &CreateEmergencyRequest,
        reservation: &Reservation,
        clock: &dyn Clock,
    ) -> Result<ServiceFulfillment, DomainError> {
        if self.created.is_some() {
            return Err(DomainError::Validation(format!(
                "request {} already exists",
                self.id
            )));
        }
        let demand = command.demand;
        if demand.is_empty() {
            return Err(DomainError::Validation(
                "at least one service must be requested".to_owned(),
            ));
        }
        for kind in [UnitKind::Ambulance, UnitKind::FireTruck] {
            if count(reservation.units(kind).len()) > demand.units(kind) {
                return Err(DomainError::Validation(format!(
                    "more {kind} units reserved than requested"
                )));
            }
        }
        if reservation.officers() > demand.officers {
            return Err(DomainError::Validation(
                "more officers allocated than requested".to_owned(),
            ));
        }

        let fulfillment = reservation.fulfillment(&demand);
        let status = if fulfillment.is_complete() {
            RequestStatus::Pending
        } else {
            RequestStatus::PartiallyAssigned
        };
        let victim_phone = if command.for_self {
            None
        } else {
            command.victim_phone.clone()
        };

        self.raise(
            DispatchEventKind::RequestCreated(RequestCreated {
                request_id: self.id,
                requester_id: command.requester_id,
                location: command.location,
                issue_type: command.issue_type.clone(),
                demand,
                for_self: command.for_self,
                victim_phone,
                notes: command.notes.clone(),
                ambulances: reservation.ambulances.clone(),
                fire_trucks: reservation.fire_trucks.clone(),
                police: reservation.police.clone(),
                status,
            }),
            command.correlation_id,
            clock,
        );
        Ok(fulfillment)
    }

    /// A driver accepts the pending assignment of `unit_id`, producing a
    /// `UnitAccepted` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Unauthorized` if the unit is not on this request
    /// or not awaiting acceptance, or the request is completed.
    pub fn accept_unit(
        &mut self,
        kind: UnitKind,
        unit_id: Uuid,
        driver_id: Uuid,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_open()?;
        self.ensure_unit_state(kind, unit_id, UnitStatus::PendingAcceptance)?;

        self.raise(
            DispatchEventKind::UnitAccepted(UnitAccepted {
                request_id: self.id,
                unit_id,
                kind,
                driver_id,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// A driver finishes the en-route assignment of `unit_id`, producing a
    /// `UnitCompleted` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Unauthorized` if the unit is not en route on
    /// this request, or the request is completed.
    pub fn complete_unit(
        &mut self,
        kind: UnitKind,
        unit_id: Uuid,
        driver_id: Uuid,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_open()?;
        self.ensure_unit_state(kind, unit_id, UnitStatus::EnRoute)?;

        self.raise(
            DispatchEventKind::UnitCompleted(UnitCompleted {
                request_id: self.id,
                unit_id,
                kind,
                driver_id,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Settles the allocation drawn from `station_id`, producing a
    /// `PoliceSettled` event. Returns the officers to hand back.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Unauthorized` if the station has no unsettled
    /// allocation on this request, or the request is completed.
    pub fn settle_police(
        &mut self,
        station_id: Uuid,
        officer_id: Uuid,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<u32, DomainError> {
        self.ensure_open()?;
        let officers = self.unsettled_officers(station_id).ok_or_else(|| {
            DomainError::Unauthorized(format!(
                "station {station_id} has no open allocation on request {}",
                self.id
            ))
        })?;

        self.raise(
            DispatchEventKind::PoliceSettled(PoliceSettled {
                request_id: self.id,
                station_id,
                officers,
                officer_id,
            }),
            correlation_id,
            clock,
        );
        Ok(officers)
    }

    /// Completes the request if every assignment is finished, producing a
    /// `RequestCompleted` event. Returns whether it did.
    pub fn maybe_complete(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> bool {
        if self.withdrawn || self.status == RequestStatus::Completed || !self.is_ready_to_complete()
        {
            return false;
        }
        self.raise(
            DispatchEventKind::RequestCompleted(RequestCompleted {
                request_id: self.id,
            }),
            correlation_id,
            clock,
        );
        true
    }

    /// Withdraws the request, producing a `RequestWithdrawn` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if the request does not
    /// exist or was already withdrawn, and `DomainError::Unauthorized` if
    /// `caller_id` is not the requester.
    pub fn withdraw(
        &mut self,
        caller_id: Uuid,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if self.details()?.requester_id != caller_id {
            return Err(DomainError::Unauthorized(format!(
                "only the requester may delete request {}",
                self.id
            )));
        }
        self.raise(
            DispatchEventKind::RequestWithdrawn(RequestWithdrawn {
                request_id: self.id,
                withdrawn_by: caller_id,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Marks raised events as persisted.
    #[allow(clippy::cast_possible_wrap)]
    pub(crate) fn mark_committed(&mut self) {
        self.version += self.uncommitted_events.len() as i64;
        self.uncommitted_events.clear();
    }

    /// Rejects withdrawn, missing and completed requests.
    pub(crate) fn ensure_open(&self) -> Result<(), DomainError> {
        self.details()?;
        if self.status == RequestStatus::Completed {
            return Err(DomainError::Unauthorized(format!(
                "request {} is already completed",
                self.id
            )));
        }
        Ok(())
    }

    /// Requires `unit_id` to be in `expected` on this request.
    pub(crate) fn ensure_unit_state(
        &self,
        kind: UnitKind,
        unit_id: Uuid,
        expected: UnitStatus,
    ) -> Result<(), DomainError> {
        match self.unit_state(kind, unit_id) {
            Some(state) if state == expected => Ok(()),
            Some(state) => Err(DomainError::Unauthorized(format!(
                "{} {unit_id} is {state} on request {}, expected {expected}",
                kind.label(),
                self.id
            ))),
            None => Err(DomainError::Unauthorized(format!(
                "{} {unit_id} is not assigned to request {}",
                kind.label(),
                self.id
            ))),
        }
    }

    fn raise(&mut self, kind: DispatchEventKind, correlation_id: Uuid, clock: &dyn Clock) {
        let event = DispatchEvent {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                event_type: kind.event_type().to_owned(),
                aggregate_id: self.id,
                sequence_number: self.next_sequence_number(),
                correlation_id,
                causation_id: correlation_id,
                occurred_at: clock.now(),
            },
            kind,
        };
        self.mutate(&event);
        self.uncommitted_events.push(event);
    }

    fn mutate(&mut self, event: &DispatchEvent) {
        match &event.kind {
            DispatchEventKind::RequestCreated(payload) => {
                self.created_at = Some(event.metadata.occurred_at);
                self.status = payload.status;
                for (kind, units) in [
                    (UnitKind::Ambulance, &payload.ambulances),
                    (UnitKind::FireTruck, &payload.fire_trucks),
                ] {
                    for unit in units {
                        self.unit_states
                            .insert((kind, unit.unit_id), UnitStatus::PendingAcceptance);
                    }
                }
                self.police = payload
                    .police
                    .iter()
                    .cloned()
                    .map(|allocation| PoliceAssignment {
                        allocation,
                        settled: false,
                    })
                    .collect();
                self.created = Some(payload.clone());
            }
            DispatchEventKind::UnitAccepted(payload) => {
                self.unit_states
                    .insert((payload.kind, payload.unit_id), UnitStatus::EnRoute);
                if matches!(
                    self.status,
                    RequestStatus::Pending | RequestStatus::PartiallyAssigned
                ) {
                    self.status = RequestStatus::InProgress;
                }
            }
            DispatchEventKind::UnitCompleted(payload) => {
                self.unit_states
                    .insert((payload.kind, payload.unit_id), UnitStatus::Completed);
            }
            DispatchEventKind::PoliceSettled(payload) => {
                if let Some(assignment) = self
                    .police
                    .iter_mut()
                    .find(|p| !p.settled && p.allocation.station_id == payload.station_id)
                {
                    assignment.settled = true;
                }
            }
            DispatchEventKind::RequestCompleted(_) => {
                self.status = RequestStatus::Completed;
                self.completed_at = Some(event.metadata.occurred_at);
            }
            DispatchEventKind::RequestWithdrawn(_) => {
                self.withdrawn = true;
            }
        }
    }
}

impl AggregateRoot for EmergencyRequest {
    type Event = DispatchEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        self.mutate(event);
        self.version += 1;
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}
