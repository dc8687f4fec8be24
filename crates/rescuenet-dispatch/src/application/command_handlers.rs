//! Command handlers for the Dispatch context.
//!
//! Handlers load the emergency request, run the domain method, and append
//! the resulting events with optimistic concurrency. Units and officers
//! change in the fleet store alongside, through conditional updates that are
//! undone when the request cannot be recorded.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rescuenet_core::aggregate::AggregateRoot;
use rescuenet_core::booking_log::{BookingLog, BookingLogEntry};
use rescuenet_core::command::Command;
use rescuenet_core::error::DomainError;
use rescuenet_core::event::{DomainEvent, EventMetadata};
use rescuenet_core::fleet::{
    FleetRepository, OfficerAllocation, Unit, UnitClaim, UnitKind, UnitStatus,
};
use rescuenet_core::geo::GeoPoint;
use rescuenet_core::identity::Actor;
use rescuenet_core::repository::{EventRepository, StoredEvent};
use tracing::{info, warn};
use uuid::Uuid;

use super::DispatchContext;
use super::allocation::{
    UnitSearch, allocate_officers, allocate_units, release_unit, return_officers,
};
use crate::domain::aggregates::{EmergencyRequest, Reservation};
use crate::domain::classifier::ServiceFulfillment;
use crate::domain::commands::{
    AcceptAssignment, CompleteAssignment, CreateEmergencyRequest, UpdateUnitLocation,
    WithdrawRequest,
};
use crate::domain::events::{
    AssignedUnit, DispatchEvent, DispatchEventKind, POLICE_SETTLED_EVENT_TYPE,
    REQUEST_CREATED_EVENT_TYPE, RequestStatus, settlement_filter, station_filter,
};

/// Appends attempted before a concurrency conflict is returned.
const MAX_APPEND_ATTEMPTS: u32 = 3;

/// Result of a dispatched emergency request.
#[derive(Debug)]
pub struct CreateRequestResult {
    /// The new request.
    pub request_id: Uuid,
    /// Initial overall status.
    pub status: RequestStatus,
    /// Classification of each service.
    pub fulfillment: ServiceFulfillment,
    /// Reserved ambulances, nearest first.
    pub ambulances: Vec<AssignedUnit>,
    /// Reserved fire trucks, nearest first.
    pub fire_trucks: Vec<AssignedUnit>,
    /// Officers drawn per station, nearest first.
    pub police: Vec<OfficerAllocation>,
    /// Human-readable fulfillment summary.
    pub notes: String,
    /// The stored events produced and persisted.
    pub stored_events: Vec<StoredEvent>,
}

/// Result of an accepted assignment.
#[derive(Debug)]
pub struct AcceptResult {
    /// The request accepted.
    pub request_id: Uuid,
    /// The accepting unit.
    pub unit_id: Uuid,
    /// Its registration plate.
    pub registration: String,
    /// Overall request status after acceptance.
    pub status: RequestStatus,
}

/// The part of a request a completion finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletedPortion {
    /// An ambulance or fire truck.
    Unit {
        /// Ambulance or fire truck.
        kind: UnitKind,
        /// The unit.
        unit_id: Uuid,
        /// Its registration plate.
        registration: String,
    },
    /// A station's police allocation.
    Police {
        /// The station.
        station_id: Uuid,
        /// Officers returned to it.
        officers: u32,
    },
}

/// Proof of a completed assignment.
#[derive(Debug)]
pub struct CompletionReceipt {
    /// The request the assignment belonged to.
    pub request_id: Uuid,
    /// What was completed.
    pub portion: CompletedPortion,
    /// When.
    pub completed_at: DateTime<Utc>,
    /// Whole minutes since the request was dispatched.
    pub minutes_elapsed: i64,
    /// Whether this completion finished the whole request.
    pub request_completed: bool,
}

/// Result of a withdrawn request.
#[derive(Debug)]
pub struct WithdrawResult {
    /// The withdrawn request.
    pub request_id: Uuid,
    /// Units handed back to the pool.
    pub released_units: usize,
    /// Officers handed back to their stations.
    pub returned_officers: u32,
}

/// Reconstitutes an `EmergencyRequest` from stored events.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if event deserialization fails.
pub(crate) fn reconstitute(
    request_id: Uuid,
    existing_events: &[StoredEvent],
) -> Result<EmergencyRequest, DomainError> {
    let mut request = EmergencyRequest::new(request_id);
    for stored in existing_events {
        let kind: DispatchEventKind =
            serde_json::from_value(stored.payload.clone()).map_err(|e| {
                DomainError::Infrastructure(format!("event deserialization failed: {e}"))
            })?;
        let event = DispatchEvent {
            metadata: EventMetadata::from_stored(stored),
            kind,
        };
        request.apply(&event);
    }
    Ok(request)
}

/// Loads a live request.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for unknown or withdrawn
/// requests.
pub(crate) async fn load_request(
    repo: &dyn EventRepository,
    request_id: Uuid,
) -> Result<EmergencyRequest, DomainError> {
    let existing_events = repo.load_events(request_id).await?;
    if existing_events.is_empty() {
        return Err(DomainError::AggregateNotFound(request_id));
    }
    let request = reconstitute(request_id, &existing_events)?;
    request.details()?;
    Ok(request)
}

async fn persist(
    repo: &dyn EventRepository,
    request: &mut EmergencyRequest,
) -> Result<Vec<StoredEvent>, DomainError> {
    let stored_events: Vec<StoredEvent> = request
        .uncommitted_events()
        .iter()
        .map(DomainEvent::to_stored_event)
        .collect();
    repo.append_events(request.id, request.version(), &stored_events)
        .await?;
    request.mark_committed();
    Ok(stored_events)
}

/// Loads the request, applies `change`, and appends the result, reloading
/// and retrying when another writer appended first.
async fn update_request<T>(
    repo: &dyn EventRepository,
    request_id: Uuid,
    mut change: impl FnMut(&mut EmergencyRequest) -> Result<T, DomainError>,
) -> Result<(EmergencyRequest, T), DomainError> {
    let mut attempt = 1;
    loop {
        let mut request = load_request(repo, request_id).await?;
        let outcome = change(&mut request)?;
        match persist(repo, &mut request).await {
            Ok(_) => return Ok((request, outcome)),
            Err(DomainError::ConcurrencyConflict { .. }) if attempt < MAX_APPEND_ATTEMPTS => {
                warn!(%request_id, attempt, "request changed concurrently, retrying");
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

/// Appends a follow-on booking log entry. Failures are logged, not returned.
async fn note(ctx: DispatchContext<'_>, request_id: Uuid, message: String) {
    let entry = BookingLogEntry {
        message,
        recorded_at: ctx.clock.now(),
    };
    if let Err(error) = ctx.booking_logs.append_entry(request_id, entry).await {
        warn!(%request_id, %error, "failed to append booking log entry");
    }
}

/// Puts a unit back under `claim` after the request refused a change.
async fn rollback_unit(
    ctx: DispatchContext<'_>,
    unit_id: Uuid,
    current: UnitClaim,
    claim: UnitClaim,
) {
    match ctx
        .fleet
        .transition_unit(unit_id, current, claim, ctx.clock.now())
        .await
    {
        Ok(true) => {}
        Ok(false) => warn!(%unit_id, "unit moved on before its transition could be rolled back"),
        Err(error) => warn!(%unit_id, %error, "failed to roll back unit transition"),
    }
}

/// Takes back officers returned for a settlement that could not be recorded.
async fn reclaim_officers(ctx: DispatchContext<'_>, station_id: Uuid, officers: u32) {
    match ctx
        .fleet
        .take_officers(station_id, officers, ctx.clock.now())
        .await
    {
        Ok(true) => {}
        Ok(false) => warn!(%station_id, officers, "officers were redeployed before their return could be undone"),
        Err(error) => warn!(%station_id, %error, "failed to undo officer return"),
    }
}

async fn release_reservation(
    ctx: DispatchContext<'_>,
    request_id: Uuid,
    reservation: &Reservation,
) {
    for unit in reservation.ambulances.iter().chain(&reservation.fire_trucks) {
        release_unit(
            ctx.fleet,
            unit.unit_id,
            UnitClaim::pending(request_id),
            ctx.clock,
        )
        .await;
    }
    return_officers(ctx.fleet, &reservation.police, ctx.clock).await;
}

async fn reserve(
    ctx: DispatchContext<'_>,
    command: &CreateEmergencyRequest,
    request_id: Uuid,
    reservation: &mut Reservation,
) -> Result<(), DomainError> {
    let demand = command.demand;
    reservation.ambulances = allocate_units(
        ctx.fleet,
        ctx.config,
        &UnitSearch {
            kind: UnitKind::Ambulance,
            origin: command.location,
            required: demand.ambulances,
            request_id,
        },
        ctx.clock,
    )
    .await?;
    reservation.police =
        allocate_officers(ctx.fleet, command.location, demand.officers, ctx.clock).await?;
    reservation.fire_trucks = allocate_units(
        ctx.fleet,
        ctx.config,
        &UnitSearch {
            kind: UnitKind::FireTruck,
            origin: command.location,
            required: demand.fire_trucks,
            request_id,
        },
        ctx.clock,
    )
    .await?;
    Ok(())
}

/// Handles `CreateEmergencyRequest`: reserves the nearest units and officers,
/// records the request and writes its booking log.
///
/// Either everything is recorded or every reservation is released and the
/// error returned.
///
/// # Errors
///
/// Returns `DomainError::Validation` for an empty demand or bad coordinates,
/// `DomainError::EntityNotFound` for an unknown requester, or the error of
/// the store that failed.
pub async fn handle_create_request(
    command: &CreateEmergencyRequest,
    ctx: DispatchContext<'_>,
) -> Result<CreateRequestResult, DomainError> {
    if command.demand.is_empty() {
        return Err(DomainError::Validation(
            "at least one service must be requested".to_owned(),
        ));
    }
    GeoPoint::checked(command.location.latitude, command.location.longitude)?;
    if ctx.identity.resolve(command.requester_id).await?.is_none() {
        return Err(DomainError::not_found("user", command.requester_id));
    }

    let request_id = Uuid::new_v4();
    info!(
        %request_id,
        command = command.command_type(),
        correlation_id = %command.correlation_id(),
        "dispatching emergency request"
    );

    let mut reservation = Reservation::default();
    if let Err(error) = reserve(ctx, command, request_id, &mut reservation).await {
        release_reservation(ctx, request_id, &reservation).await;
        return Err(error);
    }

    let mut request = EmergencyRequest::new(request_id);
    let fulfillment = match request.create(command, &reservation, ctx.clock) {
        Ok(fulfillment) => fulfillment,
        Err(error) => {
            release_reservation(ctx, request_id, &reservation).await;
            return Err(error);
        }
    };
    let stored_events = match persist(ctx.events, &mut request).await {
        Ok(stored_events) => stored_events,
        Err(error) => {
            warn!(%request_id, %error, "failed to record request, releasing reservations");
            release_reservation(ctx, request_id, &reservation).await;
            return Err(error);
        }
    };

    let log = BookingLog {
        request_id,
        ambulances: reservation.ambulances.iter().map(|u| u.unit_id).collect(),
        fire_trucks: reservation.fire_trucks.iter().map(|u| u.unit_id).collect(),
        police: reservation.police.clone(),
        status_message: fulfillment.summary(),
        created_at: ctx.clock.now(),
        entries: Vec::new(),
    };
    if let Err(error) = ctx.booking_logs.insert(&log).await {
        warn!(%request_id, %error, "failed to write booking log, abandoning request");
        release_reservation(ctx, request_id, &reservation).await;
        let tombstone =
            match request.withdraw(command.requester_id, command.correlation_id, ctx.clock) {
                Ok(()) => persist(ctx.events, &mut request).await.map(drop),
                Err(e) => Err(e),
            };
        if let Err(tombstone_error) = tombstone {
            warn!(%request_id, error = %tombstone_error, "failed to withdraw abandoned request");
        }
        return Err(error);
    }

    info!(
        %request_id,
        status = %request.status(),
        ambulance = %fulfillment.ambulance,
        police = %fulfillment.police,
        fire = %fulfillment.fire_truck,
        "emergency request dispatched"
    );

    Ok(CreateRequestResult {
        request_id,
        status: request.status(),
        fulfillment,
        ambulances: reservation.ambulances,
        fire_trucks: reservation.fire_trucks,
        police: reservation.police,
        notes: fulfillment.notes(),
        stored_events,
    })
}

/// The unit driven by `actor`, checked against the actor's role.
pub(crate) async fn driver_unit(
    fleet: &dyn FleetRepository,
    actor: &Actor,
) -> Result<(UnitKind, Unit), DomainError> {
    let kind = actor.driven_unit_kind().ok_or_else(|| {
        DomainError::Unauthorized("only ambulance and fire truck drivers drive units".to_owned())
    })?;
    let driver_id = actor.user_id();
    let unit = fleet
        .find_unit_by_driver(driver_id)
        .await?
        .ok_or_else(|| {
            DomainError::Unauthorized(format!("no unit is registered to driver {driver_id}"))
        })?;
    if unit.kind != kind {
        return Err(DomainError::Unauthorized(format!(
            "driver {driver_id} drives a {}, not a {kind}",
            unit.kind
        )));
    }
    Ok((kind, unit))
}

/// Handles `AcceptAssignment`: the driver's unit moves from
/// `PENDING_ACCEPTANCE` to `EN_ROUTE` on the request.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown request and
/// `DomainError::Unauthorized` when the caller's unit is not awaiting
/// acceptance on it.
pub async fn handle_accept_assignment(
    command: &AcceptAssignment,
    ctx: DispatchContext<'_>,
) -> Result<AcceptResult, DomainError> {
    let request_id = command.request_id;
    let (kind, unit) = driver_unit(ctx.fleet, &command.actor).await?;
    let request = load_request(ctx.events, request_id).await?;
    request.ensure_open()?;
    request.ensure_unit_state(kind, unit.id, UnitStatus::PendingAcceptance)?;

    let moved = ctx
        .fleet
        .transition_unit(
            unit.id,
            UnitClaim::pending(request_id),
            UnitClaim::en_route(request_id),
            ctx.clock.now(),
        )
        .await?;
    if !moved {
        return Err(DomainError::Unauthorized(format!(
            "{} {} is not awaiting acceptance for request {request_id}",
            kind.label(),
            unit.registration
        )));
    }

    let driver_id = command.actor.user_id();
    let updated = update_request(ctx.events, request_id, |request| {
        request.accept_unit(kind, unit.id, driver_id, command.correlation_id, ctx.clock)
    })
    .await;
    let (request, ()) = match updated {
        Ok(updated) => updated,
        Err(error) => {
            // A withdrawn request no longer holds the unit.
            let restored = if matches!(error, DomainError::AggregateNotFound(_)) {
                UnitClaim::available()
            } else {
                UnitClaim::pending(request_id)
            };
            rollback_unit(ctx, unit.id, UnitClaim::en_route(request_id), restored).await;
            return Err(error);
        }
    };

    info!(%request_id, unit_id = %unit.id, kind = %kind, "assignment accepted");
    note(
        ctx,
        request_id,
        format!("{} {} accepted the assignment", kind.label(), unit.registration),
    )
    .await;

    Ok(AcceptResult {
        request_id,
        unit_id: unit.id,
        registration: unit.registration,
        status: request.status(),
    })
}

/// Handles `CompleteAssignment` for a driver or a police officer.
///
/// A driver completes the request their unit is en route to. An officer
/// settles the oldest open allocation drawn from their station.
///
/// # Errors
///
/// Returns `DomainError::Unauthorized` when the caller has no open
/// assignment to complete, and store errors otherwise.
pub async fn handle_complete_assignment(
    command: &CompleteAssignment,
    ctx: DispatchContext<'_>,
) -> Result<CompletionReceipt, DomainError> {
    match command.actor {
        Actor::AmbulanceDriver { .. } | Actor::FireDriver { .. } => {
            complete_unit(command, ctx).await
        }
        Actor::PoliceOfficer {
            user_id,
            station_id,
        } => complete_police(command, user_id, station_id, ctx).await,
        Actor::Citizen { .. } => Err(DomainError::Unauthorized(
            "only drivers and police officers complete assignments".to_owned(),
        )),
    }
}

fn receipt(
    request: &EmergencyRequest,
    portion: CompletedPortion,
    completed_at: DateTime<Utc>,
    request_completed: bool,
) -> CompletionReceipt {
    let created_at = request.created_at().unwrap_or(completed_at);
    CompletionReceipt {
        request_id: request.id,
        portion,
        completed_at,
        minutes_elapsed: (completed_at - created_at).num_minutes(),
        request_completed,
    }
}

async fn complete_unit(
    command: &CompleteAssignment,
    ctx: DispatchContext<'_>,
) -> Result<CompletionReceipt, DomainError> {
    let (kind, unit) = driver_unit(ctx.fleet, &command.actor).await?;
    let no_assignment = || {
        DomainError::Unauthorized(format!(
            "{} {} has no en-route assignment to complete",
            kind.label(),
            unit.registration
        ))
    };
    let request_id = match unit.claim() {
        UnitClaim {
            status: UnitStatus::EnRoute,
            request_id: Some(request_id),
        } => request_id,
        _ => return Err(no_assignment()),
    };
    let request = load_request(ctx.events, request_id).await?;
    request.ensure_open()?;
    request.ensure_unit_state(kind, unit.id, UnitStatus::EnRoute)?;

    let completed_at = ctx.clock.now();
    let freed = ctx
        .fleet
        .transition_unit(
            unit.id,
            UnitClaim::en_route(request_id),
            UnitClaim::available(),
            completed_at,
        )
        .await?;
    if !freed {
        return Err(no_assignment());
    }

    let driver_id = command.actor.user_id();
    let updated = update_request(ctx.events, request_id, |request| {
        request.complete_unit(kind, unit.id, driver_id, command.correlation_id, ctx.clock)?;
        Ok(request.maybe_complete(command.correlation_id, ctx.clock))
    })
    .await;
    let (request, request_completed) = match updated {
        Ok(updated) => updated,
        Err(error) => {
            // A withdrawn request no longer holds the unit, so it stays free.
            if !matches!(error, DomainError::AggregateNotFound(_)) {
                rollback_unit(
                    ctx,
                    unit.id,
                    UnitClaim::available(),
                    UnitClaim::en_route(request_id),
                )
                .await;
            }
            return Err(error);
        }
    };

    info!(%request_id, unit_id = %unit.id, kind = %kind, request_completed, "unit completed assignment");
    note(
        ctx,
        request_id,
        format!("{} {} completed its assignment", kind.label(), unit.registration),
    )
    .await;
    if request_completed {
        note(ctx, request_id, "Request completed".to_owned()).await;
    }

    Ok(receipt(
        &request,
        CompletedPortion::Unit {
            kind,
            unit_id: unit.id,
            registration: unit.registration,
        },
        completed_at,
        request_completed,
    ))
}

async fn complete_police(
    command: &CompleteAssignment,
    officer_id: Uuid,
    station_id: Uuid,
    ctx: DispatchContext<'_>,
) -> Result<CompletionReceipt, DomainError> {
    let settled: HashSet<Uuid> = ctx
        .events
        .find_aggregate_ids(POLICE_SETTLED_EVENT_TYPE, &settlement_filter(station_id))
        .await?
        .into_iter()
        .collect();
    let candidates = ctx
        .events
        .find_aggregate_ids(REQUEST_CREATED_EVENT_TYPE, &station_filter(station_id))
        .await?;

    for request_id in candidates.into_iter().filter(|id| !settled.contains(id)) {
        let request = match load_request(ctx.events, request_id).await {
            Ok(request) => request,
            Err(DomainError::AggregateNotFound(_)) => continue,
            Err(error) => return Err(error),
        };
        if request.status() == RequestStatus::Completed {
            continue;
        }
        let Some(officers) = request.unsettled_officers(station_id) else {
            continue;
        };

        // Officers go back before the settlement is recorded, and are taken
        // again if it cannot be.
        let completed_at = ctx.clock.now();
        ctx.fleet
            .return_officers(station_id, officers, completed_at)
            .await?;

        let updated = update_request(ctx.events, request_id, |request| {
            let officers =
                request.settle_police(station_id, officer_id, command.correlation_id, ctx.clock)?;
            Ok((
                officers,
                request.maybe_complete(command.correlation_id, ctx.clock),
            ))
        })
        .await;
        let (request, (officers, request_completed)) = match updated {
            Ok(updated) => updated,
            Err(error) => {
                reclaim_officers(ctx, station_id, officers).await;
                match error {
                    // Settled by another officer of the station, or withdrawn, in the meantime.
                    DomainError::Unauthorized(_) | DomainError::AggregateNotFound(_) => continue,
                    error => return Err(error),
                }
            }
        };

        info!(%request_id, %station_id, officers, request_completed, "police allocation settled");
        note(
            ctx,
            request_id,
            format!("{officers} officer(s) from station {station_id} completed their assignment"),
        )
        .await;
        if request_completed {
            note(ctx, request_id, "Request completed".to_owned()).await;
        }

        return Ok(receipt(
            &request,
            CompletedPortion::Police {
                station_id,
                officers,
            },
            completed_at,
            request_completed,
        ));
    }

    Err(DomainError::Unauthorized(format!(
        "station {station_id} has no open police assignment"
    )))
}

/// Handles `WithdrawRequest`: tombstones the request and hands every unit
/// and officer still on it back to the pool.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown request and
/// `DomainError::Unauthorized` when the caller is not the requester.
pub async fn handle_withdraw_request(
    command: &WithdrawRequest,
    ctx: DispatchContext<'_>,
) -> Result<WithdrawResult, DomainError> {
    let request_id = command.request_id;
    let (request, ()) = update_request(ctx.events, request_id, |request| {
        request.withdraw(command.caller_id, command.correlation_id, ctx.clock)
    })
    .await?;

    let open_units = request.open_units();
    for &(_, unit_id, state) in &open_units {
        let held = if state == UnitStatus::EnRoute {
            UnitClaim::en_route(request_id)
        } else {
            UnitClaim::pending(request_id)
        };
        release_unit(ctx.fleet, unit_id, held, ctx.clock).await;
    }
    let unsettled: Vec<OfficerAllocation> = request
        .police()
        .iter()
        .filter(|p| !p.settled)
        .map(|p| p.allocation.clone())
        .collect();
    return_officers(ctx.fleet, &unsettled, ctx.clock).await;

    info!(%request_id, released_units = open_units.len(), "request withdrawn");
    note(ctx, request_id, "Request withdrawn by requester".to_owned()).await;

    Ok(WithdrawResult {
        request_id,
        released_units: open_units.len(),
        returned_officers: unsettled.iter().map(|a| a.officers).sum(),
    })
}

/// Handles `UpdateUnitLocation`: moves the caller's own unit.
///
/// # Errors
///
/// Returns `DomainError::Validation` for bad coordinates and
/// `DomainError::Unauthorized` when the caller drives no unit.
pub async fn handle_update_unit_location(
    command: &UpdateUnitLocation,
    ctx: DispatchContext<'_>,
) -> Result<Unit, DomainError> {
    let location = GeoPoint::checked(command.location.latitude, command.location.longitude)?;
    let (_, unit) = driver_unit(ctx.fleet, &command.actor).await?;
    let at = ctx.clock.now();
    ctx.fleet.update_unit_location(unit.id, location, at).await?;
    info!(unit_id = %unit.id, "unit location updated");
    Ok(Unit {
        location,
        last_updated: at,
        ..unit
    })
}
