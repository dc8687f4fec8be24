//! Routes for raising, reading and withdrawing emergency requests.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use rescuenet_core::booking_log::BookingLog;
use rescuenet_core::fleet::OfficerAllocation;
use rescuenet_core::geo::GeoPoint;
use rescuenet_dispatch::application::{command_handlers, query_handlers};
use rescuenet_dispatch::domain::classifier::Fulfillment;
use rescuenet_dispatch::domain::commands;
use rescuenet_dispatch::domain::events::{AssignedUnit, Demand, RequestStatus};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::{CallerId, CurrentActor};
use crate::state::AppState;

fn default_for_self() -> bool {
    true
}

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    /// Free-form incident category.
    pub issue_type: String,
    /// Incident latitude.
    pub latitude: f64,
    /// Incident longitude.
    pub longitude: f64,
    /// Ambulances needed, if any.
    pub ambulance: Option<u32>,
    /// Police officers needed, if any.
    pub police: Option<u32>,
    /// Fire trucks needed, if any.
    pub fire_brigade: Option<u32>,
    /// Whether the caller is the victim.
    #[serde(default = "default_for_self")]
    pub for_self: bool,
    /// Victim contact number when reporting for someone else.
    pub victim_phone: Option<String>,
    /// Extra notes for responders.
    pub notes: Option<String>,
}

/// Response body for a dispatched request.
#[derive(Debug, Serialize)]
pub struct CreateRequestResponse {
    /// The new request.
    pub request_id: Uuid,
    /// Initial status.
    pub status: RequestStatus,
    /// Ambulance fulfillment.
    pub ambulance_status: Fulfillment,
    /// Police fulfillment.
    pub police_status: Fulfillment,
    /// Fire-truck fulfillment.
    pub fire_truck_status: Fulfillment,
    /// Ambulances reserved, nearest first.
    pub ambulances: Vec<AssignedUnit>,
    /// Fire trucks reserved, nearest first.
    pub fire_trucks: Vec<AssignedUnit>,
    /// Officers drawn per station, nearest first.
    pub police: Vec<OfficerAllocation>,
    /// Dispatch summary for the caller.
    pub notes: String,
    /// IDs of the domain events produced and persisted.
    pub event_ids: Vec<Uuid>,
}

/// Response body for POST /{id}/accept.
#[derive(Debug, Serialize)]
pub struct AcceptResponse {
    /// The request accepted.
    pub request_id: Uuid,
    /// The caller's unit.
    pub unit_id: Uuid,
    /// Its registration plate.
    pub registration: String,
    /// Request status after acceptance.
    pub status: RequestStatus,
}

/// Response body for DELETE /{id}.
#[derive(Debug, Serialize)]
pub struct WithdrawResponse {
    /// The request withdrawn.
    pub request_id: Uuid,
    /// Units put back to `AVAILABLE`.
    pub released_units: usize,
    /// Officers returned to their stations.
    pub returned_officers: u32,
}

/// POST /
#[instrument(skip_all, fields(requester_id = %requester_id))]
async fn create_request(
    State(state): State<AppState>,
    CallerId(requester_id): CallerId,
    Json(body): Json<CreateRequestBody>,
) -> Result<(StatusCode, Json<CreateRequestResponse>), ApiError> {
    let command = commands::CreateEmergencyRequest {
        correlation_id: Uuid::new_v4(),
        requester_id,
        location: GeoPoint::checked(body.latitude, body.longitude)?,
        issue_type: body.issue_type,
        demand: Demand::from_needs(body.ambulance, body.police, body.fire_brigade)?,
        for_self: body.for_self,
        victim_phone: body.victim_phone,
        notes: body.notes,
    };

    info!(correlation_id = %command.correlation_id, "handling create_request command");

    let result = command_handlers::handle_create_request(&command, state.dispatch()).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateRequestResponse {
            request_id: result.request_id,
            status: result.status,
            ambulance_status: result.fulfillment.ambulance,
            police_status: result.fulfillment.police,
            fire_truck_status: result.fulfillment.fire_truck,
            ambulances: result.ambulances,
            fire_trucks: result.fire_trucks,
            police: result.police,
            notes: result.notes,
            event_ids: result.stored_events.iter().map(|e| e.event_id).collect(),
        }),
    ))
}

/// GET /history
#[instrument(skip_all, fields(requester_id = %requester_id))]
async fn get_request_history(
    State(state): State<AppState>,
    CallerId(requester_id): CallerId,
) -> Result<Json<Vec<query_handlers::RequestSummary>>, ApiError> {
    let history =
        query_handlers::get_request_history(requester_id, &*state.event_repository).await?;
    Ok(Json(history))
}

/// GET /{id}
#[instrument(skip_all, fields(%request_id))]
async fn get_request_detail(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<query_handlers::RequestView>, ApiError> {
    let view = query_handlers::get_request_detail(request_id, &*state.event_repository).await?;
    Ok(Json(view))
}

/// GET /{id}/log
#[instrument(skip_all, fields(%request_id))]
async fn get_booking_log(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<BookingLog>, ApiError> {
    let log = query_handlers::get_booking_log(request_id, &*state.booking_logs).await?;
    Ok(Json(log))
}

/// DELETE /{id}
#[instrument(skip_all, fields(%request_id, caller_id = %caller_id))]
async fn withdraw_request(
    State(state): State<AppState>,
    CallerId(caller_id): CallerId,
    Path(request_id): Path<Uuid>,
) -> Result<Json<WithdrawResponse>, ApiError> {
    let command = commands::WithdrawRequest {
        correlation_id: Uuid::new_v4(),
        request_id,
        caller_id,
    };

    info!(correlation_id = %command.correlation_id, "handling withdraw_request command");

    let result = command_handlers::handle_withdraw_request(&command, state.dispatch()).await?;

    Ok(Json(WithdrawResponse {
        request_id: result.request_id,
        released_units: result.released_units,
        returned_officers: result.returned_officers,
    }))
}

/// POST /{id}/accept
#[instrument(skip_all, fields(%request_id, user_id = %actor.user_id()))]
async fn accept_assignment(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(request_id): Path<Uuid>,
) -> Result<Json<AcceptResponse>, ApiError> {
    let command = commands::AcceptAssignment {
        correlation_id: Uuid::new_v4(),
        request_id,
        actor,
    };

    info!(correlation_id = %command.correlation_id, "handling accept_assignment command");

    let result = command_handlers::handle_accept_assignment(&command, state.dispatch()).await?;

    Ok(Json(AcceptResponse {
        request_id: result.request_id,
        unit_id: result.unit_id,
        registration: result.registration,
        status: result.status,
    }))
}

/// Returns the router for emergency requests.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_request))
        .route("/history", get(get_request_history))
        .route(
            "/{request_id}",
            get(get_request_detail).delete(withdraw_request),
        )
        .route("/{request_id}/log", get(get_booking_log))
        .route("/{request_id}/accept", post(accept_assignment))
}
