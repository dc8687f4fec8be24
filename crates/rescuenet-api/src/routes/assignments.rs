//! Routes for drivers and police officers working their assignments.

use axum::extract::State;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rescuenet_core::fleet::UnitKind;
use rescuenet_core::geo::GeoPoint;
use rescuenet_dispatch::application::command_handlers::{self, CompletedPortion};
use rescuenet_dispatch::application::query_handlers;
use rescuenet_dispatch::domain::commands;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::CurrentActor;
use crate::state::AppState;

/// What a completion finished.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PortionView {
    /// An ambulance or fire truck.
    Unit {
        /// Ambulance or fire truck.
        kind: UnitKind,
        /// The unit.
        unit_id: Uuid,
        /// Its registration plate.
        registration: String,
    },
    /// A station's officers.
    Police {
        /// The station.
        station_id: Uuid,
        /// Officers returned.
        officers: u32,
    },
}

impl From<CompletedPortion> for PortionView {
    fn from(portion: CompletedPortion) -> Self {
        match portion {
            CompletedPortion::Unit {
                kind,
                unit_id,
                registration,
            } => Self::Unit {
                kind,
                unit_id,
                registration,
            },
            CompletedPortion::Police {
                station_id,
                officers,
            } => Self::Police {
                station_id,
                officers,
            },
        }
    }
}

/// Response body for POST /complete.
#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    /// The request worked on.
    pub request_id: Uuid,
    /// The part of it the caller finished.
    pub portion: PortionView,
    /// When the caller finished.
    pub completed_at: DateTime<Utc>,
    /// Minutes since the request was dispatched.
    pub minutes_elapsed: i64,
    /// Whether this completion finished the whole request.
    pub request_completed: bool,
}

/// Request body for PUT /location.
#[derive(Debug, Deserialize)]
pub struct LocationBody {
    /// New latitude.
    pub latitude: f64,
    /// New longitude.
    pub longitude: f64,
}

/// Response body for PUT /location.
#[derive(Debug, Serialize)]
pub struct UnitLocationResponse {
    /// The caller's unit.
    pub unit_id: Uuid,
    /// Its registration plate.
    pub registration: String,
    /// Its recorded position.
    pub location: GeoPoint,
    /// When the position was recorded.
    pub last_updated: DateTime<Utc>,
}

/// POST /complete
#[instrument(skip_all, fields(user_id = %actor.user_id()))]
async fn complete_assignment(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<CompletionResponse>, ApiError> {
    let command = commands::CompleteAssignment {
        correlation_id: Uuid::new_v4(),
        actor,
    };

    info!(correlation_id = %command.correlation_id, "handling complete_assignment command");

    let receipt = command_handlers::handle_complete_assignment(&command, state.dispatch()).await?;

    Ok(Json(CompletionResponse {
        request_id: receipt.request_id,
        portion: receipt.portion.into(),
        completed_at: receipt.completed_at,
        minutes_elapsed: receipt.minutes_elapsed,
        request_completed: receipt.request_completed,
    }))
}

/// GET /current/location
#[instrument(skip_all, fields(user_id = %actor.user_id()))]
async fn current_location(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<query_handlers::AssignmentLocation>, ApiError> {
    let location = query_handlers::get_current_assignment_location(
        &actor,
        &*state.fleet,
        &*state.event_repository,
    )
    .await?;
    Ok(Json(location))
}

/// GET /history
#[instrument(skip_all, fields(user_id = %actor.user_id()))]
async fn assignment_history(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<Vec<query_handlers::AssignmentHistoryEntry>>, ApiError> {
    let history =
        query_handlers::get_unit_history(&actor, &*state.fleet, &*state.event_repository).await?;
    Ok(Json(history))
}

/// PUT /location
#[instrument(skip_all, fields(user_id = %actor.user_id()))]
async fn update_location(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(body): Json<LocationBody>,
) -> Result<Json<UnitLocationResponse>, ApiError> {
    let command = commands::UpdateUnitLocation {
        correlation_id: Uuid::new_v4(),
        actor,
        location: GeoPoint::new(body.latitude, body.longitude),
    };

    let unit = command_handlers::handle_update_unit_location(&command, state.dispatch()).await?;

    Ok(Json(UnitLocationResponse {
        unit_id: unit.id,
        registration: unit.registration,
        location: unit.location,
        last_updated: unit.last_updated,
    }))
}

/// Returns the router for assignments.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/complete", post(complete_assignment))
        .route("/current/location", get(current_location))
        .route("/history", get(assignment_history))
        .route("/location", put(update_location))
}
