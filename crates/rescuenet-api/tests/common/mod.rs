//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use rescuenet_core::fleet::UnitKind;
use rescuenet_core::geo::GeoPoint;
use rescuenet_core::identity::Actor;
use rescuenet_dispatch::config::DispatchConfig;
use rescuenet_test_support::{
    FixedClock, InMemoryBookingLogs, InMemoryEventRepository, InMemoryFleet,
    StaticIdentityDirectory, north_of, station_at, unit_at,
};
use tower::ServiceExt;
use uuid::Uuid;

use rescuenet_api::app;
use rescuenet_api::state::AppState;

/// Incident location used across the integration tests.
pub const ORIGIN: GeoPoint = GeoPoint::new(12.9716, 77.5946);

/// In-memory adapters behind a full router.
pub struct TestWorld {
    pub fleet: Arc<InMemoryFleet>,
    pub identity: Arc<StaticIdentityDirectory>,
    state: AppState,
}

impl TestWorld {
    /// An empty world with a fixed clock.
    pub fn new() -> Self {
        let fleet = Arc::new(InMemoryFleet::new());
        let identity = Arc::new(StaticIdentityDirectory::default());
        let state = AppState {
            clock: Arc::new(FixedClock(
                Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
            )),
            event_repository: Arc::new(InMemoryEventRepository::new()),
            fleet: fleet.clone(),
            booking_logs: Arc::new(InMemoryBookingLogs::new()),
            identity: identity.clone(),
            dispatch_config: DispatchConfig::default(),
        };
        Self {
            fleet,
            identity,
            state,
        }
    }

    /// A fresh router over the shared state. Uses the same route tree as
    /// `main.rs`.
    pub fn app(&self) -> Router {
        app(self.state.clone())
    }

    pub fn citizen(&self) -> Uuid {
        let user_id = Uuid::new_v4();
        self.identity.register(Actor::Citizen { user_id });
        user_id
    }

    /// A driven unit `km` north of [`ORIGIN`]; returns the driver's user id
    /// and the unit id.
    pub fn driver(&self, kind: UnitKind, registration: &str, km: f64) -> (Uuid, Uuid) {
        let user_id = Uuid::new_v4();
        let mut unit = unit_at(kind, registration, north_of(ORIGIN, km));
        unit.driver_id = Some(user_id);
        self.identity.register(match kind {
            UnitKind::Ambulance => Actor::AmbulanceDriver { user_id },
            UnitKind::FireTruck => Actor::FireDriver { user_id },
        });
        (user_id, self.fleet.add_unit(unit))
    }

    /// A station `km` north of [`ORIGIN`] with one registered officer;
    /// returns the officer's user id and the station id.
    pub fn station(&self, name: &str, km: f64, officers: u32) -> (Uuid, Uuid) {
        let station_id = self
            .fleet
            .add_station(station_at(name, north_of(ORIGIN, km), officers));
        let user_id = Uuid::new_v4();
        self.identity.register(Actor::PoliceOfficer {
            user_id,
            station_id,
        });
        (user_id, station_id)
    }
}

/// Sends a request as `user_id` and returns the status and JSON body.
pub async fn send(
    app: Router,
    method: &str,
    uri: &str,
    user_id: Option<Uuid>,
    body: Option<&serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user_id) = user_id {
        builder = builder.header("x-user-id", user_id.to_string());
    }
    let body = match body {
        Some(json) => Body::from(serde_json::to_vec(json).unwrap()),
        None => Body::empty(),
    };

    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}

/// Raises a request at [`ORIGIN`] and returns the response.
pub async fn raise(
    world: &TestWorld,
    requester: Uuid,
    needs: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let mut body = serde_json::json!({
        "issue_type": "building collapse",
        "latitude": ORIGIN.latitude,
        "longitude": ORIGIN.longitude,
    });
    if let (Some(body), Some(needs)) = (body.as_object_mut(), needs.as_object()) {
        body.extend(needs.clone());
    }
    send(
        world.app(),
        "POST",
        "/api/v1/requests",
        Some(requester),
        Some(&body),
    )
    .await
}
