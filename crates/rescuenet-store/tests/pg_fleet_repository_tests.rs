//! Integration tests for the fleet, identity and booking log adapters.
#![cfg(feature = "pg-tests")]

use chrono::{SubsecRound, Utc};
use rescuenet_core::booking_log::{BookingLog, BookingLogEntry, BookingLogRepository};
use rescuenet_core::error::DomainError;
use rescuenet_core::fleet::{FleetRepository, OfficerAllocation, UnitClaim, UnitKind, UnitStatus};
use rescuenet_core::geo::GeoPoint;
use rescuenet_core::identity::{Actor, IdentityDirectory};
use rescuenet_store::pg_booking_log_repository::PgBookingLogRepository;
use rescuenet_store::pg_fleet_repository::PgFleetRepository;
use rescuenet_store::pg_identity_directory::PgIdentityDirectory;
use sqlx::PgPool;
use uuid::Uuid;

const ORIGIN: GeoPoint = GeoPoint::new(12.9716, 77.5946);

/// Latitude offset of roughly one kilometre.
const ONE_KM_LAT: f64 = 1.0 / 111.194_926_644_558_73;

async fn insert_unit(pool: &PgPool, kind: UnitKind, km_north: f64, driver_id: Option<Uuid>) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO units (id, kind, registration, latitude, longitude, home_base_id, driver_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(id)
    .bind(kind.as_str())
    .bind(format!("KA-{}", &id.simple().to_string()[..8]))
    .bind(ORIGIN.latitude + km_north * ONE_KM_LAT)
    .bind(ORIGIN.longitude)
    .bind(Uuid::new_v4())
    .bind(driver_id)
    .execute(pool)
    .await
    .unwrap();
    id
}

async fn insert_station(pool: &PgPool, name: &str, km_north: f64, officers: i32) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO police_stations (id, name, latitude, longitude, available_officers) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id)
    .bind(name)
    .bind(ORIGIN.latitude + km_north * ONE_KM_LAT)
    .bind(ORIGIN.longitude)
    .bind(officers)
    .execute(pool)
    .await
    .unwrap();
    id
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_available_units_are_filtered_by_radius_and_sorted(pool: PgPool) {
    // Arrange
    let far = insert_unit(&pool, UnitKind::Ambulance, 4.0, None).await;
    let near = insert_unit(&pool, UnitKind::Ambulance, 0.5, None).await;
    insert_unit(&pool, UnitKind::Ambulance, 12.0, None).await;
    insert_unit(&pool, UnitKind::FireTruck, 0.2, None).await;
    let fleet = PgFleetRepository::new(pool);

    // Act
    let units = fleet
        .find_available_units(UnitKind::Ambulance, ORIGIN, 5.0)
        .await
        .unwrap();

    // Assert
    let ids: Vec<Uuid> = units.iter().map(|u| u.unit.id).collect();
    assert_eq!(ids, vec![near, far]);
    assert!((units[0].distance_km - 0.5).abs() < 0.01);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_transition_unit_only_applies_to_the_expected_claim(pool: PgPool) {
    // Arrange
    let unit_id = insert_unit(&pool, UnitKind::FireTruck, 1.0, None).await;
    let fleet = PgFleetRepository::new(pool);
    let request_a = Uuid::new_v4();
    let request_b = Uuid::new_v4();

    // Act
    let first = fleet
        .transition_unit(unit_id, UnitClaim::available(), UnitClaim::pending(request_a), Utc::now())
        .await
        .unwrap();
    let second = fleet
        .transition_unit(unit_id, UnitClaim::available(), UnitClaim::pending(request_b), Utc::now())
        .await
        .unwrap();

    // Assert
    assert!(first);
    assert!(!second);
    let unit = fleet.find_unit(unit_id).await.unwrap().unwrap();
    assert_eq!(unit.status, UnitStatus::PendingAcceptance);
    assert_eq!(unit.active_request, Some(request_a));
    assert!(
        fleet
            .find_available_units(UnitKind::FireTruck, ORIGIN, 10.0)
            .await
            .unwrap()
            .is_empty()
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_unit_is_found_by_driver_and_relocated(pool: PgPool) {
    let driver = Uuid::new_v4();
    let unit_id = insert_unit(&pool, UnitKind::Ambulance, 1.0, Some(driver)).await;
    let fleet = PgFleetRepository::new(pool);
    let moved = GeoPoint::new(13.0, 77.6);

    fleet
        .update_unit_location(unit_id, moved, Utc::now())
        .await
        .unwrap();

    let unit = fleet.find_unit_by_driver(driver).await.unwrap().unwrap();
    assert_eq!(unit.id, unit_id);
    assert_eq!(unit.location, moved);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_relocating_unknown_unit_is_not_found(pool: PgPool) {
    let fleet = PgFleetRepository::new(pool);

    let result = fleet
        .update_unit_location(Uuid::new_v4(), ORIGIN, Utc::now())
        .await;

    assert!(matches!(result, Err(DomainError::EntityNotFound { entity: "unit", .. })));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_take_officers_never_overdraws_a_station(pool: PgPool) {
    // Arrange
    let station_id = insert_station(&pool, "Central", 1.0, 3).await;
    let fleet = PgFleetRepository::new(pool);

    // Act
    let too_many = fleet.take_officers(station_id, 4, Utc::now()).await.unwrap();
    let taken = fleet.take_officers(station_id, 3, Utc::now()).await.unwrap();
    fleet
        .return_officers(station_id, 2, Utc::now())
        .await
        .unwrap();

    // Assert
    assert!(!too_many);
    assert!(taken);
    let station = fleet.find_station(station_id).await.unwrap().unwrap();
    assert_eq!(station.available_officers, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_stations_are_listed_nearest_first(pool: PgPool) {
    let far = insert_station(&pool, "Far", 3.0, 1).await;
    let near = insert_station(&pool, "Near", 1.0, 0).await;
    let fleet = PgFleetRepository::new(pool);

    let stations = fleet.stations_by_proximity(ORIGIN).await.unwrap();

    let ids: Vec<Uuid> = stations.iter().map(|s| s.station.id).collect();
    assert_eq!(ids, vec![near, far]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_antipodal_station_is_still_listed(pool: PgPool) {
    // Arrange
    let near = insert_station(&pool, "Near", 1.0, 2).await;
    let antipode = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO police_stations (id, name, latitude, longitude, available_officers) \
         VALUES ($1, 'Antipode', $2, $3, 1)",
    )
    .bind(antipode)
    .bind(-ORIGIN.latitude)
    .bind(ORIGIN.longitude - 180.0)
    .execute(&pool)
    .await
    .unwrap();
    let fleet = PgFleetRepository::new(pool);

    // Act
    let stations = fleet.stations_by_proximity(ORIGIN).await.unwrap();

    // Assert
    let ids: Vec<Uuid> = stations.iter().map(|s| s.station.id).collect();
    assert_eq!(ids, vec![near, antipode]);
    assert!(stations[1].distance_km.is_finite());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_identity_directory_resolves_roles(pool: PgPool) {
    // Arrange
    let station_id = insert_station(&pool, "Central", 1.0, 3).await;
    let citizen = Uuid::new_v4();
    let officer = Uuid::new_v4();
    for (user_id, role, station) in [
        (citizen, "citizen", None),
        (officer, "police_officer", Some(station_id)),
    ] {
        sqlx::query("INSERT INTO users (user_id, role, station_id) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(role)
            .bind(station)
            .execute(&pool)
            .await
            .unwrap();
    }
    let identity = PgIdentityDirectory::new(pool);

    // Act / Assert
    assert_eq!(
        identity.resolve(citizen).await.unwrap(),
        Some(Actor::Citizen { user_id: citizen })
    );
    assert_eq!(
        identity.resolve(officer).await.unwrap(),
        Some(Actor::PoliceOfficer {
            user_id: officer,
            station_id
        })
    );
    assert_eq!(identity.resolve(Uuid::new_v4()).await.unwrap(), None);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_booking_log_round_trip_with_entries(pool: PgPool) {
    // Arrange
    let logs = PgBookingLogRepository::new(pool);
    let created_at = Utc::now().trunc_subsecs(6);
    let log = BookingLog {
        request_id: Uuid::new_v4(),
        ambulances: vec![Uuid::new_v4()],
        fire_trucks: Vec::new(),
        police: vec![OfficerAllocation {
            station_id: Uuid::new_v4(),
            station_name: "Central".to_owned(),
            officers: 2,
        }],
        status_message: "Ambulance: FULL, Police: FULL, Fire: N/A".to_owned(),
        created_at,
        entries: Vec::new(),
    };
    let entry = BookingLogEntry {
        message: "Request completed".to_owned(),
        recorded_at: created_at,
    };

    // Act
    logs.insert(&log).await.unwrap();
    logs.append_entry(log.request_id, entry.clone()).await.unwrap();
    let loaded = logs.find(log.request_id).await.unwrap().unwrap();

    // Assert
    assert_eq!(loaded.police, log.police);
    assert_eq!(loaded.ambulances, log.ambulances);
    assert_eq!(loaded.entries, vec![entry]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_entry_for_missing_booking_log_is_not_found(pool: PgPool) {
    let logs = PgBookingLogRepository::new(pool);

    let result = logs
        .append_entry(
            Uuid::new_v4(),
            BookingLogEntry {
                message: "orphan".to_owned(),
                recorded_at: Utc::now(),
            },
        )
        .await;

    assert!(matches!(result, Err(DomainError::EntityNotFound { .. })));
    assert!(logs.find(Uuid::new_v4()).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_migrations_create_every_table(pool: PgPool) {
    for table in rescuenet_store::schema::TABLES {
        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();

        assert!(exists, "table {table} was not created");
    }
}
