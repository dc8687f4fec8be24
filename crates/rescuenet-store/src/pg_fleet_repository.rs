//! `PostgreSQL` implementation of the `FleetRepository` trait.
//!
//! Distances are computed in SQL with the haversine formula so the radius
//! filter and the nearest-first ordering happen in the database. Every state
//! change is a single conditional `UPDATE`; the row count tells whether the
//! precondition held.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use rescuenet_core::error::DomainError;
use rescuenet_core::fleet::{
    FleetRepository, NearbyStation, NearbyUnit, PoliceStation, Unit, UnitClaim, UnitKind,
    UnitStatus,
};
use rescuenet_core::geo::{EARTH_RADIUS_KM, GeoPoint};

use crate::database_error;

/// Haversine distance from the origin bound as `$1` (latitude) and `$2`
/// (longitude), with the Earth radius bound as `$3`. The `ASIN` argument is
/// clamped to 1 so rounding near the antipode cannot leave its domain.
const DISTANCE_KM: &str = "$3 * 2 * ASIN(LEAST(1, SQRT( \
    POWER(SIN(RADIANS(latitude - $1) / 2), 2) \
    + COS(RADIANS($1)) * COS(RADIANS(latitude)) \
    * POWER(SIN(RADIANS(longitude - $2) / 2), 2))))";

const UNIT_COLUMNS: &str = "id, kind, registration, latitude, longitude, status, \
    active_request, home_base_id, driver_id, last_updated";

const STATION_COLUMNS: &str = "id, name, latitude, longitude, available_officers, last_updated";

/// PostgreSQL-backed fleet store.
#[derive(Debug, Clone)]
pub struct PgFleetRepository {
    pool: PgPool,
}

impl PgFleetRepository {
    /// Creates a new `PgFleetRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UnitRow {
    id: Uuid,
    kind: String,
    registration: String,
    latitude: f64,
    longitude: f64,
    status: String,
    active_request: Option<Uuid>,
    home_base_id: Uuid,
    driver_id: Option<Uuid>,
    last_updated: DateTime<Utc>,
}

impl TryFrom<UnitRow> for Unit {
    type Error = DomainError;

    fn try_from(row: UnitRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            kind: UnitKind::parse(&row.kind)?,
            registration: row.registration,
            location: GeoPoint::new(row.latitude, row.longitude),
            status: UnitStatus::parse(&row.status)?,
            active_request: row.active_request,
            home_base_id: row.home_base_id,
            driver_id: row.driver_id,
            last_updated: row.last_updated,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NearbyUnitRow {
    #[sqlx(flatten)]
    unit: UnitRow,
    distance_km: f64,
}

#[derive(sqlx::FromRow)]
struct StationRow {
    id: Uuid,
    name: String,
    latitude: f64,
    longitude: f64,
    available_officers: i32,
    last_updated: DateTime<Utc>,
}

impl TryFrom<StationRow> for PoliceStation {
    type Error = DomainError;

    fn try_from(row: StationRow) -> Result<Self, Self::Error> {
        let available_officers = u32::try_from(row.available_officers).map_err(|_| {
            DomainError::Infrastructure(format!(
                "station {} has a negative officer count",
                row.id
            ))
        })?;
        Ok(Self {
            id: row.id,
            name: row.name,
            location: GeoPoint::new(row.latitude, row.longitude),
            available_officers,
            last_updated: row.last_updated,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NearbyStationRow {
    #[sqlx(flatten)]
    station: StationRow,
    distance_km: f64,
}

fn officer_count(count: u32) -> Result<i32, DomainError> {
    i32::try_from(count)
        .map_err(|_| DomainError::Validation(format!("officer count {count} is too large")))
}

#[async_trait]
impl FleetRepository for PgFleetRepository {
    async fn find_available_units(
        &self,
        kind: UnitKind,
        origin: GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<NearbyUnit>, DomainError> {
        let sql = format!(
            "SELECT * FROM ( \
                 SELECT {UNIT_COLUMNS}, {DISTANCE_KM} AS distance_km \
                 FROM units WHERE kind = $4 AND status = $5 \
             ) nearby \
             WHERE distance_km <= $6 \
             ORDER BY distance_km, id"
        );
        let rows: Vec<NearbyUnitRow> = sqlx::query_as(&sql)
            .bind(origin.latitude)
            .bind(origin.longitude)
            .bind(EARTH_RADIUS_KM)
            .bind(kind.as_str())
            .bind(UnitStatus::Available.as_str())
            .bind(radius_km)
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(NearbyUnit {
                    unit: Unit::try_from(row.unit)?,
                    distance_km: row.distance_km,
                })
            })
            .collect()
    }

    async fn find_unit(&self, unit_id: Uuid) -> Result<Option<Unit>, DomainError> {
        let sql = format!("SELECT {UNIT_COLUMNS} FROM units WHERE id = $1");
        let row: Option<UnitRow> = sqlx::query_as(&sql)
            .bind(unit_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;
        row.map(Unit::try_from).transpose()
    }

    async fn find_unit_by_driver(&self, driver_id: Uuid) -> Result<Option<Unit>, DomainError> {
        let sql = format!("SELECT {UNIT_COLUMNS} FROM units WHERE driver_id = $1");
        let row: Option<UnitRow> = sqlx::query_as(&sql)
            .bind(driver_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;
        row.map(Unit::try_from).transpose()
    }

    async fn transition_unit(
        &self,
        unit_id: Uuid,
        expected: UnitClaim,
        next: UnitClaim,
        at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "UPDATE units \
             SET status = $2, active_request = $3, last_updated = $4 \
             WHERE id = $1 AND status = $5 AND active_request IS NOT DISTINCT FROM $6",
        )
        .bind(unit_id)
        .bind(next.status.as_str())
        .bind(next.request_id)
        .bind(at)
        .bind(expected.status.as_str())
        .bind(expected.request_id)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_unit_location(
        &self,
        unit_id: Uuid,
        location: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE units SET latitude = $2, longitude = $3, last_updated = $4 WHERE id = $1",
        )
        .bind(unit_id)
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("unit", unit_id));
        }
        Ok(())
    }

    async fn stations_by_proximity(
        &self,
        origin: GeoPoint,
    ) -> Result<Vec<NearbyStation>, DomainError> {
        let sql = format!(
            "SELECT {STATION_COLUMNS}, {DISTANCE_KM} AS distance_km \
             FROM police_stations \
             ORDER BY distance_km, id"
        );
        let rows: Vec<NearbyStationRow> = sqlx::query_as(&sql)
            .bind(origin.latitude)
            .bind(origin.longitude)
            .bind(EARTH_RADIUS_KM)
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(NearbyStation {
                    station: PoliceStation::try_from(row.station)?,
                    distance_km: row.distance_km,
                })
            })
            .collect()
    }

    async fn find_station(&self, station_id: Uuid) -> Result<Option<PoliceStation>, DomainError> {
        let sql = format!("SELECT {STATION_COLUMNS} FROM police_stations WHERE id = $1");
        let row: Option<StationRow> = sqlx::query_as(&sql)
            .bind(station_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;
        row.map(PoliceStation::try_from).transpose()
    }

    async fn take_officers(
        &self,
        station_id: Uuid,
        count: u32,
        at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "UPDATE police_stations \
             SET available_officers = available_officers - $2, last_updated = $3 \
             WHERE id = $1 AND available_officers >= $2",
        )
        .bind(station_id)
        .bind(officer_count(count)?)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn return_officers(
        &self,
        station_id: Uuid,
        count: u32,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE police_stations \
             SET available_officers = available_officers + $2, last_updated = $3 \
             WHERE id = $1",
        )
        .bind(station_id)
        .bind(officer_count(count)?)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("police station", station_id));
        }
        Ok(())
    }
}
