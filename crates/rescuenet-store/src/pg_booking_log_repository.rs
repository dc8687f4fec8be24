//! `PostgreSQL` implementation of the `BookingLogRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use rescuenet_core::booking_log::{BookingLog, BookingLogEntry, BookingLogRepository};
use rescuenet_core::error::DomainError;
use rescuenet_core::fleet::OfficerAllocation;

use crate::database_error;

/// Booking logs in `booking_logs`, follow-on entries in `booking_log_entries`.
#[derive(Debug, Clone)]
pub struct PgBookingLogRepository {
    pool: PgPool,
}

impl PgBookingLogRepository {
    /// Creates a new `PgBookingLogRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingLogRow {
    request_id: Uuid,
    ambulances: Vec<Uuid>,
    fire_trucks: Vec<Uuid>,
    police: Json<Vec<OfficerAllocation>>,
    status_message: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    message: String,
    recorded_at: DateTime<Utc>,
}

#[async_trait]
impl BookingLogRepository for PgBookingLogRepository {
    async fn insert(&self, log: &BookingLog) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        sqlx::query(
            "INSERT INTO booking_logs \
                (request_id, ambulances, fire_trucks, police, status_message, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(log.request_id)
        .bind(&log.ambulances)
        .bind(&log.fire_trucks)
        .bind(Json(&log.police))
        .bind(&log.status_message)
        .bind(log.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|error| match error {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => DomainError::Validation(
                format!("request {} already has a booking log", log.request_id),
            ),
            other => database_error(other),
        })?;

        for entry in &log.entries {
            sqlx::query(
                "INSERT INTO booking_log_entries (request_id, message, recorded_at) \
                 VALUES ($1, $2, $3)",
            )
            .bind(log.request_id)
            .bind(&entry.message)
            .bind(entry.recorded_at)
            .execute(&mut *tx)
            .await
            .map_err(database_error)?;
        }

        tx.commit().await.map_err(database_error)
    }

    async fn append_entry(
        &self,
        request_id: Uuid,
        entry: BookingLogEntry,
    ) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO booking_log_entries (request_id, message, recorded_at) \
             VALUES ($1, $2, $3)",
        )
        .bind(request_id)
        .bind(&entry.message)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|error| match error {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                DomainError::not_found("booking log", request_id)
            }
            other => database_error(other),
        })?;
        Ok(())
    }

    async fn find(&self, request_id: Uuid) -> Result<Option<BookingLog>, DomainError> {
        let row: Option<BookingLogRow> = sqlx::query_as(
            "SELECT request_id, ambulances, fire_trucks, police, status_message, created_at \
             FROM booking_logs WHERE request_id = $1",
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let entries: Vec<EntryRow> = sqlx::query_as(
            "SELECT message, recorded_at FROM booking_log_entries \
             WHERE request_id = $1 ORDER BY id",
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(Some(BookingLog {
            request_id: row.request_id,
            ambulances: row.ambulances,
            fire_trucks: row.fire_trucks,
            police: row.police.0,
            status_message: row.status_message,
            created_at: row.created_at,
            entries: entries
                .into_iter()
                .map(|entry| BookingLogEntry {
                    message: entry.message,
                    recorded_at: entry.recorded_at,
                })
                .collect(),
        }))
    }
}
