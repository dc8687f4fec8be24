//! `PostgreSQL` adapters for the RescueNet ports.
//!
//! Each repository wraps a shared [`sqlx::PgPool`]. The schema lives in the
//! workspace `migrations/` directory and is embedded as [`schema::MIGRATOR`].

pub mod pg_booking_log_repository;
pub mod pg_event_repository;
pub mod pg_fleet_repository;
pub mod pg_identity_directory;
pub mod schema;

use rescuenet_core::error::DomainError;

/// Maps a driver error onto the domain's infrastructure variant.
pub(crate) fn database_error(error: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("database error: {error}"))
}
