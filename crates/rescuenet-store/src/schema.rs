//! Database schema.

use sqlx::migrate::Migrator;

/// Migrations creating the event, fleet, identity and booking log tables.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Tables owned by the schema, in creation order.
pub const TABLES: [&str; 6] = [
    "domain_events",
    "units",
    "police_stations",
    "users",
    "booking_logs",
    "booking_log_entries",
];
