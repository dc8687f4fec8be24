//! Booking log audit records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::fleet::OfficerAllocation;

/// A follow-on audit line appended after dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingLogEntry {
    /// What happened.
    pub message: String,
    /// When it was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Snapshot of what a request was given at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingLog {
    /// The emergency request this log belongs to.
    pub request_id: Uuid,
    /// Ambulances assigned at dispatch, nearest first.
    pub ambulances: Vec<Uuid>,
    /// Fire trucks assigned at dispatch, nearest first.
    pub fire_trucks: Vec<Uuid>,
    /// Police allocations at dispatch, nearest station first.
    pub police: Vec<OfficerAllocation>,
    /// Fulfillment summary, e.g. `Ambulance: FULL, Police: PARTIAL, Fire: N/A`.
    pub status_message: String,
    /// When the snapshot was written.
    pub created_at: DateTime<Utc>,
    /// Entries appended by later lifecycle events.
    pub entries: Vec<BookingLogEntry>,
}

/// Append-only store of booking logs.
#[async_trait]
pub trait BookingLogRepository: Send + Sync {
    /// Writes the dispatch snapshot. Each request has at most one log.
    async fn insert(&self, log: &BookingLog) -> Result<(), DomainError>;

    /// Appends a follow-on entry to an existing log.
    async fn append_entry(&self, request_id: Uuid, entry: BookingLogEntry)
    -> Result<(), DomainError>;

    /// Loads the log of a request.
    async fn find(&self, request_id: Uuid) -> Result<Option<BookingLog>, DomainError>;
}
