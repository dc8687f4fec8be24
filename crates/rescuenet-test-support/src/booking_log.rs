//! In-memory booking log store.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rescuenet_core::booking_log::{BookingLog, BookingLogEntry, BookingLogRepository};
use rescuenet_core::error::DomainError;
use uuid::Uuid;

/// Booking logs held in memory.
#[derive(Debug, Default)]
pub struct InMemoryBookingLogs {
    logs: Mutex<HashMap<Uuid, BookingLog>>,
    fail_inserts: AtomicBool,
}

impl InMemoryBookingLogs {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose snapshot inserts fail with an infrastructure error.
    #[must_use]
    pub fn failing_inserts() -> Self {
        let logs = Self::default();
        logs.fail_inserts.store(true, Ordering::SeqCst);
        logs
    }

    /// Snapshot of a request's log.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn log(&self, request_id: Uuid) -> Option<BookingLog> {
        self.logs.lock().unwrap().get(&request_id).cloned()
    }
}

#[async_trait]
impl BookingLogRepository for InMemoryBookingLogs {
    async fn insert(&self, log: &BookingLog) -> Result<(), DomainError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(DomainError::Infrastructure("booking log store unavailable".into()));
        }
        let mut logs = self.logs.lock().unwrap();
        if logs.contains_key(&log.request_id) {
            return Err(DomainError::Infrastructure(format!(
                "booking log for request {} already exists",
                log.request_id
            )));
        }
        logs.insert(log.request_id, log.clone());
        Ok(())
    }

    async fn append_entry(
        &self,
        request_id: Uuid,
        entry: BookingLogEntry,
    ) -> Result<(), DomainError> {
        self.logs
            .lock()
            .unwrap()
            .get_mut(&request_id)
            .ok_or(DomainError::not_found("booking log", request_id))?
            .entries
            .push(entry);
        Ok(())
    }

    async fn find(&self, request_id: Uuid) -> Result<Option<BookingLog>, DomainError> {
        Ok(self.log(request_id))
    }
}
