//! In-memory `EventRepository` implementations for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rescuenet_core::error::DomainError;
use rescuenet_core::repository::{EventRepository, StoredEvent};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Streams {
    /// Stream ids in creation order.
    order: Vec<Uuid>,
    events: HashMap<Uuid, Vec<StoredEvent>>,
}

/// An event store held in memory, with the same optimistic concurrency and
/// payload containment semantics as the `PostgreSQL` adapter.
#[derive(Debug, Default)]
pub struct InMemoryEventRepository {
    streams: Mutex<Streams>,
    injected_conflicts: Mutex<u32>,
}

impl InMemoryEventRepository {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` appends fail with a concurrency conflict, as if
    /// another writer got there first.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn inject_conflicts(&self, count: u32) {
        *self.injected_conflicts.lock().unwrap() = count;
    }

    /// Returns a snapshot of one stream.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn stream(&self, aggregate_id: Uuid) -> Vec<StoredEvent> {
        self.streams
            .lock()
            .unwrap()
            .events
            .get(&aggregate_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of streams holding at least one event.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn stream_count(&self) -> usize {
        self.streams.lock().unwrap().order.len()
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self.stream(aggregate_id))
    }

    #[allow(clippy::cast_possible_wrap)]
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        let mut streams = self.streams.lock().unwrap();
        let actual = streams
            .events
            .get(&aggregate_id)
            .map_or(0, |stream| stream.len() as i64);

        {
            let mut injected = self.injected_conflicts.lock().unwrap();
            if *injected > 0 {
                *injected -= 1;
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_id,
                    expected: expected_version,
                    actual: actual + 1,
                });
            }
        }
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }
        if events.is_empty() {
            return Ok(());
        }

        if !streams.events.contains_key(&aggregate_id) {
            streams.order.push(aggregate_id);
        }
        streams
            .events
            .entry(aggregate_id)
            .or_default()
            .extend_from_slice(events);
        Ok(())
    }

    async fn find_aggregate_ids(
        &self,
        event_type: &str,
        payload_filter: &Value,
    ) -> Result<Vec<Uuid>, DomainError> {
        let streams = self.streams.lock().unwrap();
        Ok(streams
            .order
            .iter()
            .filter(|id| {
                streams.events[*id].iter().any(|event| {
                    event.event_type == event_type && json_contains(&event.payload, payload_filter)
                })
            })
            .copied()
            .collect())
    }
}

/// JSON containment as `PostgreSQL`'s `jsonb @> jsonb`: objects contain
/// objects whose every key they contain, arrays contain arrays whose every
/// element some element of theirs contains, scalars must be equal.
#[must_use]
pub fn json_contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Object(have), Value::Object(want)) => want
            .iter()
            .all(|(key, value)| have.get(key).is_some_and(|h| json_contains(h, value))),
        (Value::Array(have), Value::Array(want)) => want
            .iter()
            .all(|value| have.iter().any(|h| json_contains(h, value))),
        _ => haystack == needle,
    }
}

/// An event repository that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingEventRepository;

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn find_aggregate_ids(
        &self,
        _event_type: &str,
        _payload_filter: &Value,
    ) -> Result<Vec<Uuid>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}
