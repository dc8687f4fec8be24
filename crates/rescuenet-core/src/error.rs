//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
///
/// Running out of units or officers is never an error; it surfaces as a
/// `PARTIAL` or `NONE` fulfillment on an otherwise successful result.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An event-sourced aggregate (an emergency request) was not found.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// A collaborator-owned record (user, unit, station) was not found.
    #[error("{entity} not found: {id}")]
    EntityNotFound {
        /// Kind of record that was looked up.
        entity: &'static str,
        /// The identifier that failed to resolve.
        id: Uuid,
    },

    /// The caller may not act on this unit or request, or the unit is not in
    /// the state the action requires.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Optimistic concurrency conflict.
    #[error("concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Shorthand for an [`DomainError::EntityNotFound`].
    #[must_use]
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::EntityNotFound { entity, id }
    }
}
