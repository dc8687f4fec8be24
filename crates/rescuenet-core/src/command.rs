//! Command abstractions.

use uuid::Uuid;

/// Trait implemented by every command entering the dispatch engine.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// Stable command name, used as a tracing field.
    fn command_type(&self) -> &'static str;

    /// Correlation ID tying the command to the events it produces.
    fn correlation_id(&self) -> Uuid;
}
