//! Deterministic `Clock` implementation for tests.

use chrono::{DateTime, Duration, Utc};
use rescuenet_core::clock::Clock;

/// A clock that always returns a fixed point in time.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// A clock `minutes` later than this one.
    #[must_use]
    pub fn advanced_by_minutes(self, minutes: i64) -> Self {
        Self(self.0 + Duration::minutes(minutes))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
