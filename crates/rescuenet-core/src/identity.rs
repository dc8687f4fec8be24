//! Caller identity.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::fleet::UnitKind;

/// A resolved caller.
///
/// Resolved once at the edge from an opaque user id and handed to the
/// dispatch engine as a typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Actor {
    /// A member of the public raising emergency requests.
    Citizen {
        /// User identifier.
        user_id: Uuid,
    },
    /// The driver of an ambulance.
    AmbulanceDriver {
        /// User identifier.
        user_id: Uuid,
    },
    /// The driver of a fire truck.
    FireDriver {
        /// User identifier.
        user_id: Uuid,
    },
    /// A police officer attached to a station.
    PoliceOfficer {
        /// User identifier.
        user_id: Uuid,
        /// The station the officer works from.
        station_id: Uuid,
    },
}

impl Actor {
    /// The caller's user id, whatever the role.
    #[must_use]
    pub const fn user_id(&self) -> Uuid {
        match *self {
            Self::Citizen { user_id }
            | Self::AmbulanceDriver { user_id }
            | Self::FireDriver { user_id }
            | Self::PoliceOfficer { user_id, .. } => user_id,
        }
    }

    /// The kind of unit this caller drives, if they are a driver.
    #[must_use]
    pub const fn driven_unit_kind(&self) -> Option<UnitKind> {
        match self {
            Self::AmbulanceDriver { .. } => Some(UnitKind::Ambulance),
            Self::FireDriver { .. } => Some(UnitKind::FireTruck),
            Self::Citizen { .. } | Self::PoliceOfficer { .. } => None,
        }
    }
}

/// Port over the identity collaborator.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Resolves a user id to an actor, or `None` if no such user exists.
    async fn resolve(&self, user_id: Uuid) -> Result<Option<Actor>, DomainError>;
}
