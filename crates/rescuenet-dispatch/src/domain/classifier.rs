//! Fulfillment classification.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::events::Demand;

/// How well one service's demand was met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Fulfillment {
    /// The service was not requested.
    #[serde(rename = "N/A")]
    NotRequested,
    /// Requested, but nothing could be assigned.
    #[serde(rename = "NONE")]
    Unassigned,
    /// Some, but not all, of the requested count was assigned.
    #[serde(rename = "PARTIAL")]
    Partial,
    /// The requested count was assigned in full.
    #[serde(rename = "FULL")]
    Full,
}

impl Fulfillment {
    /// The classifier string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotRequested => "N/A",
            Self::Unassigned => "NONE",
            Self::Partial => "PARTIAL",
            Self::Full => "FULL",
        }
    }

    /// True for `NONE` and `PARTIAL`.
    #[must_use]
    pub const fn is_short(self) -> bool {
        matches!(self, Self::Unassigned | Self::Partial)
    }
}

impl fmt::Display for Fulfillment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies `assigned` against `requested`.
#[must_use]
pub const fn classify(assigned: u32, requested: u32) -> Fulfillment {
    if requested == 0 {
        Fulfillment::NotRequested
    } else if assigned == 0 {
        Fulfillment::Unassigned
    } else if assigned < requested {
        Fulfillment::Partial
    } else {
        Fulfillment::Full
    }
}

/// Fulfillment of all three services of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFulfillment {
    /// Ambulance fulfillment.
    pub ambulance: Fulfillment,
    /// Police fulfillment, over summed officers.
    pub police: Fulfillment,
    /// Fire-truck fulfillment.
    pub fire_truck: Fulfillment,
}

impl ServiceFulfillment {
    /// Classifies assigned counts against `demand`.
    #[must_use]
    pub const fn assess(demand: &Demand, ambulances: u32, officers: u32, fire_trucks: u32) -> Self {
        Self {
            ambulance: classify(ambulances, demand.ambulances),
            police: classify(officers, demand.officers),
            fire_truck: classify(fire_trucks, demand.fire_trucks),
        }
    }

    /// True when no requested service came up short.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        !(self.ambulance.is_short() || self.police.is_short() || self.fire_truck.is_short())
    }

    /// See [`status_summary`].
    #[must_use]
    pub fn summary(&self) -> String {
        status_summary(self.ambulance, self.police, self.fire_truck)
    }

    /// See [`dispatch_notes`].
    #[must_use]
    pub fn notes(&self) -> String {
        dispatch_notes(self.ambulance, self.police, self.fire_truck)
    }
}

/// The booking-log summary line for the three services.
#[must_use]
pub fn status_summary(ambulance: Fulfillment, police: Fulfillment, fire: Fulfillment) -> String {
    format!("Ambulance: {ambulance}, Police: {police}, Fire: {fire}")
}

/// The notes line returned to the requester after dispatch.
#[must_use]
pub fn dispatch_notes(ambulance: Fulfillment, police: Fulfillment, fire: Fulfillment) -> String {
    format!(
        "Ambulances assigned {ambulance}, Police Assigned {police}, Fire Trucks Assigned {fire}"
    )
}
