//! Commands for the Dispatch context.

use rescuenet_core::command::Command;
use rescuenet_core::geo::GeoPoint;
use rescuenet_core::identity::Actor;
use uuid::Uuid;

use super::events::Demand;

/// Command to raise and dispatch a new emergency request.
#[derive(Debug, Clone)]
pub struct CreateEmergencyRequest {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The user raising the request.
    pub requester_id: Uuid,
    /// Incident location.
    pub location: GeoPoint,
    /// Free-form incident category.
    pub issue_type: String,
    /// Requested counts per service.
    pub demand: Demand,
    /// Whether the requester is the victim.
    pub for_self: bool,
    /// Victim contact number when reporting for someone else.
    pub victim_phone: Option<String>,
    /// Requester's notes.
    pub notes: Option<String>,
}

/// Command for a driver to accept a pending assignment.
#[derive(Debug, Clone)]
pub struct AcceptAssignment {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The request being accepted.
    pub request_id: Uuid,
    /// The calling driver.
    pub actor: Actor,
}

/// Command for a driver or officer to finish their current assignment.
#[derive(Debug, Clone)]
pub struct CompleteAssignment {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The calling driver or officer.
    pub actor: Actor,
}

/// Command for a requester to delete their request.
#[derive(Debug, Clone)]
pub struct WithdrawRequest {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The request to withdraw.
    pub request_id: Uuid,
    /// The caller; must be the original requester.
    pub caller_id: Uuid,
}

/// Command for a driver to report their unit's position.
#[derive(Debug, Clone)]
pub struct UpdateUnitLocation {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The reporting driver.
    pub actor: Actor,
    /// The new position.
    pub location: GeoPoint,
}

impl Command for CreateEmergencyRequest {
    fn command_type(&self) -> &'static str {
        "dispatch.create_emergency_request"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

impl Command for AcceptAssignment {
    fn command_type(&self) -> &'static str {
        "dispatch.accept_assignment"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

impl Command for CompleteAssignment {
    fn command_type(&self) -> &'static str {
        "dispatch.complete_assignment"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

impl Command for WithdrawRequest {
    fn command_type(&self) -> &'static str {
        "dispatch.withdraw_request"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

impl Command for UpdateUnitLocation {
    fn command_type(&self) -> &'static str {
        "dispatch.update_unit_location"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
