//! Allocation search parameters.

use rescuenet_core::error::DomainError;
use rescuenet_core::fleet::UnitKind;

/// Radii used by the expanding unit search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchConfig {
    /// How far each search ring widens, in kilometres.
    pub search_step_km: f64,
    /// Largest radius searched for fire trucks.
    pub max_radius_km: f64,
    /// Largest radius searched for ambulances.
    pub ambulance_max_radius_km: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            search_step_km: 1.0,
            max_radius_km: 10.0,
            ambulance_max_radius_km: 10.0,
        }
    }
}

impl DispatchConfig {
    /// Builds a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` unless the step is positive and each
    /// radius is at least one step.
    pub fn new(
        search_step_km: f64,
        max_radius_km: f64,
        ambulance_max_radius_km: f64,
    ) -> Result<Self, DomainError> {
        let config = Self {
            search_step_km,
            max_radius_km,
            ambulance_max_radius_km,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the step is positive and both radii are at least one step.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` describing the first violation.
    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.search_step_km.is_finite() || self.search_step_km <= 0.0 {
            return Err(DomainError::Validation(format!(
                "search step must be positive, got {}",
                self.search_step_km
            )));
        }
        for (name, radius) in [
            ("max radius", self.max_radius_km),
            ("ambulance max radius", self.ambulance_max_radius_km),
        ] {
            if !radius.is_finite() || radius < self.search_step_km {
                return Err(DomainError::Validation(format!(
                    "{name} {radius} km is smaller than the search step {} km",
                    self.search_step_km
                )));
            }
        }
        Ok(())
    }

    /// Largest radius searched for `kind`.
    #[must_use]
    pub const fn max_radius_for(&self, kind: UnitKind) -> f64 {
        match kind {
            UnitKind::Ambulance => self.ambulance_max_radius_km,
            UnitKind::FireTruck => self.max_radius_km,
        }
    }

    /// The successive search radii for `kind`: one step, two steps, and so
    /// on up to the largest multiple of the step within the max radius.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn search_radii(&self, kind: UnitKind) -> impl Iterator<Item = f64> + use<> {
        let step = self.search_step_km;
        // Tolerate float error so 0.1-km steps still reach a 1-km radius.
        let rings = (self.max_radius_for(kind) / step + 1e-9).floor() as u32;
        (1..=rings).map(move |ring| step * f64::from(ring))
    }
}
