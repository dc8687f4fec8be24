//! Nearest-first allocation of units and police officers.
//!
//! Every reservation is a conditional update in the fleet store, so a unit
//! or an officer seen by two concurrent dispatches goes to exactly one of
//! them; the loser moves on to the next-nearest candidate.

use std::collections::HashSet;

use rescuenet_core::clock::Clock;
use rescuenet_core::error::DomainError;
use rescuenet_core::fleet::{FleetRepository, OfficerAllocation, UnitClaim, UnitKind};
use rescuenet_core::geo::GeoPoint;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::domain::events::AssignedUnit;

/// Conditional subtracts attempted per station before moving on.
const MAX_STATION_ATTEMPTS: usize = 3;

/// What to look for in one unit search.
#[derive(Debug, Clone, Copy)]
pub struct UnitSearch {
    /// Ambulance or fire truck.
    pub kind: UnitKind,
    /// Incident location.
    pub origin: GeoPoint,
    /// Units wanted.
    pub required: u32,
    /// The request the units are reserved for.
    pub request_id: Uuid,
}

/// Reserves up to `search.required` available units nearest to the origin,
/// widening the search radius one step at a time. Each returned unit has
/// been moved to `PENDING_ACCEPTANCE` for the request.
///
/// # Errors
///
/// Returns the fleet store's error; any unit reserved before the failure is
/// released first.
pub async fn allocate_units(
    fleet: &dyn FleetRepository,
    config: &DispatchConfig,
    search: &UnitSearch,
    clock: &dyn Clock,
) -> Result<Vec<AssignedUnit>, DomainError> {
    let mut reserved = Vec::new();
    match reserve_units(fleet, config, search, clock, &mut reserved).await {
        Ok(()) => Ok(reserved),
        Err(error) => {
            for unit in &reserved {
                release_unit(
                    fleet,
                    unit.unit_id,
                    UnitClaim::pending(search.request_id),
                    clock,
                )
                .await;
            }
            Err(error)
        }
    }
}

async fn reserve_units(
    fleet: &dyn FleetRepository,
    config: &DispatchConfig,
    search: &UnitSearch,
    clock: &dyn Clock,
    reserved: &mut Vec<AssignedUnit>,
) -> Result<(), DomainError> {
    let required = usize::try_from(search.required).unwrap_or(usize::MAX);
    if required == 0 {
        return Ok(());
    }
    let mut attempted = HashSet::new();

    for radius_km in config.search_radii(search.kind) {
        let candidates = fleet
            .find_available_units(search.kind, search.origin, radius_km)
            .await?;
        debug!(
            kind = %search.kind,
            radius_km,
            candidates = candidates.len(),
            "searching for available units"
        );

        for candidate in candidates {
            if reserved.len() == required {
                break;
            }
            if !attempted.insert(candidate.unit.id) {
                continue;
            }
            let claimed = fleet
                .transition_unit(
                    candidate.unit.id,
                    UnitClaim::available(),
                    UnitClaim::pending(search.request_id),
                    clock.now(),
                )
                .await?;
            if claimed {
                reserved.push(AssignedUnit {
                    unit_id: candidate.unit.id,
                    registration: candidate.unit.registration,
                    distance_km: candidate.distance_km,
                });
            } else {
                debug!(
                    unit_id = %candidate.unit.id,
                    "unit claimed by a concurrent dispatch, trying next candidate"
                );
            }
        }

        if reserved.len() == required {
            break;
        }
    }
    Ok(())
}

/// Draws up to `required` officers from stations nearest to `origin`, taking
/// as many as each station has before moving to the next.
///
/// # Errors
///
/// Returns the fleet store's error; officers drawn before the failure are
/// returned first.
pub async fn allocate_officers(
    fleet: &dyn FleetRepository,
    origin: GeoPoint,
    required: u32,
    clock: &dyn Clock,
) -> Result<Vec<OfficerAllocation>, DomainError> {
    let mut allocations = Vec::new();
    match draw_officers(fleet, origin, required, clock, &mut allocations).await {
        Ok(()) => Ok(allocations),
        Err(error) => {
            return_officers(fleet, &allocations, clock).await;
            Err(error)
        }
    }
}

async fn draw_officers(
    fleet: &dyn FleetRepository,
    origin: GeoPoint,
    required: u32,
    clock: &dyn Clock,
    allocations: &mut Vec<OfficerAllocation>,
) -> Result<(), DomainError> {
    if required == 0 {
        return Ok(());
    }
    let mut remaining = required;

    for nearby in fleet.stations_by_proximity(origin).await? {
        if remaining == 0 {
            break;
        }
        let station = nearby.station;
        let mut available = station.available_officers;

        for _ in 0..MAX_STATION_ATTEMPTS {
            if available == 0 {
                break;
            }
            let take = available.min(remaining);
            if fleet.take_officers(station.id, take, clock.now()).await? {
                allocations.push(OfficerAllocation {
                    station_id: station.id,
                    station_name: station.name.clone(),
                    officers: take,
                });
                remaining -= take;
                break;
            }
            debug!(
                station_id = %station.id,
                "officer pool changed concurrently, re-reading station"
            );
            available = fleet
                .find_station(station.id)
                .await?
                .map_or(0, |fresh| fresh.available_officers);
        }
    }
    Ok(())
}

/// Moves a unit held under `held` back to `AVAILABLE`. Failures are logged,
/// not returned.
pub(crate) async fn release_unit(
    fleet: &dyn FleetRepository,
    unit_id: Uuid,
    held: UnitClaim,
    clock: &dyn Clock,
) {
    match fleet
        .transition_unit(unit_id, held, UnitClaim::available(), clock.now())
        .await
    {
        Ok(true) => debug!(%unit_id, "released unit"),
        Ok(false) => warn!(%unit_id, "unit was no longer held; not released"),
        Err(error) => warn!(%unit_id, %error, "failed to release unit"),
    }
}

/// Returns every allocation's officers to its station. Failures are logged,
/// not returned.
pub(crate) async fn return_officers(
    fleet: &dyn FleetRepository,
    allocations: &[OfficerAllocation],
    clock: &dyn Clock,
) {
    for allocation in allocations {
        if let Err(error) = fleet
            .return_officers(allocation.station_id, allocation.officers, clock.now())
            .await
        {
            warn!(
                station_id = %allocation.station_id,
                officers = allocation.officers,
                %error,
                "failed to return officers"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rescuenet_core::fleet::UnitStatus;
    use rescuenet_test_support::{FixedClock, InMemoryFleet, north_of, station_at, unit_at};

    const ORIGIN: GeoPoint = GeoPoint::new(12.9716, 77.5946);

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap())
    }

    fn search(kind: UnitKind, required: u32) -> UnitSearch {
        UnitSearch {
            kind,
            origin: ORIGIN,
            required,
            request_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_nearest_units_are_reserved_first() {
        // Arrange
        let fleet = InMemoryFleet::new();
        let near = fleet.add_unit(unit_at(UnitKind::Ambulance, "A-1", north_of(ORIGIN, 0.5)));
        let middle = fleet.add_unit(unit_at(UnitKind::Ambulance, "A-2", north_of(ORIGIN, 1.2)));
        let far = fleet.add_unit(unit_at(UnitKind::Ambulance, "A-3", north_of(ORIGIN, 3.0)));
        let search = search(UnitKind::Ambulance, 2);

        // Act
        let reserved = allocate_units(&fleet, &DispatchConfig::default(), &search, &clock())
            .await
            .unwrap();

        // Assert
        let ids: Vec<Uuid> = reserved.iter().map(|u| u.unit_id).collect();
        assert_eq!(ids, vec![near, middle]);
        for id in ids {
            assert_eq!(
                fleet.unit(id).unwrap().claim(),
                UnitClaim::pending(search.request_id)
            );
        }
        assert_eq!(fleet.unit(far).unwrap().status, UnitStatus::Available);
    }

    #[tokio::test]
    async fn test_units_beyond_max_radius_are_never_reserved() {
        // Arrange
        let fleet = InMemoryFleet::new();
        fleet.add_unit(unit_at(UnitKind::FireTruck, "F-1", north_of(ORIGIN, 12.0)));

        // Act
        let reserved = allocate_units(
            &fleet,
            &DispatchConfig::default(),
            &search(UnitKind::FireTruck, 1),
            &clock(),
        )
        .await
        .unwrap();

        // Assert
        assert!(reserved.is_empty());
    }

    #[tokio::test]
    async fn test_wider_ambulance_radius_reaches_further() {
        // Arrange
        let fleet = InMemoryFleet::new();
        let far = fleet.add_unit(unit_at(UnitKind::Ambulance, "A-1", north_of(ORIGIN, 25.0)));
        let config = DispatchConfig::new(1.0, 10.0, 40.0).unwrap();

        // Act
        let reserved = allocate_units(&fleet, &config, &search(UnitKind::Ambulance, 1), &clock())
            .await
            .unwrap();

        // Assert
        assert_eq!(reserved.len(), 1);
        assert_eq!(reserved[0].unit_id, far);
    }

    #[tokio::test]
    async fn test_never_returns_more_than_required_or_duplicates() {
        // Arrange
        let fleet = InMemoryFleet::new();
        for i in 0..6 {
            fleet.add_unit(unit_at(
                UnitKind::Ambulance,
                &format!("A-{i}"),
                north_of(ORIGIN, 0.3 * f64::from(i)),
            ));
        }

        // Act
        let reserved = allocate_units(
            &fleet,
            &DispatchConfig::default(),
            &search(UnitKind::Ambulance, 4),
            &clock(),
        )
        .await
        .unwrap();

        // Assert
        let unique: HashSet<Uuid> = reserved.iter().map(|u| u.unit_id).collect();
        assert_eq!(reserved.len(), 4);
        assert_eq!(unique.len(), 4);
    }

    #[tokio::test]
    async fn test_contended_unit_is_skipped_for_next_nearest() {
        // Arrange
        let fleet = InMemoryFleet::new();
        let near = fleet.add_unit(unit_at(UnitKind::Ambulance, "A-1", north_of(ORIGIN, 0.2)));
        let next = fleet.add_unit(unit_at(UnitKind::Ambulance, "A-2", north_of(ORIGIN, 0.4)));
        fleet.preempt_unit(near);

        // Act
        let reserved = allocate_units(
            &fleet,
            &DispatchConfig::default(),
            &search(UnitKind::Ambulance, 1),
            &clock(),
        )
        .await
        .unwrap();

        // Assert
        assert_eq!(reserved.len(), 1);
        assert_eq!(reserved[0].unit_id, next);
    }

    #[tokio::test]
    async fn test_officers_fill_from_nearest_station_outwards() {
        // Arrange
        let fleet = InMemoryFleet::new();
        let x = fleet.add_station(station_at("X", north_of(ORIGIN, 1.0), 3));
        let y = fleet.add_station(station_at("Y", north_of(ORIGIN, 2.0), 2));

        // Act
        let allocations = allocate_officers(&fleet, ORIGIN, 4, &clock()).await.unwrap();

        // Assert
        let drawn: Vec<(Uuid, u32)> = allocations
            .iter()
            .map(|a| (a.station_id, a.officers))
            .collect();
        assert_eq!(drawn, vec![(x, 3), (y, 1)]);
        assert_eq!(fleet.station(x).unwrap().available_officers, 0);
        assert_eq!(fleet.station(y).unwrap().available_officers, 1);
    }

    #[tokio::test]
    async fn test_officer_allocation_is_monotonic_in_demand() {
        let totals = {
            let mut totals = Vec::new();
            for required in 0..8 {
                let fleet = InMemoryFleet::new();
                fleet.add_station(station_at("X", north_of(ORIGIN, 1.0), 3));
                fleet.add_station(station_at("Y", north_of(ORIGIN, 2.0), 2));
                let allocations = allocate_officers(&fleet, ORIGIN, required, &clock())
                    .await
                    .unwrap();
                totals.push(allocations.iter().map(|a| a.officers).sum::<u32>());
            }
            totals
        };

        assert_eq!(totals, vec![0, 1, 2, 3, 4, 5, 5, 5]);
    }

    #[tokio::test]
    async fn test_contended_station_is_reread_and_drawn_with_fresh_count() {
        // Arrange
        let fleet = InMemoryFleet::new();
        let x = fleet.add_station(station_at("X", north_of(ORIGIN, 1.0), 3));
        let y = fleet.add_station(station_at("Y", north_of(ORIGIN, 2.0), 5));
        fleet.preempt_officers(x, 2);

        // Act
        let allocations = allocate_officers(&fleet, ORIGIN, 3, &clock()).await.unwrap();

        // Assert
        let drawn: Vec<(Uuid, u32)> = allocations
            .iter()
            .map(|a| (a.station_id, a.officers))
            .collect();
        assert_eq!(drawn, vec![(x, 1), (y, 2)]);
        assert_eq!(fleet.station(x).unwrap().available_officers, 0);
    }

    #[tokio::test]
    async fn test_release_unit_returns_it_to_the_pool() {
        let fleet = InMemoryFleet::new();
        let id = fleet.add_unit(unit_at(UnitKind::FireTruck, "F-1", ORIGIN));
        let search = search(UnitKind::FireTruck, 1);
        allocate_units(&fleet, &DispatchConfig::default(), &search, &clock())
            .await
            .unwrap();

        release_unit(&fleet, id, UnitClaim::pending(search.request_id), &clock()).await;

        assert_eq!(fleet.unit(id).unwrap().claim(), UnitClaim::available());
    }
}
