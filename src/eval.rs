//! Solution feasibility checks and the distance objective.
//!
//! Checks run in a fixed order: delivery coverage, vehicle capacity,
//! depot consistency, then the total circuit distance. A solution failing
//! any check is reported infeasible with the violated invariant; it is
//! never repaired.

use std::collections::HashSet;

use crate::distance::DistanceOracle;
use crate::error::{EvalError, ValidationError};
use crate::types::{CVRPInstance, CVRPSolution};

/// A feasible solution's objective value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Total circuit distance in kilometers, rounded to 4 decimals.
    pub distance_km: f64,
    pub vehicles: usize,
}

/// Validates `solution` against `instance` and computes the total route
/// distance over each vehicle's full depot-to-depot circuit.
pub fn evaluate_solution<O: DistanceOracle>(
    instance: &CVRPInstance,
    solution: &CVRPSolution,
    oracle: O,
) -> Result<Evaluation, EvalError> {
    check_coverage(instance, solution)?;
    check_capacity(instance, solution)?;
    check_origin(instance, solution)?;

    let mut meters = 0.0;
    for vehicle in &solution.vehicles {
        meters += oracle.route_cost(&vehicle.circuit())?;
    }

    Ok(Evaluation {
        distance_km: round4(meters / 1000.0),
        vehicles: solution.vehicles.len(),
    })
}

/// Every instance delivery appears in the solution exactly once.
fn check_coverage(instance: &CVRPInstance, solution: &CVRPSolution) -> Result<(), ValidationError> {
    let expected: HashSet<&str> = instance.deliveries.iter().map(|d| d.id.as_str()).collect();

    let mut seen = HashSet::with_capacity(expected.len());
    let mut extra = 0usize;
    for delivery in solution.deliveries() {
        if !expected.contains(delivery.id.as_str()) || !seen.insert(delivery.id.as_str()) {
            extra += 1;
        }
    }

    let missing = expected.len() - seen.len();
    if missing > 0 || extra > 0 {
        return Err(ValidationError::CoverageMismatch { missing, extra });
    }
    Ok(())
}

fn check_capacity(instance: &CVRPInstance, solution: &CVRPSolution) -> Result<(), ValidationError> {
    for (index, vehicle) in solution.vehicles.iter().enumerate() {
        let occupation = vehicle.occupation();
        if occupation > instance.vehicle_capacity {
            return Err(ValidationError::CapacityExceeded {
                vehicle: index,
                occupation,
                capacity: instance.vehicle_capacity,
            });
        }
    }
    Ok(())
}

fn check_origin(instance: &CVRPInstance, solution: &CVRPSolution) -> Result<(), ValidationError> {
    for (index, vehicle) in solution.vehicles.iter().enumerate() {
        if vehicle.origin != instance.origin {
            return Err(ValidationError::OriginMismatch { vehicle: index });
        }
    }
    Ok(())
}

fn round4(km: f64) -> f64 {
    (km * 10_000.0).round() / 10_000.0
}
