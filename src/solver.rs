//! Route solving seam and the in-crate baseline backend.
//!
//! Engines treat CVRP solving as a capability: anything implementing
//! [`RouteSolver`] plugs in. The baseline backend builds routes with a
//! cheapest-first construction and improves them by local search over the
//! scaled integer matrix (meters times 10, decimeter resolution) that
//! external solvers consume as well.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::distance::DistanceOracle;
use crate::error::SolverError;
use crate::types::{CVRPInstance, CVRPSolution, CVRPSolutionVehicle};

/// Factor applied to meter distances before integer rounding.
pub const DISTANCE_SCALE: f64 = 10.0;

/// First-solution construction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstSolution {
    /// Grow each route by the cheapest next arc from the current stop.
    PathCheapestArc,
    /// Insert each delivery at the globally cheapest feasible position.
    ParallelCheapestInsertion,
}

/// Improvement metaheuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metaheuristic {
    /// Descend to a local optimum with intra-route moves only.
    GreedyDescent,
    /// Also move deliveries between routes while descending.
    GuidedLocalSearch,
}

/// Tuning surface passed through to route solver backends.
#[derive(Debug, Clone)]
pub struct SolverParams {
    pub first_solution: FirstSolution,
    pub metaheuristic: Metaheuristic,
    /// Cap on simultaneous vehicles; `None` allows one per delivery.
    pub max_vehicles: Option<usize>,
    /// Stop after this many accepted improvements.
    pub solution_limit: Option<usize>,
    /// Wall-clock budget for the improvement phase.
    pub time_limit_ms: u64,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            first_solution: FirstSolution::PathCheapestArc,
            metaheuristic: Metaheuristic::GuidedLocalSearch,
            max_vehicles: None,
            solution_limit: None,
            time_limit_ms: 60_000,
        }
    }
}

/// Solves one single-depot subinstance.
///
/// `Err(SolverError::Infeasible)` means no assignment exists under the
/// given parameters, not that the backend failed.
pub trait RouteSolver {
    fn solve(
        &self,
        instance: &CVRPInstance,
        params: &SolverParams,
    ) -> Result<CVRPSolution, SolverError>;
}

/// Baseline backend: greedy construction plus 2-opt and relocate moves.
///
/// Deterministic for a given instance and matrix. `GreedyDescent` runs
/// 2-opt within each route; `GuidedLocalSearch` additionally relocates
/// deliveries between routes.
#[derive(Debug, Clone)]
pub struct BestInsertionSolver<O> {
    oracle: O,
}

impl<O: DistanceOracle> BestInsertionSolver<O> {
    pub fn new(oracle: O) -> Self {
        Self { oracle }
    }
}

impl<O: DistanceOracle> RouteSolver for BestInsertionSolver<O> {
    fn solve(
        &self,
        instance: &CVRPInstance,
        params: &SolverParams,
    ) -> Result<CVRPSolution, SolverError> {
        instance.validate()?;

        if instance.deliveries.is_empty() {
            return Ok(CVRPSolution {
                name: instance.name.clone(),
                vehicles: Vec::new(),
            });
        }

        // Matrix index 0 is the depot; delivery `d` sits at index d + 1.
        let mut points = Vec::with_capacity(instance.deliveries.len() + 1);
        points.push(instance.origin);
        points.extend(instance.deliveries.iter().map(|d| d.point));
        let costs = self.oracle.matrix(&points)?.scaled(DISTANCE_SCALE);

        let sizes: Vec<u32> = instance.deliveries.iter().map(|d| d.size).collect();
        let capacity = instance.vehicle_capacity;

        let mut routes = match params.first_solution {
            FirstSolution::PathCheapestArc => {
                path_cheapest_arc(&costs, &sizes, capacity, params.max_vehicles)
            }
            FirstSolution::ParallelCheapestInsertion => {
                cheapest_insertion(&costs, &sizes, capacity, params.max_vehicles)
            }
        }
        .ok_or(SolverError::Infeasible)?;

        let accepted = improve(&mut routes, &costs, &sizes, capacity, params);
        debug!(
            deliveries = instance.deliveries.len(),
            vehicles = routes.iter().filter(|r| !r.is_empty()).count(),
            accepted,
            "local search settled"
        );

        let vehicles = routes
            .into_iter()
            .filter(|route| !route.is_empty())
            .map(|route| CVRPSolutionVehicle {
                origin: instance.origin,
                deliveries: route
                    .iter()
                    .map(|&d| instance.deliveries[d].clone())
                    .collect(),
            })
            .collect();

        Ok(CVRPSolution {
            name: instance.name.clone(),
            vehicles,
        })
    }
}

/// Cost of one route as the full depot-to-depot circuit.
fn route_cost(route: &[usize], costs: &[Vec<i32>]) -> i64 {
    if route.is_empty() {
        return 0;
    }
    let mut total = costs[0][route[0] + 1] as i64;
    for leg in route.windows(2) {
        total += costs[leg[0] + 1][leg[1] + 1] as i64;
    }
    total + costs[route[route.len() - 1] + 1][0] as i64
}

/// Grow routes one at a time: from the current stop, append the nearest
/// unrouted delivery that still fits, opening a new vehicle when nothing
/// does. `None` when the vehicle cap is exhausted first.
fn path_cheapest_arc(
    costs: &[Vec<i32>],
    sizes: &[u32],
    capacity: u32,
    max_vehicles: Option<usize>,
) -> Option<Vec<Vec<usize>>> {
    let mut remaining: Vec<usize> = (0..sizes.len()).collect();
    let mut routes: Vec<Vec<usize>> = Vec::new();

    while !remaining.is_empty() {
        if max_vehicles.is_some_and(|cap| routes.len() >= cap) {
            return None;
        }
        let mut route: Vec<usize> = Vec::new();
        let mut load = 0u32;
        let mut at = 0usize;

        loop {
            let mut best: Option<(usize, i32)> = None;
            for (slot, &delivery) in remaining.iter().enumerate() {
                if u64::from(load) + u64::from(sizes[delivery]) > u64::from(capacity) {
                    continue;
                }
                let cost = costs[at][delivery + 1];
                if best.is_none_or(|(_, best_cost)| cost < best_cost) {
                    best = Some((slot, cost));
                }
            }
            match best {
                Some((slot, _)) => {
                    let delivery = remaining.remove(slot);
                    load += sizes[delivery];
                    at = delivery + 1;
                    route.push(delivery);
                }
                None => break,
            }
        }

        // Validated sizes fit an empty vehicle, so the route never stays
        // empty and the outer loop always shrinks `remaining`.
        routes.push(route);
    }

    Some(routes)
}

/// Insert each delivery at the cheapest feasible position across all open
/// routes, opening a new vehicle when none fits.
fn cheapest_insertion(
    costs: &[Vec<i32>],
    sizes: &[u32],
    capacity: u32,
    max_vehicles: Option<usize>,
) -> Option<Vec<Vec<usize>>> {
    let mut routes: Vec<Vec<usize>> = Vec::new();
    let mut loads: Vec<u32> = Vec::new();

    for delivery in 0..sizes.len() {
        let mut best: Option<(usize, usize, i64)> = None;
        for (index, route) in routes.iter().enumerate() {
            if u64::from(loads[index]) + u64::from(sizes[delivery]) > u64::from(capacity) {
                continue;
            }
            for position in 0..=route.len() {
                let delta = insertion_delta(route, position, delivery, costs);
                if best.is_none_or(|(_, _, best_delta)| delta < best_delta) {
                    best = Some((index, position, delta));
                }
            }
        }

        match best {
            Some((index, position, _)) => {
                routes[index].insert(position, delivery);
                loads[index] += sizes[delivery];
            }
            None => {
                if max_vehicles.is_some_and(|cap| routes.len() >= cap) {
                    return None;
                }
                routes.push(vec![delivery]);
                loads.push(sizes[delivery]);
            }
        }
    }

    Some(routes)
}

fn insertion_delta(route: &[usize], position: usize, delivery: usize, costs: &[Vec<i32>]) -> i64 {
    let prev = if position == 0 { 0 } else { route[position - 1] + 1 };
    let next = if position == route.len() { 0 } else { route[position] + 1 };
    costs[prev][delivery + 1] as i64 + costs[delivery + 1][next] as i64 - costs[prev][next] as i64
}

/// Local search until no move improves, the accepted-move limit is hit,
/// or the time budget runs out. Returns the number of accepted moves.
fn improve(
    routes: &mut Vec<Vec<usize>>,
    costs: &[Vec<i32>],
    sizes: &[u32],
    capacity: u32,
    params: &SolverParams,
) -> usize {
    let started = Instant::now();
    let budget = Duration::from_millis(params.time_limit_ms);
    let mut accepted = 0usize;

    loop {
        if started.elapsed() >= budget {
            break;
        }
        if params.solution_limit.is_some_and(|limit| accepted >= limit) {
            break;
        }

        let mut improved = false;
        for route in routes.iter_mut() {
            if two_opt_improve(route, costs) {
                improved = true;
                accepted += 1;
            }
        }
        if params.metaheuristic == Metaheuristic::GuidedLocalSearch
            && relocate_improve(routes, costs, sizes, capacity)
        {
            improved = true;
            accepted += 1;
        }

        if !improved {
            break;
        }
    }

    accepted
}

/// 2-opt: reverse a segment if the circuit gets shorter. First
/// improvement wins; returns whether a move was applied.
fn two_opt_improve(route: &mut [usize], costs: &[Vec<i32>]) -> bool {
    if route.len() < 3 {
        return false;
    }
    let current = route_cost(route, costs);
    let n = route.len();

    for start in 0..n - 1 {
        for end in start + 1..n {
            route[start..=end].reverse();
            if route_cost(route, costs) < current {
                return true;
            }
            route[start..=end].reverse();
        }
    }

    false
}

/// Relocate: move one delivery to a cheaper position, in its own route or
/// another with room. First improvement wins.
fn relocate_improve(
    routes: &mut [Vec<usize>],
    costs: &[Vec<i32>],
    sizes: &[u32],
    capacity: u32,
) -> bool {
    let loads: Vec<u32> = routes
        .iter()
        .map(|route| route.iter().map(|&d| sizes[d]).sum())
        .collect();

    for from in 0..routes.len() {
        for position in 0..routes[from].len() {
            let delivery = routes[from][position];

            for to in 0..routes.len() {
                if to != from
                    && u64::from(loads[to]) + u64::from(sizes[delivery]) > u64::from(capacity)
                {
                    continue;
                }

                let mut source = routes[from].clone();
                source.remove(position);

                if to == from {
                    let before = route_cost(&routes[from], costs);
                    for insert in 0..=source.len() {
                        if insert == position {
                            continue;
                        }
                        let mut candidate = source.clone();
                        candidate.insert(insert, delivery);
                        if route_cost(&candidate, costs) < before {
                            routes[from] = candidate;
                            return true;
                        }
                    }
                } else {
                    let before =
                        route_cost(&routes[from], costs) + route_cost(&routes[to], costs);
                    let source_cost = route_cost(&source, costs);
                    for insert in 0..=routes[to].len() {
                        let mut target = routes[to].clone();
                        target.insert(insert, delivery);
                        if source_cost + route_cost(&target, costs) < before {
                            routes[from] = source.clone();
                            routes[to] = target;
                            return true;
                        }
                    }
                }
            }
        }
    }

    false
}
