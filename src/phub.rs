//! p-hub facility allocation.
//!
//! Chooses which candidate locations open as hubs and assigns every
//! demand point to exactly one open hub, minimizing demand-weighted
//! transport cost. Backends are interchangeable behind [`PHubSolver`];
//! any assignment they produce must pass [`PHubAssignment::verify`].

use tracing::debug;

use crate::distance::{CachingOracle, DistanceMatrix, DistanceOracle};
use crate::error::{ConfigError, DispatchError};
use crate::types::Point;

/// One facility-location run over co-indexed candidates and demand points.
#[derive(Debug, Clone)]
pub struct PHubProblem {
    /// Number of hubs to open.
    pub hubs: usize,
    /// Demand weight per candidate region.
    pub demands: Vec<f64>,
    /// Candidate-to-candidate transport costs.
    pub transport_costs: DistanceMatrix,
}

impl PHubProblem {
    pub fn new(hubs: usize, demands: Vec<f64>, transport_costs: DistanceMatrix) -> Self {
        Self {
            hubs,
            demands,
            transport_costs,
        }
    }

    pub fn candidates(&self) -> usize {
        self.transport_costs.size()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hubs == 0 {
            return Err(ConfigError::NoHubsRequested);
        }
        if self.hubs > self.candidates() {
            return Err(ConfigError::TooManyHubs {
                hubs: self.hubs,
                candidates: self.candidates(),
            });
        }
        if self.demands.len() != self.candidates() {
            return Err(ConfigError::DemandDimensionMismatch {
                demands: self.demands.len(),
                candidates: self.candidates(),
            });
        }
        Ok(())
    }
}

/// Which hubs opened and which hub serves each demand point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PHubAssignment {
    /// `active[i]` - candidate `i` opened as a hub.
    pub active: Vec<bool>,
    /// `allocation[i][j]` - demand `j` is served by hub `i`.
    pub allocation: Vec<Vec<bool>>,
}

impl PHubAssignment {
    /// Hub serving demand `demand`, if any.
    pub fn hub_of(&self, demand: usize) -> Option<usize> {
        self.allocation.iter().position(|row| row[demand])
    }

    /// Demand indices served by hub `hub`.
    pub fn allocated_to(&self, hub: usize) -> Vec<usize> {
        self.allocation[hub]
            .iter()
            .enumerate()
            .filter(|&(_, &served)| served)
            .map(|(demand, _)| demand)
            .collect()
    }

    /// Checks the feasibility constraints: at most `hubs` open, every
    /// demand served exactly once, and only open hubs serve demand.
    pub fn verify(&self, problem: &PHubProblem) -> bool {
        let n = problem.candidates();
        if self.active.len() != n || self.allocation.len() != n {
            return false;
        }
        if self.allocation.iter().any(|row| row.len() != n) {
            return false;
        }
        if self.active.iter().filter(|&&open| open).count() > problem.hubs {
            return false;
        }
        for demand in 0..n {
            let servers = (0..n).filter(|&hub| self.allocation[hub][demand]).count();
            if servers != 1 {
                return false;
            }
        }
        for (hub, row) in self.allocation.iter().enumerate() {
            if !self.active[hub] && row.iter().any(|&served| served) {
                return false;
            }
        }
        true
    }

    /// Total demand-weighted transport cost of this assignment.
    pub fn cost(&self, problem: &PHubProblem) -> f64 {
        let mut total = 0.0;
        for (hub, row) in self.allocation.iter().enumerate() {
            for (demand, &served) in row.iter().enumerate() {
                if served {
                    total += problem.transport_costs.get(hub, demand) * problem.demands[demand];
                }
            }
        }
        total
    }
}

/// Backend capable of solving a [`PHubProblem`].
pub trait PHubSolver {
    fn solve(&self, problem: &PHubProblem) -> Result<PHubAssignment, ConfigError>;
}

/// Deterministic vertex-substitution heuristic: greedy hub opening
/// followed by best-improvement swaps. Exhaustive, hence exact, when a
/// single hub is requested.
#[derive(Debug, Clone, Copy, Default)]
pub struct VertexSubstitution;

impl VertexSubstitution {
    /// Cost of serving every demand from its cheapest hub in `open`.
    fn allocation_cost(problem: &PHubProblem, open: &[usize]) -> f64 {
        (0..problem.candidates())
            .map(|demand| {
                let cheapest = open
                    .iter()
                    .map(|&hub| problem.transport_costs.get(hub, demand))
                    .fold(f64::INFINITY, f64::min);
                cheapest * problem.demands[demand]
            })
            .sum()
    }

    fn assignment_from(problem: &PHubProblem, open: &[usize]) -> PHubAssignment {
        let n = problem.candidates();
        let mut active = vec![false; n];
        for &hub in open {
            active[hub] = true;
        }

        let mut allocation = vec![vec![false; n]; n];
        for demand in 0..n {
            let mut best_hub = open[0];
            let mut best_cost = f64::INFINITY;
            for &hub in open {
                let cost = problem.transport_costs.get(hub, demand);
                if cost < best_cost {
                    best_hub = hub;
                    best_cost = cost;
                }
            }
            allocation[best_hub][demand] = true;
        }

        PHubAssignment { active, allocation }
    }
}

impl PHubSolver for VertexSubstitution {
    fn solve(&self, problem: &PHubProblem) -> Result<PHubAssignment, ConfigError> {
        problem.validate()?;
        let n = problem.candidates();

        // Greedy construction: open the hub that lowers the allocation
        // cost most, until the requested count is reached.
        let mut open: Vec<usize> = Vec::with_capacity(problem.hubs);
        while open.len() < problem.hubs {
            let mut best: Option<(usize, f64)> = None;
            for candidate in 0..n {
                if open.contains(&candidate) {
                    continue;
                }
                open.push(candidate);
                let cost = Self::allocation_cost(problem, &open);
                open.pop();
                if best.is_none_or(|(_, best_cost)| cost < best_cost) {
                    best = Some((candidate, cost));
                }
            }
            // validate() guarantees hubs <= candidates, so a candidate
            // always remains.
            let (candidate, _) = best.ok_or(ConfigError::TooManyHubs {
                hubs: problem.hubs,
                candidates: n,
            })?;
            open.push(candidate);
        }

        // Vertex substitution: swap an open hub for a closed candidate
        // while doing so strictly improves the cost.
        let mut current_cost = Self::allocation_cost(problem, &open);
        loop {
            let mut best_swap: Option<(usize, usize, f64)> = None;
            for slot in 0..open.len() {
                for candidate in 0..n {
                    if open.contains(&candidate) {
                        continue;
                    }
                    let previous = open[slot];
                    open[slot] = candidate;
                    let cost = Self::allocation_cost(problem, &open);
                    open[slot] = previous;
                    if cost < current_cost
                        && best_swap.is_none_or(|(_, _, best_cost)| cost < best_cost)
                    {
                        best_swap = Some((slot, candidate, cost));
                    }
                }
            }
            match best_swap {
                Some((slot, candidate, cost)) => {
                    open[slot] = candidate;
                    current_cost = cost;
                }
                None => break,
            }
        }

        debug!(hubs = open.len(), cost = current_cost, "hub selection settled");
        Ok(Self::assignment_from(problem, &open))
    }
}

/// Outcome of a location query: the summed nearest-hub distance before
/// and after opening the best candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationQuery {
    /// Summed nearest-origin distance with the current origins only.
    pub baseline_m: f64,
    /// Candidate whose opening lowers the sum the most.
    pub best_candidate: usize,
    /// Summed nearest-origin distance after opening that candidate.
    pub best_total_m: f64,
}

/// Scores candidate hub locations by how much opening each would lower
/// the summed nearest-origin distance over `clients`.
///
/// Pairwise lookups go through a [`CachingOracle`] scoped to this call,
/// so repeated client points cost one backend query each.
pub fn min_sum_location<O: DistanceOracle>(
    origins: &[Point],
    candidates: &[Point],
    clients: &[Point],
    oracle: O,
) -> Result<LocationQuery, DispatchError> {
    if candidates.is_empty() {
        return Err(ConfigError::NoCandidates.into());
    }

    let cached = CachingOracle::new(oracle);

    let mut nearest = Vec::with_capacity(clients.len());
    for &client in clients {
        let mut best = f64::INFINITY;
        for &origin in origins {
            best = best.min(cached.pair(origin, client)?);
        }
        nearest.push(best);
    }
    let baseline_m: f64 = nearest.iter().sum();

    let mut best_candidate = 0;
    let mut best_total_m = f64::INFINITY;
    for (index, &candidate) in candidates.iter().enumerate() {
        let mut total = 0.0;
        for (&client, &current) in clients.iter().zip(&nearest) {
            total += current.min(cached.pair(candidate, client)?);
        }
        if total < best_total_m {
            best_candidate = index;
            best_total_m = total;
        }
    }

    Ok(LocationQuery {
        baseline_m,
        best_candidate,
        best_total_m,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::GreatCircle;

    /// Three candidates on a line; the middle one is cheapest overall.
    fn line_problem(hubs: usize) -> PHubProblem {
        let costs = DistanceMatrix::from_fn(3, |from, to| {
            (from as f64 - to as f64).abs() * 1000.0
        });
        PHubProblem::new(hubs, vec![1.0, 1.0, 1.0], costs)
    }

    #[test]
    fn test_single_hub_picks_the_cheapest_candidate() {
        let problem = line_problem(1);
        let assignment = VertexSubstitution.solve(&problem).unwrap();

        assert_eq!(assignment.active, vec![false, true, false]);
        for demand in 0..3 {
            assert_eq!(assignment.hub_of(demand), Some(1));
        }
        assert!(assignment.verify(&problem));
        assert_eq!(assignment.cost(&problem), 2000.0);
    }

    #[test]
    fn test_zero_hubs_is_infeasible() {
        let problem = line_problem(0);
        assert_eq!(
            VertexSubstitution.solve(&problem),
            Err(ConfigError::NoHubsRequested)
        );
    }

    #[test]
    fn test_more_hubs_than_candidates_is_infeasible() {
        let problem = line_problem(4);
        assert_eq!(
            VertexSubstitution.solve(&problem),
            Err(ConfigError::TooManyHubs { hubs: 4, candidates: 3 })
        );
    }

    #[test]
    fn test_demand_dimension_mismatch_is_rejected() {
        let costs = DistanceMatrix::zeros(3);
        let problem = PHubProblem::new(1, vec![1.0, 1.0], costs);
        assert_eq!(
            VertexSubstitution.solve(&problem),
            Err(ConfigError::DemandDimensionMismatch { demands: 2, candidates: 3 })
        );
    }

    #[test]
    fn test_demand_weights_steer_the_selection() {
        // Candidate 0 is far from everything except itself, but carries
        // almost all the demand.
        let costs = DistanceMatrix::from_fn(3, |from, to| {
            if from == to { 0.0 } else { 1000.0 }
        });
        let problem = PHubProblem::new(1, vec![100.0, 1.0, 1.0], costs);

        let assignment = VertexSubstitution.solve(&problem).unwrap();
        assert_eq!(assignment.hub_of(0), Some(0));
        assert!(assignment.active[0]);
    }

    #[test]
    fn test_two_hubs_split_two_far_groups() {
        // Demands 0,1 sit together and 2,3 sit together, groups far apart.
        let costs = DistanceMatrix::from_fn(4, |from, to| {
            let group = |i: usize| i / 2;
            if from == to {
                0.0
            } else if group(from) == group(to) {
                100.0
            } else {
                100_000.0
            }
        });
        let problem = PHubProblem::new(2, vec![1.0; 4], costs);

        let assignment = VertexSubstitution.solve(&problem).unwrap();
        assert!(assignment.verify(&problem));

        let hub_of_0 = assignment.hub_of(0).unwrap();
        let hub_of_2 = assignment.hub_of(2).unwrap();
        assert_ne!(hub_of_0 / 2, hub_of_2 / 2, "each group gets its own hub");
        assert!(assignment.cost(&problem) <= 400.0);
    }

    #[test]
    fn test_verify_rejects_unserved_demand() {
        let problem = line_problem(1);
        let assignment = PHubAssignment {
            active: vec![false, true, false],
            allocation: vec![vec![false; 3]; 3],
        };
        assert!(!assignment.verify(&problem));
    }

    #[test]
    fn test_verify_rejects_allocation_to_closed_hub() {
        let problem = line_problem(1);
        let mut allocation = vec![vec![false; 3]; 3];
        allocation[0][0] = true;
        allocation[0][1] = true;
        allocation[0][2] = true;
        let assignment = PHubAssignment {
            active: vec![false, true, false],
            allocation,
        };
        assert!(!assignment.verify(&problem));
    }

    #[test]
    fn test_verify_rejects_too_many_open_hubs() {
        let problem = line_problem(1);
        let mut allocation = vec![vec![false; 3]; 3];
        allocation[0][0] = true;
        allocation[1][1] = true;
        allocation[1][2] = true;
        let assignment = PHubAssignment {
            active: vec![true, true, false],
            allocation,
        };
        assert!(!assignment.verify(&problem));
    }

    #[test]
    fn test_min_sum_location_prefers_the_dense_side() {
        let origins = vec![Point::new(0.0, 0.0)];
        let candidates = vec![Point::new(0.001, 0.0), Point::new(1.0, 0.0)];
        let clients = vec![
            Point::new(1.0, 0.001),
            Point::new(1.0, -0.001),
            Point::new(1.001, 0.0),
        ];

        let query = min_sum_location(&origins, &candidates, &clients, GreatCircle).unwrap();
        assert_eq!(query.best_candidate, 1);
        assert!(query.best_total_m < query.baseline_m);
    }

    #[test]
    fn test_min_sum_location_needs_candidates() {
        let result = min_sum_location(&[], &[], &[], GreatCircle);
        assert!(matches!(
            result,
            Err(DispatchError::Config(ConfigError::NoCandidates))
        ));
    }
}
