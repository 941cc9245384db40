//! Clustering decomposition engines.
//!
//! Splits a large instance into solver-sized subproblems along cluster
//! lines, routes the pieces on the rayon pool, and reassembles the
//! partial routes. Subinstances the backend reports infeasible are
//! dropped with a warning instead of failing the run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::distance::DistanceOracle;
use crate::error::{ConfigError, DispatchError, SolverError};
use crate::kmeans::{Clusterer, cluster_count};
use crate::phub::{PHubProblem, PHubSolver};
use crate::solver::{RouteSolver, SolverParams};
use crate::types::{CVRPInstance, CVRPSolution, CVRPSolutionVehicle, Delivery, DeliveryProblem, Point};

/// Cooperative cancellation flag shared with engine workers.
///
/// Workers check it at subinstance boundaries: cancelling abandons
/// remaining clusters and the engine returns what is already routed.
#[derive(Debug, Default)]
pub struct CancelToken {
    flag: AtomicBool,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Partition-then-route configuration.
#[derive(Debug, Clone)]
pub struct PartitionParams {
    /// Exact cluster count; wins over `target_cluster_size`.
    pub fixed_clusters: Option<usize>,
    /// Derive the count as ceil(deliveries / target).
    pub target_cluster_size: Option<usize>,
    pub seed: u64,
    pub solver: SolverParams,
}

impl Default for PartitionParams {
    fn default() -> Self {
        Self {
            fixed_clusters: None,
            target_cluster_size: Some(500),
            seed: 0,
            solver: SolverParams {
                solution_limit: Some(1_000),
                time_limit_ms: 120_000,
                ..SolverParams::default()
            },
        }
    }
}

/// Aggregate-then-route configuration.
#[derive(Debug, Clone)]
pub struct AggregateParams {
    pub fixed_clusters: Option<usize>,
    pub target_cluster_size: Option<usize>,
    pub seed: u64,
    /// Parameters for the per-cluster solves.
    pub cluster_solver: SolverParams,
    /// Parameters for the meta-delivery solve.
    pub solver: SolverParams,
}

impl Default for AggregateParams {
    fn default() -> Self {
        Self {
            fixed_clusters: None,
            target_cluster_size: Some(100),
            seed: 0,
            cluster_solver: SolverParams {
                solution_limit: Some(300),
                time_limit_ms: 10_000,
                ..SolverParams::default()
            },
            solver: SolverParams::default(),
        }
    }
}

/// Routes a large instance by clustering deliveries and solving each
/// cluster as an independent subinstance.
///
/// Clusters with fewer than two deliveries are returned as-is without
/// invoking the solver. Vehicles come back grouped by cluster index.
pub fn partition_route<C, S>(
    instance: &CVRPInstance,
    params: &PartitionParams,
    clusterer: &C,
    solver: &S,
    cancel: &CancelToken,
) -> Result<CVRPSolution, DispatchError>
where
    C: Clusterer + Sync,
    S: RouteSolver + Sync,
{
    instance.validate()?;
    if instance.deliveries.is_empty() {
        return Ok(empty_solution(instance));
    }

    let buckets = cluster_deliveries(
        instance,
        params.fixed_clusters,
        params.target_cluster_size,
        params.seed,
        clusterer,
    )?;
    info!(
        instance = %instance.name,
        deliveries = instance.deliveries.len(),
        clusters = buckets.len(),
        "partitioning instance"
    );

    let routed: Vec<Vec<CVRPSolutionVehicle>> = buckets
        .par_iter()
        .enumerate()
        .map(|(index, bucket)| route_bucket(instance, index, bucket, &params.solver, solver, cancel))
        .collect::<Result<_, _>>()?;

    Ok(CVRPSolution {
        name: instance.name.clone(),
        vehicles: routed.into_iter().flatten().collect(),
    })
}

/// Routes one cluster of a partitioned instance.
fn route_bucket<S: RouteSolver>(
    instance: &CVRPInstance,
    index: usize,
    bucket: &[Delivery],
    params: &SolverParams,
    solver: &S,
    cancel: &CancelToken,
) -> Result<Vec<CVRPSolutionVehicle>, DispatchError> {
    if bucket.is_empty() || cancel.is_cancelled() {
        return Ok(Vec::new());
    }
    if bucket.len() < 2 {
        return Ok(vec![CVRPSolutionVehicle {
            origin: instance.origin,
            deliveries: bucket.to_vec(),
        }]);
    }

    let sub = CVRPInstance {
        name: instance.name.clone(),
        region: instance.region.clone(),
        origin: instance.origin,
        vehicle_capacity: instance.vehicle_capacity,
        deliveries: bucket.to_vec(),
    };
    match solver.solve(&sub, params) {
        Ok(solution) => Ok(solution.vehicles),
        Err(SolverError::Infeasible) => {
            warn!(
                cluster = index,
                deliveries = bucket.len(),
                "dropping cluster with no feasible routes"
            );
            Ok(Vec::new())
        }
        Err(SolverError::Config(err)) => Err(DispatchError::Config(err)),
        Err(SolverError::Oracle(err)) => Err(DispatchError::Oracle(err)),
    }
}

/// Routes a large instance by solving each cluster, collapsing every
/// intra-cluster route into one meta-delivery, and routing the
/// meta-deliveries; each meta-delivery then expands back into its
/// original intra-cluster route order.
pub fn aggregate_route<C, S>(
    instance: &CVRPInstance,
    params: &AggregateParams,
    clusterer: &C,
    solver: &S,
    cancel: &CancelToken,
) -> Result<CVRPSolution, DispatchError>
where
    C: Clusterer + Sync,
    S: RouteSolver + Sync,
{
    instance.validate()?;
    if instance.deliveries.is_empty() {
        return Ok(empty_solution(instance));
    }

    let buckets = cluster_deliveries(
        instance,
        params.fixed_clusters,
        params.target_cluster_size,
        params.seed,
        clusterer,
    )?;
    info!(
        instance = %instance.name,
        deliveries = instance.deliveries.len(),
        clusters = buckets.len(),
        "aggregating instance"
    );

    // Legs: intra-cluster routes in cluster order, each to become one
    // meta-delivery.
    let routed: Vec<Vec<Vec<Delivery>>> = buckets
        .par_iter()
        .enumerate()
        .map(|(index, bucket)| -> Result<Vec<Vec<Delivery>>, DispatchError> {
            if bucket.is_empty() || cancel.is_cancelled() {
                return Ok(Vec::new());
            }
            if bucket.len() < 2 {
                return Ok(vec![bucket.to_vec()]);
            }
            let vehicles = route_bucket(
                instance,
                index,
                bucket,
                &params.cluster_solver,
                solver,
                cancel,
            )?;
            Ok(vehicles.into_iter().map(|v| v.deliveries).collect())
        })
        .collect::<Result<_, _>>()?;
    let legs: Vec<Vec<Delivery>> = routed.into_iter().flatten().collect();

    if legs.is_empty() {
        return Ok(empty_solution(instance));
    }

    let meta_deliveries: Vec<Delivery> = legs
        .iter()
        .enumerate()
        .map(|(index, leg)| Delivery {
            id: index.to_string(),
            point: leg[0].point,
            size: leg.iter().map(|d| d.size).sum(),
        })
        .collect();
    let meta_instance = CVRPInstance {
        name: instance.name.clone(),
        region: instance.region.clone(),
        origin: instance.origin,
        vehicle_capacity: instance.vehicle_capacity,
        deliveries: meta_deliveries,
    };

    let meta_solution = match solver.solve(&meta_instance, &params.solver) {
        Ok(solution) => solution,
        Err(SolverError::Infeasible) => return Err(DispatchError::Infeasible),
        Err(SolverError::Config(err)) => return Err(DispatchError::Config(err)),
        Err(SolverError::Oracle(err)) => return Err(DispatchError::Oracle(err)),
    };

    // Meta ids are the leg indices assigned above; a backend inventing
    // its own ids cannot be expanded and fails the run.
    let mut vehicles = Vec::with_capacity(meta_solution.vehicles.len());
    for vehicle in meta_solution.vehicles {
        let mut deliveries = Vec::new();
        for meta in &vehicle.deliveries {
            let leg = meta
                .id
                .parse::<usize>()
                .ok()
                .filter(|&leg| leg < legs.len())
                .ok_or_else(|| DispatchError::UnknownMetaDelivery(meta.id.clone()))?;
            deliveries.extend(legs[leg].iter().cloned());
        }
        vehicles.push(CVRPSolutionVehicle {
            origin: instance.origin,
            deliveries,
        });
    }

    Ok(CVRPSolution {
        name: instance.name.clone(),
        vehicles,
    })
}

/// Hub split configuration.
#[derive(Debug, Clone)]
pub struct HubSplitParams {
    /// Demand subregions to estimate before choosing hubs.
    pub num_clusters: usize,
    pub seed: u64,
}

impl Default for HubSplitParams {
    fn default() -> Self {
        Self {
            num_clusters: 256,
            seed: 0,
        }
    }
}

/// Splits a multi-hub problem into one single-depot instance per chosen
/// hub: cluster the demand, pick hubs over the cluster centers, then
/// group each delivery under the hub serving its cluster.
pub fn split_by_hubs<O, C, P>(
    problem: &DeliveryProblem,
    params: &HubSplitParams,
    oracle: &O,
    clusterer: &C,
    allocator: &P,
) -> Result<Vec<CVRPInstance>, DispatchError>
where
    O: DistanceOracle,
    C: Clusterer,
    P: PHubSolver,
{
    problem.validate()?;
    if problem.deliveries.is_empty() {
        return Ok(Vec::new());
    }

    let points: Vec<Point> = problem.deliveries.iter().map(|d| d.point).collect();
    let clusters = params.num_clusters.clamp(1, points.len());
    let clustering = clusterer.fit(&points, clusters, params.seed)?;

    let labels: Vec<usize> = points.iter().map(|&p| clustering.predict(p)).collect();
    let mut demands = vec![0.0f64; clustering.len()];
    for &label in &labels {
        demands[label] += 1.0;
    }

    let transport_costs = oracle.matrix(clustering.centroids())?;
    let assignment = allocator.solve(&PHubProblem::new(
        problem.max_hubs,
        demands,
        transport_costs,
    ))?;

    let mut groups: HashMap<usize, Vec<Delivery>> = HashMap::new();
    for (delivery, &label) in problem.deliveries.iter().zip(&labels) {
        let hub = match assignment.hub_of(label) {
            Some(hub) => hub,
            None => return Err(DispatchError::Infeasible),
        };
        groups.entry(hub).or_default().push(delivery.clone());
    }

    let mut hubs: Vec<usize> = groups.keys().copied().collect();
    hubs.sort_unstable();
    info!(
        problem = %problem.name,
        hubs = hubs.len(),
        requested = problem.max_hubs,
        "split problem into hub instances"
    );

    Ok(hubs
        .into_iter()
        .enumerate()
        .map(|(sequence, hub)| CVRPInstance {
            name: format!("{}-{}", problem.name, sequence),
            region: problem.region.clone(),
            origin: clustering.centroids()[hub],
            vehicle_capacity: problem.vehicle_capacity,
            deliveries: groups.remove(&hub).unwrap_or_default(),
        })
        .collect())
}

fn empty_solution(instance: &CVRPInstance) -> CVRPSolution {
    CVRPSolution {
        name: instance.name.clone(),
        vehicles: Vec::new(),
    }
}

/// Buckets instance deliveries by fitted cluster, preserving input order
/// inside each bucket.
fn cluster_deliveries<C: Clusterer>(
    instance: &CVRPInstance,
    fixed: Option<usize>,
    target_size: Option<usize>,
    seed: u64,
    clusterer: &C,
) -> Result<Vec<Vec<Delivery>>, ConfigError> {
    let points: Vec<Point> = instance.deliveries.iter().map(|d| d.point).collect();
    let clusters = cluster_count(points.len(), fixed, target_size);
    let clustering = clusterer.fit(&points, clusters, seed)?;

    let mut buckets: Vec<Vec<Delivery>> = vec![Vec::new(); clustering.len()];
    for delivery in &instance.deliveries {
        buckets[clustering.predict(delivery.point)].push(delivery.clone());
    }
    Ok(buckets)
}
