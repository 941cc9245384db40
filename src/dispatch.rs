//! Online per-delivery dispatch models.
//!
//! Both models share one lifecycle: `pretrain` fits a static partition of
//! the service area from historical instances, `finetune` binds the
//! trained model to one instance, `route` places deliveries one at a time
//! as they arrive, and `finish` hands every accumulated route to a solver
//! for reordering. Each stage is a distinct type, so deliveries cannot be
//! routed before tuning and a finished state cannot be reused.

use std::f64::consts::PI;

use tracing::{info, warn};

use crate::error::{ConfigError, SolverError};
use crate::kmeans::{Clusterer, Clustering, KMeans, cluster_count};
use crate::solver::{RouteSolver, SolverParams};
use crate::types::{CVRPInstance, CVRPSolution, CVRPSolutionVehicle, Delivery, Point};

/// Capacity multiplier for the reorder subinstances built by `finish`.
/// No new demand is added at that stage.
pub const FINISH_CAPACITY_FACTOR: u32 = 3;

/// A static partition of the service area fitted from historical data.
///
/// `region_of` must be a pure function of the point: streaming the same
/// deliveries through the same trained model replays identically.
pub trait RegionModel {
    /// Number of sub-regions.
    fn regions(&self) -> usize;

    /// Sub-region serving `point`.
    fn region_of(&self, point: Point) -> usize;

    /// Binds this trained model to one instance, producing fresh dispatch
    /// state. The trained model itself is never mutated and can be tuned
    /// to many instances concurrently.
    fn finetune(&self, instance: &CVRPInstance) -> Result<Tuned<Self>, ConfigError>
    where
        Self: Clone + Sized,
    {
        instance.validate()?;
        Ok(Tuned {
            model: self.clone(),
            capacity: instance.vehicle_capacity,
            origin: instance.origin,
            routes: vec![Vec::new(); self.regions()],
        })
    }
}

/// Instance-bound dispatch state produced by [`RegionModel::finetune`].
///
/// Owns its working copies of the partial routes; the instance and the
/// trained model stay untouched.
#[derive(Debug, Clone)]
pub struct Tuned<M> {
    model: M,
    capacity: u32,
    origin: Point,
    routes: Vec<Vec<CVRPSolutionVehicle>>,
}

impl<M: RegionModel> Tuned<M> {
    /// Places one delivery: into the most occupied open route of its
    /// region that still has room, or a fresh route at the origin.
    ///
    /// Room means `occupation + size <= capacity`, the same bound the
    /// evaluator enforces. Calls for one tuned state are inherently
    /// sequential.
    pub fn route(&mut self, delivery: &Delivery) {
        let region = self.model.region_of(delivery.point);
        let routes = &mut self.routes[region];

        let mut best: Option<usize> = None;
        let mut best_occupation = 0u32;
        for (index, route) in routes.iter().enumerate() {
            let occupation = route.occupation();
            // Widened so capacities near u32::MAX cannot overflow the sum.
            if u64::from(occupation) + u64::from(delivery.size) <= u64::from(self.capacity)
                && (best.is_none() || occupation > best_occupation)
            {
                best = Some(index);
                best_occupation = occupation;
            }
        }

        match best {
            Some(index) => routes[index].deliveries.push(delivery.clone()),
            None => {
                let mut fresh = CVRPSolutionVehicle::new(self.origin);
                fresh.deliveries.push(delivery.clone());
                routes.push(fresh);
            }
        }
    }

    /// Open routes accumulated so far, across all regions.
    pub fn open_routes(&self) -> usize {
        self.routes.iter().map(Vec::len).sum()
    }

    /// Reorders every accumulated route as a single-vehicle subinstance
    /// with capacity relaxed by [`FINISH_CAPACITY_FACTOR`], and assembles
    /// the final solution. Consumes the tuned state.
    ///
    /// A route the solver reports infeasible keeps its accumulated order
    /// instead of losing deliveries.
    pub fn finish<S: RouteSolver>(
        self,
        instance: &CVRPInstance,
        solver: &S,
        params: &SolverParams,
    ) -> Result<CVRPSolution, SolverError> {
        let reorder = SolverParams {
            max_vehicles: Some(1),
            ..params.clone()
        };

        let mut vehicles = Vec::new();
        for route in self.routes.into_iter().flatten() {
            if route.deliveries.len() < 2 {
                if !route.deliveries.is_empty() {
                    vehicles.push(route);
                }
                continue;
            }

            let sub = CVRPInstance {
                name: instance.name.clone(),
                region: instance.region.clone(),
                origin: route.origin,
                vehicle_capacity: instance.vehicle_capacity.saturating_mul(FINISH_CAPACITY_FACTOR),
                deliveries: route.deliveries.clone(),
            };
            match solver.solve(&sub, &reorder) {
                Ok(mut solution) => vehicles.append(&mut solution.vehicles),
                Err(SolverError::Infeasible) => {
                    warn!(
                        stops = route.deliveries.len(),
                        "keeping accumulated order for unreorderable route"
                    );
                    vehicles.push(route);
                }
                Err(err) => return Err(err),
            }
        }

        info!(instance = %instance.name, vehicles = vehicles.len(), "finished dispatch");
        Ok(CVRPSolution {
            name: instance.name.clone(),
            vehicles,
        })
    }
}

/// Nearest-cluster greedy model configuration.
#[derive(Debug, Clone)]
pub struct KMeansGreedyParams {
    /// Exact region count; wins over `target_cluster_size`.
    pub fixed_clusters: Option<usize>,
    /// Derive the count as ceil(training points / target).
    pub target_cluster_size: Option<usize>,
    pub seed: u64,
}

impl Default for KMeansGreedyParams {
    fn default() -> Self {
        Self {
            fixed_clusters: Some(150),
            target_cluster_size: None,
            seed: 0,
        }
    }
}

/// Nearest-cluster greedy model: regions are k-means clusters over all
/// historical delivery points.
#[derive(Debug, Clone)]
pub struct KMeansGreedyModel {
    clustering: Clustering,
}

impl KMeansGreedyModel {
    pub fn pretrain(
        instances: &[CVRPInstance],
        params: &KMeansGreedyParams,
    ) -> Result<Self, ConfigError> {
        let points: Vec<Point> = instances
            .iter()
            .flat_map(|instance| instance.deliveries.iter().map(|d| d.point))
            .collect();
        let clusters = cluster_count(
            points.len(),
            params.fixed_clusters,
            params.target_cluster_size,
        );
        let clustering = KMeans::default().fit(&points, clusters, params.seed)?;
        info!(
            regions = clustering.len(),
            points = points.len(),
            "fitted nearest-cluster dispatch model"
        );
        Ok(Self { clustering })
    }
}

impl RegionModel for KMeansGreedyModel {
    fn regions(&self) -> usize {
        self.clustering.len()
    }

    fn region_of(&self, point: Point) -> usize {
        self.clustering.predict(point)
    }
}

/// Angular sweep model configuration.
#[derive(Debug, Clone, Default)]
pub struct SweepParams {
    /// Region count; defaults to the fewest vehicles any training
    /// instance needs (total demand over capacity).
    pub num_regions: Option<usize>,
}

/// Angular sweep model: equal-frequency angle intervals around the
/// historical centroid, anchored at -PI and +PI so the full circle is
/// covered without gaps.
#[derive(Debug, Clone)]
pub struct SweepModel {
    center: Point,
    bounds: Vec<f64>,
}

impl SweepModel {
    pub fn pretrain(instances: &[CVRPInstance], params: &SweepParams) -> Result<Self, ConfigError> {
        let points: Vec<Point> = instances
            .iter()
            .flat_map(|instance| instance.deliveries.iter().map(|d| d.point))
            .collect();
        if points.is_empty() {
            return Err(ConfigError::EmptyTrainingSet);
        }

        let regions = params
            .num_regions
            .unwrap_or_else(|| default_region_count(instances))
            .max(1);

        let center = Point::new(
            points.iter().map(|p| p.lng).sum::<f64>() / points.len() as f64,
            points.iter().map(|p| p.lat).sum::<f64>() / points.len() as f64,
        );

        let mut angles: Vec<f64> = points
            .iter()
            .map(|p| (p.lat - center.lat).atan2(p.lng - center.lng))
            .collect();
        angles.sort_by(f64::total_cmp);

        // Equal-frequency bounds from the sorted angles, with the outer
        // bounds forced onto the atan2 range endpoints.
        let last = angles.len() - 1;
        let mut bounds: Vec<f64> = (0..=regions).map(|i| angles[i * last / regions]).collect();
        bounds[0] = -PI;
        bounds[regions] = PI;

        info!(regions, points = points.len(), "fitted angular sweep dispatch model");
        Ok(Self { center, bounds })
    }

    /// Interval bounds over the angle range, anchored at -PI and +PI.
    /// Region `i` covers `[bounds[i], bounds[i + 1])`, the last region
    /// closed at +PI.
    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }
}

impl RegionModel for SweepModel {
    fn regions(&self) -> usize {
        self.bounds.len() - 1
    }

    fn region_of(&self, point: Point) -> usize {
        let angle = (point.lat - self.center.lat).atan2(point.lng - self.center.lng);
        let upper = &self.bounds[1..];
        upper
            .partition_point(|&bound| angle >= bound)
            .min(upper.len() - 1)
    }
}

/// Fewest vehicles any training instance needs outright.
fn default_region_count(instances: &[CVRPInstance]) -> usize {
    instances
        .iter()
        .filter(|instance| instance.vehicle_capacity > 0)
        .map(|instance| {
            let demand: u64 = instance.deliveries.iter().map(|d| u64::from(d.size)).sum();
            demand.div_ceil(u64::from(instance.vehicle_capacity)) as usize
        })
        .min()
        .unwrap_or(1)
        .max(1)
}
