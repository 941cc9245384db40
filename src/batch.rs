//! Batch solving across many instances.
//!
//! One strategy tag per routing mode, exhaustively matched, so adding a
//! mode is a compile error until every driver handles it. Instances solve
//! independently on the rayon pool; non-fatal failures mark their entry in
//! the accumulated report and the run continues. Configuration errors
//! abort the batch since no useful partial work is possible.

use rayon::prelude::*;
use tracing::{info, warn};

use crate::dispatch::{
    KMeansGreedyModel, KMeansGreedyParams, RegionModel, SweepModel, SweepParams,
};
use crate::distance::DistanceOracle;
use crate::error::{DispatchError, EvalError, SolverError};
use crate::eval::{Evaluation, evaluate_solution};
use crate::kmeans::Clusterer;
use crate::partition::{
    AggregateParams, CancelToken, PartitionParams, aggregate_route, partition_route,
};
use crate::solver::{RouteSolver, SolverParams};
use crate::types::{CVRPInstance, CVRPSolution};

/// How a batch entry solves its instance.
#[derive(Debug, Clone)]
pub enum Strategy {
    /// Cluster, route each cluster, concatenate.
    Partition(PartitionParams),
    /// Cluster, route each cluster, resequence routes as meta-deliveries.
    Aggregate(AggregateParams),
    /// Online dispatch over a pretrained nearest-cluster model.
    KMeansGreedy {
        pretrain: KMeansGreedyParams,
        solver: SolverParams,
    },
    /// Online dispatch over a pretrained angular sweep model.
    Sweep {
        pretrain: SweepParams,
        solver: SolverParams,
    },
}

impl Strategy {
    /// Stable label for report rows.
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::Partition(_) => "partition",
            Strategy::Aggregate(_) => "aggregate",
            Strategy::KMeansGreedy { .. } => "kmeans-greedy",
            Strategy::Sweep { .. } => "sweep",
        }
    }
}

/// How one instance fared.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Solved(Evaluation),
    /// Skipped because the batch was cancelled before this instance ran.
    Cancelled,
    /// Non-fatal failure; the rest of the batch kept running.
    Failed(String),
}

/// One report row per input instance, in input order.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub instance: String,
    pub deliveries: usize,
    pub strategy: &'static str,
    pub outcome: BatchOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub results: Vec<BatchResult>,
}

impl BatchReport {
    pub fn solved(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, BatchOutcome::Solved(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, BatchOutcome::Failed(_)))
            .count()
    }

    /// Summed objective over the solved rows, in kilometers.
    pub fn total_distance_km(&self) -> f64 {
        self.results
            .iter()
            .filter_map(|r| match &r.outcome {
                BatchOutcome::Solved(eval) => Some(eval.distance_km),
                _ => None,
            })
            .sum()
    }
}

/// Solves and evaluates every instance with one strategy, accumulating a
/// report. Online strategies pretrain once over the whole slice before the
/// per-instance solves.
///
/// Returns `Err` only for configuration errors; anything recoverable lands
/// in the report as a failed row.
pub fn run_batch<O, C, S>(
    instances: &[CVRPInstance],
    strategy: &Strategy,
    oracle: &O,
    clusterer: &C,
    solver: &S,
    cancel: &CancelToken,
) -> Result<BatchReport, DispatchError>
where
    O: DistanceOracle + Sync,
    C: Clusterer + Sync,
    S: RouteSolver + Sync,
{
    // Configuration errors are fatal and surface before any solving, so a
    // malformed instance cannot waste the rest of the batch's work.
    for instance in instances {
        instance.validate()?;
    }

    // Pretraining failures are configuration errors too: abort up front.
    let model = match strategy {
        Strategy::KMeansGreedy { pretrain, .. } => Some(PretrainedModel::KMeansGreedy(
            KMeansGreedyModel::pretrain(instances, pretrain)?,
        )),
        Strategy::Sweep { pretrain, .. } => {
            Some(PretrainedModel::Sweep(SweepModel::pretrain(instances, pretrain)?))
        }
        Strategy::Partition(_) | Strategy::Aggregate(_) => None,
    };

    info!(
        instances = instances.len(),
        strategy = strategy.label(),
        "starting batch"
    );

    let results: Vec<BatchResult> = instances
        .par_iter()
        .map(|instance| BatchResult {
            instance: instance.name.clone(),
            deliveries: instance.deliveries.len(),
            strategy: strategy.label(),
            outcome: run_one(instance, strategy, model.as_ref(), oracle, clusterer, solver, cancel),
        })
        .collect();

    let report = BatchReport { results };
    info!(
        solved = report.solved(),
        failed = report.failed(),
        total_km = report.total_distance_km(),
        "batch finished"
    );
    Ok(report)
}

/// Model fitted once per batch for the online strategies.
#[derive(Debug, Clone)]
enum PretrainedModel {
    KMeansGreedy(KMeansGreedyModel),
    Sweep(SweepModel),
}

fn run_one<O, C, S>(
    instance: &CVRPInstance,
    strategy: &Strategy,
    model: Option<&PretrainedModel>,
    oracle: &O,
    clusterer: &C,
    solver: &S,
    cancel: &CancelToken,
) -> BatchOutcome
where
    O: DistanceOracle + Sync,
    C: Clusterer + Sync,
    S: RouteSolver + Sync,
{
    if cancel.is_cancelled() {
        return BatchOutcome::Cancelled;
    }

    let solved: Result<CVRPSolution, String> = match (strategy, model) {
        (Strategy::Partition(params), _) => {
            partition_route(instance, params, clusterer, solver, cancel).map_err(|e| e.to_string())
        }
        (Strategy::Aggregate(params), _) => {
            aggregate_route(instance, params, clusterer, solver, cancel).map_err(|e| e.to_string())
        }
        (Strategy::KMeansGreedy { solver: params, .. }, Some(PretrainedModel::KMeansGreedy(model))) => {
            stream_instance(model, instance, solver, params)
        }
        (Strategy::Sweep { solver: params, .. }, Some(PretrainedModel::Sweep(model))) => {
            stream_instance(model, instance, solver, params)
        }
        // run_batch pairs every online strategy with its model.
        (Strategy::KMeansGreedy { .. } | Strategy::Sweep { .. }, _) => {
            return BatchOutcome::Failed("strategy has no pretrained model".to_string());
        }
    };

    let solution = match solved {
        Ok(solution) => solution,
        Err(message) => {
            warn!(instance = %instance.name, error = %message, "instance failed");
            return BatchOutcome::Failed(message);
        }
    };

    match evaluate_solution(instance, &solution, oracle) {
        Ok(eval) => BatchOutcome::Solved(eval),
        Err(EvalError::Validation(err)) => {
            warn!(instance = %instance.name, error = %err, "solution rejected");
            BatchOutcome::Failed(err.to_string())
        }
        Err(EvalError::Oracle(err)) => {
            warn!(instance = %instance.name, error = %err, "evaluation oracle failed");
            BatchOutcome::Failed(err.to_string())
        }
    }
}

/// Replays an instance's deliveries through an online model in arrival
/// order, then finishes.
fn stream_instance<M, S>(
    model: &M,
    instance: &CVRPInstance,
    solver: &S,
    params: &SolverParams,
) -> Result<CVRPSolution, String>
where
    M: RegionModel + Clone,
    S: RouteSolver,
{
    let mut tuned = model.finetune(instance).map_err(|e| e.to_string())?;
    for delivery in &instance.deliveries {
        tuned.route(delivery);
    }
    tuned.finish(instance, solver, params).map_err(|e| match e {
        SolverError::Infeasible => "no feasible route assignment".to_string(),
        other => other.to_string(),
    })
}
