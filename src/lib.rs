//! cvrp-dispatch core
//!
//! Assigns geographically distributed deliveries to capacity-constrained
//! vehicles: distance oracles, p-hub facility allocation, clustering
//! decomposition engines, online dispatch models, and the feasibility
//! evaluator that scores every produced solution.

pub mod batch;
pub mod dispatch;
pub mod distance;
pub mod error;
pub mod eval;
pub mod kmeans;
pub mod osrm;
pub mod partition;
pub mod phub;
pub mod solver;
pub mod types;
