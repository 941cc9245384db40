//! Error types for the dispatch core.
//!
//! Four failure classes with distinct recovery semantics: configuration
//! errors abort before any solving starts, validation errors mark a
//! finished solution infeasible, oracle errors mean the distance backend
//! is unreachable and the call can be retried, and solver infeasibility
//! is recovered by dropping the affected subinstance in batch modes.

use std::fmt;
use std::io;

/// Fatal input errors detected before any solving begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Vehicle capacity must be at least 1.
    ZeroCapacity,
    /// Two deliveries share the same id.
    DuplicateDeliveryId(String),
    /// A delivery that can never fit in any vehicle.
    OversizedDelivery {
        id: String,
        size: u32,
        capacity: u32,
    },
    /// Zero hubs requested from the facility allocator.
    NoHubsRequested,
    /// More hubs requested than candidate locations exist.
    TooManyHubs { hubs: usize, candidates: usize },
    /// Demand vector length does not match the cost matrix dimension.
    DemandDimensionMismatch { demands: usize, candidates: usize },
    /// Clustering requested with zero clusters.
    ZeroClusters,
    /// More clusters requested than points available.
    TooManyClusters { clusters: usize, points: usize },
    /// Model training requested over an empty point set.
    EmptyTrainingSet,
    /// A location query needs at least one candidate.
    NoCandidates,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroCapacity => {
                write!(f, "vehicle capacity must be at least 1")
            }
            ConfigError::DuplicateDeliveryId(id) => {
                write!(f, "duplicate delivery id {:?}", id)
            }
            ConfigError::OversizedDelivery { id, size, capacity } => {
                write!(
                    f,
                    "delivery {:?} has size {} exceeding vehicle capacity {}",
                    id, size, capacity
                )
            }
            ConfigError::NoHubsRequested => {
                write!(f, "at least one hub must be requested")
            }
            ConfigError::TooManyHubs { hubs, candidates } => {
                write!(f, "{} hubs requested but only {} candidates", hubs, candidates)
            }
            ConfigError::DemandDimensionMismatch { demands, candidates } => {
                write!(
                    f,
                    "{} demand entries for a {}x{} cost matrix",
                    demands, candidates, candidates
                )
            }
            ConfigError::ZeroClusters => {
                write!(f, "cluster count must be at least 1")
            }
            ConfigError::TooManyClusters { clusters, points } => {
                write!(f, "{} clusters requested over {} points", clusters, points)
            }
            ConfigError::EmptyTrainingSet => {
                write!(f, "no points available to fit a model")
            }
            ConfigError::NoCandidates => {
                write!(f, "location query needs at least one candidate")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// A finished solution violating one of the feasibility invariants.
///
/// Violations are surfaced, never silently repaired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Solution deliveries are not exactly the instance deliveries.
    CoverageMismatch { missing: usize, extra: usize },
    /// A vehicle carries more than the instance capacity allows.
    CapacityExceeded {
        vehicle: usize,
        occupation: u32,
        capacity: u32,
    },
    /// A vehicle starts somewhere other than the instance origin.
    OriginMismatch { vehicle: usize },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::CoverageMismatch { missing, extra } => {
                write!(
                    f,
                    "delivery coverage violated: {} missing, {} unknown or duplicated",
                    missing, extra
                )
            }
            ValidationError::CapacityExceeded {
                vehicle,
                occupation,
                capacity,
            } => {
                write!(
                    f,
                    "vehicle {} occupies {} of capacity {}",
                    vehicle, occupation, capacity
                )
            }
            ValidationError::OriginMismatch { vehicle } => {
                write!(f, "vehicle {} does not start at the instance origin", vehicle)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Distance backend failures.
///
/// Transport errors and malformed payloads both surface here so callers
/// can retry or fall back instead of treating them as zero distances.
#[derive(Debug)]
pub enum OracleError {
    /// Connection, timeout, or non-2xx status from the distance service.
    Http(reqwest::Error),
    /// A 2xx response without the expected payload.
    MalformedResponse(String),
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleError::Http(err) => {
                write!(f, "distance service request failed: {}", err)
            }
            OracleError::MalformedResponse(msg) => {
                write!(f, "distance service returned an unexpected payload: {}", msg)
            }
        }
    }
}

impl std::error::Error for OracleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OracleError::Http(err) => Some(err),
            OracleError::MalformedResponse(_) => None,
        }
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        OracleError::Http(err)
    }
}

/// Route solver backend failures.
#[derive(Debug)]
pub enum SolverError {
    /// No feasible assignment exists under the given parameters.
    Infeasible,
    /// The instance failed validation before solving.
    Config(ConfigError),
    /// Distance lookups failed while building the subproblem.
    Oracle(OracleError),
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::Infeasible => write!(f, "no feasible route assignment"),
            SolverError::Config(err) => write!(f, "invalid instance: {}", err),
            SolverError::Oracle(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for SolverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SolverError::Infeasible => None,
            SolverError::Config(err) => Some(err),
            SolverError::Oracle(err) => Some(err),
        }
    }
}

impl From<ConfigError> for SolverError {
    fn from(err: ConfigError) -> Self {
        SolverError::Config(err)
    }
}

impl From<OracleError> for SolverError {
    fn from(err: OracleError) -> Self {
        SolverError::Oracle(err)
    }
}

/// Failures of the decomposition engines and batch drivers.
#[derive(Debug)]
pub enum DispatchError {
    Config(ConfigError),
    Oracle(OracleError),
    /// The top-level solve found no feasible assignment at all.
    Infeasible,
    /// A meta-level solve returned a delivery id the aggregation step
    /// never emitted, so its route cannot be expanded.
    UnknownMetaDelivery(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Config(err) => write!(f, "{}", err),
            DispatchError::Oracle(err) => write!(f, "{}", err),
            DispatchError::Infeasible => write!(f, "no feasible route assignment"),
            DispatchError::UnknownMetaDelivery(id) => {
                write!(f, "meta delivery {:?} does not match any aggregated route", id)
            }
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Config(err) => Some(err),
            DispatchError::Oracle(err) => Some(err),
            DispatchError::Infeasible => None,
            DispatchError::UnknownMetaDelivery(_) => None,
        }
    }
}

impl From<ConfigError> for DispatchError {
    fn from(err: ConfigError) -> Self {
        DispatchError::Config(err)
    }
}

impl From<OracleError> for DispatchError {
    fn from(err: OracleError) -> Self {
        DispatchError::Oracle(err)
    }
}

/// Evaluation failures: either the solution is infeasible or the
/// distance backend could not cost it.
#[derive(Debug)]
pub enum EvalError {
    Validation(ValidationError),
    Oracle(OracleError),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Validation(err) => write!(f, "{}", err),
            EvalError::Oracle(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for EvalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EvalError::Validation(err) => Some(err),
            EvalError::Oracle(err) => Some(err),
        }
    }
}

impl From<ValidationError> for EvalError {
    fn from(err: ValidationError) -> Self {
        EvalError::Validation(err)
    }
}

impl From<OracleError> for EvalError {
    fn from(err: OracleError) -> Self {
        EvalError::Oracle(err)
    }
}

/// Instance and solution file persistence failures.
#[derive(Debug)]
pub enum StorageError {
    Io(io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(err) => write!(f, "instance file i/o failed: {}", err),
            StorageError::Json(err) => write!(f, "instance file is not valid json: {}", err),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(err) => Some(err),
            StorageError::Json(err) => Some(err),
        }
    }
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Json(err)
    }
}
