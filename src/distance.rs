//! Distance oracles and matrices.
//!
//! All costs are meters. Algorithms depend only on the [`DistanceOracle`]
//! trait, so road-network and great-circle backends are interchangeable.
//! Queries over fewer than two points return zero-valued results, not
//! errors.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::OracleError;
use crate::types::Point;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Dense point-to-point cost matrix in meters, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    data: Vec<f64>,
    size: usize,
}

impl DistanceMatrix {
    pub fn zeros(size: usize) -> Self {
        Self {
            data: vec![0.0; size * size],
            size,
        }
    }

    pub fn from_fn(size: usize, mut cost: impl FnMut(usize, usize) -> f64) -> Self {
        let mut matrix = Self::zeros(size);
        for from in 0..size {
            for to in 0..size {
                matrix.set(from, to, cost(from, to));
            }
        }
        matrix
    }

    /// Number of points the matrix covers.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, from: usize, to: usize) -> f64 {
        self.data[from * self.size + to]
    }

    pub fn set(&mut self, from: usize, to: usize, meters: f64) {
        self.data[from * self.size + to] = meters;
    }

    /// Fixed-point integer view for solvers that need integral weights.
    /// A factor of 10 gives decimeter resolution.
    pub fn scaled(&self, factor: f64) -> Vec<Vec<i32>> {
        (0..self.size)
            .map(|from| {
                (0..self.size)
                    .map(|to| (self.get(from, to) * factor).round() as i32)
                    .collect()
            })
            .collect()
    }
}

/// Computes travel costs between geographic points.
pub trait DistanceOracle {
    /// Full cost matrix over `points` in meters.
    ///
    /// Fewer than two points produce a zero matrix of matching size.
    fn matrix(&self, points: &[Point]) -> Result<DistanceMatrix, OracleError>;

    /// Total cost of visiting `points` in the given order, in meters.
    ///
    /// Fewer than two points cost zero.
    fn route_cost(&self, points: &[Point]) -> Result<f64, OracleError> {
        if points.len() < 2 {
            return Ok(0.0);
        }
        let matrix = self.matrix(points)?;
        Ok((0..points.len() - 1).map(|i| matrix.get(i, i + 1)).sum())
    }
}

impl<O: DistanceOracle + ?Sized> DistanceOracle for &O {
    fn matrix(&self, points: &[Point]) -> Result<DistanceMatrix, OracleError> {
        (**self).matrix(points)
    }

    fn route_cost(&self, points: &[Point]) -> Result<f64, OracleError> {
        (**self).route_cost(points)
    }
}

/// Offline oracle: great-circle distance over a spherical earth.
///
/// Deterministic and dependency-free, used as the fallback when no road
/// network service is reachable and as the workhorse in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreatCircle;

impl GreatCircle {
    /// Great-circle distance between two points in meters, using the
    /// arctan form that stays accurate for nearby points.
    pub fn distance_m(from: Point, to: Point) -> f64 {
        let lat1 = from.lat.to_radians();
        let lat2 = to.lat.to_radians();
        let delta_lng = (to.lng - from.lng).to_radians();

        let numerator = ((lat2.cos() * delta_lng.sin()).powi(2)
            + (lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lng.cos()).powi(2))
        .sqrt();
        let denominator = lat1.sin() * lat2.sin() + lat1.cos() * lat2.cos() * delta_lng.cos();

        EARTH_RADIUS_M * numerator.atan2(denominator)
    }
}

impl DistanceOracle for GreatCircle {
    fn matrix(&self, points: &[Point]) -> Result<DistanceMatrix, OracleError> {
        Ok(DistanceMatrix::from_fn(points.len(), |from, to| {
            if from == to {
                0.0
            } else {
                Self::distance_m(points[from], points[to])
            }
        }))
    }

    fn route_cost(&self, points: &[Point]) -> Result<f64, OracleError> {
        Ok(points
            .windows(2)
            .map(|leg| Self::distance_m(leg[0], leg[1]))
            .sum())
    }
}

/// Memoizes pairwise costs on top of any oracle.
///
/// The cache lives exactly as long as the wrapper: build one per solve or
/// evaluate call so no state leaks across runs. Not shareable across
/// threads; each worker scopes its own.
#[derive(Debug)]
pub struct CachingOracle<O> {
    inner: O,
    cache: RefCell<HashMap<(Point, Point), f64>>,
}

impl<O: DistanceOracle> CachingOracle<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Cost from `from` to `to` in meters, memoized per ordered pair.
    pub fn pair(&self, from: Point, to: Point) -> Result<f64, OracleError> {
        if let Some(&meters) = self.cache.borrow().get(&(from, to)) {
            return Ok(meters);
        }
        let meters = self.inner.matrix(&[from, to])?.get(0, 1);
        self.cache.borrow_mut().insert((from, to), meters);
        Ok(meters)
    }

    /// Number of memoized pairs.
    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.borrow().is_empty()
    }
}
