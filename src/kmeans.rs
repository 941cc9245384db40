//! Seeded k-means clustering.
//!
//! The decomposition engines and the pretrained dispatch models need
//! cluster assignments that replay exactly for a given seed and input
//! order. Centroids initialize from a seeded `SmallRng` draw, Lloyd
//! iterations break ties by lowest index, and prediction uses the same
//! nearest-centroid rule the fit converged under.

use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::error::ConfigError;
use crate::types::Point;

/// Fits a region partition over raw coordinates.
///
/// Implementations must be deterministic for a given seed so batch runs
/// replay. The fitted artifact is centroid-based: assignment is always
/// nearest centroid.
pub trait Clusterer {
    fn fit(&self, points: &[Point], clusters: usize, seed: u64) -> Result<Clustering, ConfigError>;
}

/// A fitted partition: centroids plus the nearest-centroid assignment rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    centroids: Vec<Point>,
}

impl Clustering {
    pub fn centroids(&self) -> &[Point] {
        &self.centroids
    }

    /// Number of clusters.
    pub fn len(&self) -> usize {
        self.centroids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    /// Cluster serving `point`: nearest centroid, ties to the lowest index.
    pub fn predict(&self, point: Point) -> usize {
        nearest(&self.centroids, point)
    }
}

/// Lloyd's algorithm over raw lng/lat coordinates.
#[derive(Debug, Clone)]
pub struct KMeans {
    pub max_iter: usize,
}

impl Default for KMeans {
    fn default() -> Self {
        Self { max_iter: 100 }
    }
}

impl Clusterer for KMeans {
    fn fit(&self, points: &[Point], clusters: usize, seed: u64) -> Result<Clustering, ConfigError> {
        if clusters == 0 {
            return Err(ConfigError::ZeroClusters);
        }
        if points.is_empty() {
            return Err(ConfigError::EmptyTrainingSet);
        }
        if clusters > points.len() {
            return Err(ConfigError::TooManyClusters {
                clusters,
                points: points.len(),
            });
        }

        let mut rng = SmallRng::seed_from_u64(seed);
        let mut centroids: Vec<Point> = rand::seq::index::sample(&mut rng, points.len(), clusters)
            .into_vec()
            .into_iter()
            .map(|i| points[i])
            .collect();
        let mut labels = vec![0usize; points.len()];

        for iteration in 0..self.max_iter {
            let mut changed = false;
            for (label, point) in labels.iter_mut().zip(points) {
                let assigned = nearest(&centroids, *point);
                if *label != assigned {
                    *label = assigned;
                    changed = true;
                }
            }
            // Initial labels are all zero; only trust stability after the
            // centroids moved once.
            if iteration > 0 && !changed {
                break;
            }

            let mut sums = vec![(0.0f64, 0.0f64, 0usize); clusters];
            for (label, point) in labels.iter().zip(points) {
                let slot = &mut sums[*label];
                slot.0 += point.lng;
                slot.1 += point.lat;
                slot.2 += 1;
            }
            for (cluster, (lng_sum, lat_sum, count)) in sums.into_iter().enumerate() {
                if count == 0 {
                    // Re-seed a starved cluster at the point farthest from
                    // its current assignment.
                    centroids[cluster] = farthest_point(points, &labels, &centroids);
                } else {
                    centroids[cluster] =
                        Point::new(lng_sum / count as f64, lat_sum / count as f64);
                }
            }
        }

        Ok(Clustering { centroids })
    }
}

/// Cluster count from explicit or size-derived configuration: `fixed`
/// wins, otherwise ceil(points / target), capped by the point count.
pub fn cluster_count(points: usize, fixed: Option<usize>, target_size: Option<usize>) -> usize {
    let derived = fixed.unwrap_or_else(|| {
        let target = target_size.unwrap_or(points).max(1);
        points.div_ceil(target)
    });
    derived.clamp(1, points.max(1))
}

fn nearest(centroids: &[Point], point: Point) -> usize {
    let mut best = 0;
    let mut best_cost = f64::INFINITY;
    for (index, centroid) in centroids.iter().enumerate() {
        let cost = squared(*centroid, point);
        if cost < best_cost {
            best = index;
            best_cost = cost;
        }
    }
    best
}

fn farthest_point(points: &[Point], labels: &[usize], centroids: &[Point]) -> Point {
    let mut best = points[0];
    let mut best_cost = -1.0;
    for (point, label) in points.iter().zip(labels) {
        let cost = squared(*point, centroids[*label]);
        if cost > best_cost {
            best = *point;
            best_cost = cost;
        }
    }
    best
}

fn squared(a: Point, b: Point) -> f64 {
    let dx = a.lng - b.lng;
    let dy = a.lat - b.lat;
    dx * dx + dy * dy
}
