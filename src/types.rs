//! Core data model for delivery dispatch.
//!
//! Instances and solutions mirror the persisted JSON layout one-to-one:
//! one object per `.json` file, stable field names, no derived fields.

use std::collections::HashSet;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, StorageError};

/// Geographic coordinate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Point {
    /// Longitude (x axis).
    pub lng: f64,
    /// Latitude (y axis).
    pub lat: f64,
}

impl Point {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

// Compared and hashed by coordinate bit patterns so points can key
// memoization tables.
impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        self.lng.to_bits() == other.lng.to_bits() && self.lat.to_bits() == other.lat.to_bits()
    }
}

impl Eq for Point {}

impl Hash for Point {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.lng.to_bits().hash(state);
        self.lat.to_bits().hash(state);
    }
}

/// A single delivery request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Delivery {
    /// Unique id within an instance.
    pub id: String,
    /// Delivery location.
    pub point: Point,
    /// Capacity units the delivery occupies in a vehicle.
    pub size: u32,
}

/// A multi-hub delivery problem: hub locations are still to be chosen.
///
/// Split into single-depot [`CVRPInstance`]s by the facility allocator
/// before routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryProblem {
    pub name: String,
    pub region: String,
    /// Upper bound on the number of hubs to open.
    pub max_hubs: usize,
    pub vehicle_capacity: u32,
    pub deliveries: Vec<Delivery>,
}

impl DeliveryProblem {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        read_json(path.as_ref())
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        write_json(self, path.as_ref())
    }

    /// Checks the fatal input invariants before any hub selection.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_hubs == 0 {
            return Err(ConfigError::NoHubsRequested);
        }
        validate_deliveries(&self.deliveries, self.vehicle_capacity)
    }
}

/// A single-depot routing instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CVRPInstance {
    pub name: String,
    pub region: String,
    /// Depot every vehicle leaves from and returns to.
    pub origin: Point,
    pub vehicle_capacity: u32,
    pub deliveries: Vec<Delivery>,
}

impl CVRPInstance {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        read_json(path.as_ref())
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        write_json(self, path.as_ref())
    }

    /// Checks the fatal input invariants: positive capacity, unique
    /// delivery ids, and no delivery larger than a vehicle.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_deliveries(&self.deliveries, self.vehicle_capacity)
    }
}

fn validate_deliveries(deliveries: &[Delivery], capacity: u32) -> Result<(), ConfigError> {
    if capacity == 0 {
        return Err(ConfigError::ZeroCapacity);
    }
    let mut seen = HashSet::with_capacity(deliveries.len());
    for delivery in deliveries {
        if !seen.insert(delivery.id.as_str()) {
            return Err(ConfigError::DuplicateDeliveryId(delivery.id.clone()));
        }
        if delivery.size > capacity {
            return Err(ConfigError::OversizedDelivery {
                id: delivery.id.clone(),
                size: delivery.size,
                capacity,
            });
        }
    }
    Ok(())
}

/// One vehicle's route: deliveries in visiting order, depot at both ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CVRPSolutionVehicle {
    pub origin: Point,
    /// Deliveries in visiting order, excluding the depot.
    pub deliveries: Vec<Delivery>,
}

impl CVRPSolutionVehicle {
    pub fn new(origin: Point) -> Self {
        Self {
            origin,
            deliveries: Vec::new(),
        }
    }

    /// Full circuit: origin, every stop in order, origin again.
    pub fn circuit(&self) -> Vec<Point> {
        let mut points = Vec::with_capacity(self.deliveries.len() + 2);
        points.push(self.origin);
        points.extend(self.deliveries.iter().map(|d| d.point));
        points.push(self.origin);
        points
    }

    /// Total capacity units on board.
    pub fn occupation(&self) -> u32 {
        self.deliveries.iter().map(|d| d.size).sum()
    }
}

/// A complete solution: one route per dispatched vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CVRPSolution {
    pub name: String,
    pub vehicles: Vec<CVRPSolutionVehicle>,
}

impl CVRPSolution {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        read_json(path.as_ref())
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        write_json(self, path.as_ref())
    }

    /// All deliveries across vehicles, in vehicle order.
    pub fn deliveries(&self) -> impl Iterator<Item = &Delivery> {
        self.vehicles.iter().flat_map(|v| v.deliveries.iter())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), StorageError> {
    let file = File::create(path)?;
    Ok(serde_json::to_writer(BufWriter::new(file), value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    fn delivery(id: &str, lng: f64, lat: f64, size: u32) -> Delivery {
        Delivery {
            id: id.to_string(),
            point: Point::new(lng, lat),
            size,
        }
    }

    #[test]
    fn test_circuit_wraps_origin_around_stops() {
        let origin = Point::new(-43.0, -22.0);
        let vehicle = CVRPSolutionVehicle {
            origin,
            deliveries: vec![delivery("a", -43.1, -22.1, 2), delivery("b", -43.2, -22.2, 3)],
        };

        let circuit = vehicle.circuit();
        assert_eq!(circuit.len(), 4);
        assert_eq!(circuit[0], origin);
        assert_eq!(circuit[3], origin);
        assert_eq!(circuit[1], Point::new(-43.1, -22.1));
    }

    #[test]
    fn test_occupation_sums_sizes() {
        let vehicle = CVRPSolutionVehicle {
            origin: Point::new(0.0, 0.0),
            deliveries: vec![delivery("a", 0.0, 0.0, 4), delivery("b", 0.0, 0.0, 6)],
        };
        assert_eq!(vehicle.occupation(), 10);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let instance = CVRPInstance {
            name: "i".to_string(),
            region: "r".to_string(),
            origin: Point::new(0.0, 0.0),
            vehicle_capacity: 0,
            deliveries: vec![],
        };
        assert_eq!(instance.validate(), Err(ConfigError::ZeroCapacity));
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let instance = CVRPInstance {
            name: "i".to_string(),
            region: "r".to_string(),
            origin: Point::new(0.0, 0.0),
            vehicle_capacity: 10,
            deliveries: vec![delivery("a", 0.0, 0.0, 1), delivery("a", 1.0, 1.0, 2)],
        };
        assert_eq!(
            instance.validate(),
            Err(ConfigError::DuplicateDeliveryId("a".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_oversized_delivery() {
        let instance = CVRPInstance {
            name: "i".to_string(),
            region: "r".to_string(),
            origin: Point::new(0.0, 0.0),
            vehicle_capacity: 10,
            deliveries: vec![delivery("big", 0.0, 0.0, 11)],
        };
        assert!(matches!(
            instance.validate(),
            Err(ConfigError::OversizedDelivery { size: 11, capacity: 10, .. })
        ));
    }

    #[test]
    fn test_problem_validate_rejects_zero_hubs() {
        let problem = DeliveryProblem {
            name: "p".to_string(),
            region: "r".to_string(),
            max_hubs: 0,
            vehicle_capacity: 10,
            deliveries: vec![],
        };
        assert_eq!(problem.validate(), Err(ConfigError::NoHubsRequested));
    }

    #[test]
    fn test_instance_json_round_trip() {
        let instance = CVRPInstance {
            name: "rj-0".to_string(),
            region: "rj".to_string(),
            origin: Point::new(-43.374, -22.79),
            vehicle_capacity: 180,
            deliveries: vec![delivery("d0", -43.44811, -23.00169, 9)],
        };

        let json = serde_json::to_string(&instance).unwrap();
        let parsed: CVRPInstance = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, instance);
    }

    #[test]
    fn test_instance_file_round_trip() {
        let instance = CVRPInstance {
            name: "rj-1".to_string(),
            region: "rj".to_string(),
            origin: Point::new(-43.374, -22.79),
            vehicle_capacity: 120,
            deliveries: vec![delivery("d0", -43.1, -22.9, 5)],
        };

        let path = std::env::temp_dir().join("cvrp-dispatch-types-round-trip.json");
        instance.to_file(&path).unwrap();
        let loaded = CVRPInstance::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, instance);
    }

    #[test]
    fn test_point_equality_is_bitwise() {
        assert_eq!(Point::new(1.5, -2.5), Point::new(1.5, -2.5));
        assert_ne!(Point::new(0.0, 0.1), Point::new(0.0, 0.2));
    }
}
