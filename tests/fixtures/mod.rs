//! Test fixtures for cvrp-dispatch.
//!
//! Provides realistic test data including:
//! - Real Rio de Janeiro locations (from OpenStreetMap)
//! - Builders for deliveries, instances, and multi-hub problems

pub mod rio_locations;

pub use rio_locations::*;

use cvrp_dispatch::types::{CVRPInstance, Delivery, DeliveryProblem, Point};

/// Builder for routing instances with sensible defaults.
#[derive(Debug, Clone)]
pub struct TestInstance {
    name: String,
    origin: Point,
    capacity: u32,
    deliveries: Vec<Delivery>,
}

impl TestInstance {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            origin: DEPOT.point(),
            capacity: 180,
            deliveries: Vec::new(),
        }
    }

    pub fn origin(mut self, origin: Point) -> Self {
        self.origin = origin;
        self
    }

    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn delivery(mut self, id: &str, point: Point, size: u32) -> Self {
        self.deliveries.push(Delivery {
            id: id.to_string(),
            point,
            size,
        });
        self
    }

    /// One delivery of `size` at each of `locations`, id per location name.
    pub fn deliveries_at(mut self, locations: &[Location], size: u32) -> Self {
        for location in locations {
            self.deliveries.push(Delivery {
                id: location.name.to_string(),
                point: location.point(),
                size,
            });
        }
        self
    }

    pub fn build(self) -> CVRPInstance {
        CVRPInstance {
            name: self.name,
            region: "rj".to_string(),
            origin: self.origin,
            vehicle_capacity: self.capacity,
            deliveries: self.deliveries,
        }
    }

    pub fn build_problem(self, max_hubs: usize) -> DeliveryProblem {
        DeliveryProblem {
            name: self.name,
            region: "rj".to_string(),
            max_hubs,
            vehicle_capacity: self.capacity,
            deliveries: self.deliveries,
        }
    }
}
