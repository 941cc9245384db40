//! Real Rio de Janeiro locations for realistic test fixtures.
//!
//! Coordinates sourced from OpenStreetMap. These are real, routable
//! locations spread across distinct neighborhoods so clustering tests
//! have genuine spatial structure to find.

use cvrp_dispatch::types::Point;

/// A named location with coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Location {
    pub name: &'static str,
    pub lng: f64,
    pub lat: f64,
}

impl Location {
    pub const fn new(name: &'static str, lng: f64, lat: f64) -> Self {
        Self { name, lng, lat }
    }

    pub fn point(&self) -> Point {
        Point::new(self.lng, self.lat)
    }
}

/// Logistics warehouse near Pavuna, the usual depot for rj instances.
pub const DEPOT: Location = Location::new("Pavuna depot", -43.3742, -22.7904);

// ============================================================================
// Zona Sul (beach neighborhoods, dense and close together)
// ============================================================================

pub const ZONA_SUL: &[Location] = &[
    Location::new("Copacabana Palace", -43.1786, -22.9668),
    Location::new("Posto 9 Ipanema", -43.2028, -22.9869),
    Location::new("Leblon Shopping", -43.2249, -22.9838),
    Location::new("Jardim Botanico", -43.2256, -22.9674),
    Location::new("Largo do Machado", -43.1794, -22.9310),
    Location::new("Praia de Botafogo", -43.1809, -22.9460),
];

// ============================================================================
// Zona Norte (inland, near the depot)
// ============================================================================

pub const ZONA_NORTE: &[Location] = &[
    Location::new("Norte Shopping", -43.2887, -22.8873),
    Location::new("Maracana", -43.2302, -22.9121),
    Location::new("Madureira Park", -43.3366, -22.8716),
    Location::new("Ilha do Governador", -43.1985, -22.8100),
    Location::new("Penha Basilica", -43.2768, -22.8422),
];

// ============================================================================
// Zona Oeste (far sprawl, a long drive from everything else)
// ============================================================================

pub const ZONA_OESTE: &[Location] = &[
    Location::new("Barra Shopping", -43.3587, -23.0008),
    Location::new("Recreio Beach", -43.4644, -23.0253),
    Location::new("Campo Grande Center", -43.5622, -22.9035),
    Location::new("Santa Cruz Station", -43.6856, -22.9154),
];

/// All delivery locations, every zone concatenated.
pub fn all_locations() -> Vec<Location> {
    let mut locations = Vec::new();
    locations.extend_from_slice(ZONA_SUL);
    locations.extend_from_slice(ZONA_NORTE);
    locations.extend_from_slice(ZONA_OESTE);
    locations
}
