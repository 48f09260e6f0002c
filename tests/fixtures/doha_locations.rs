//! Real Doha locations for realistic test fixtures.
//!
//! Coordinates sourced from OpenStreetMap. Distances between them are a few
//! kilometres, typical of one collection shift.

use route_optimizer::NodeRecord;

/// A named location with coordinates.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(name: &'static str, lat: f64, lng: f64) -> Self {
        Self { name, lat, lng }
    }

    pub fn coords(&self) -> (f64, f64) {
        (self.lat, self.lng)
    }

    /// Bin record at this location.
    pub fn record(&self, id: &str) -> NodeRecord {
        NodeRecord::new(id, self.lat, self.lng)
    }
}

// ============================================================================
// Depots (route origins)
// ============================================================================

pub const DEPOT: Location = Location::new("Municipal Depot Al Sadd", 25.2854, 51.5310);

pub const DEPOTS: &[Location] = &[
    DEPOT,
    Location::new("Industrial Area Depot", 25.1953, 51.4340),
];

// ============================================================================
// Collection points
// ============================================================================

/// The three-stop scenario around the Al Sadd depot.
pub const SMALL_ROUTE: &[Location] = &[
    Location::new("Bin Al Sadd North", 25.30, 51.53),
    Location::new("Bin Bin Mahmoud", 25.28, 51.55),
    Location::new("Bin Al Sadd West", 25.29, 51.52),
];

pub const NEIGHBOURHOOD_BINS: &[Location] = &[
    Location::new("Souq Waqif", 25.2867, 51.5333),
    Location::new("Museum of Islamic Art", 25.2950, 51.5392),
    Location::new("Corniche Park", 25.3036, 51.5234),
    Location::new("Katara Cultural Village", 25.3600, 51.5260),
    Location::new("West Bay Towers", 25.3226, 51.5310),
    Location::new("City Center Doha", 25.3265, 51.5303),
    Location::new("Hamad Medical City", 25.2920, 51.5030),
    Location::new("Villaggio Mall", 25.2600, 51.4420),
    Location::new("Education City", 25.3150, 51.4390),
    Location::new("Doha Festival City", 25.3880, 51.4450),
    Location::new("Al Wakrah Souq", 25.1670, 51.6030),
    Location::new("Hamad Airport Cargo", 25.2610, 51.6130),
];

// ============================================================================
// Helpers
// ============================================================================

/// Records for the first `count` neighbourhood bins, with varied fill levels.
pub fn neighbourhood_records(count: usize) -> Vec<NodeRecord> {
    NEIGHBOURHOOD_BINS
        .iter()
        .take(count)
        .enumerate()
        .map(|(i, location)| {
            location
                .record(&format!("bin-{}", i))
                .with_fill_level(20.0 + 7.0 * i as f64)
                .with_priority(1 + (i % 3) as u8)
        })
        .collect()
}

pub fn small_route_records() -> Vec<NodeRecord> {
    SMALL_ROUTE
        .iter()
        .enumerate()
        .map(|(i, location)| location.record(&format!("stop-{}", i)))
        .collect()
}

pub fn depot_record() -> NodeRecord {
    DEPOT.record("depot")
}
