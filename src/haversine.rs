//! Great-circle distances.
//!
//! Straight-line distance ignores the road network, so it underestimates real
//! driving distance, but it is always available and symmetric.

use crate::model::Coordinate;
use crate::traits::DistanceMatrixProvider;

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Calculate haversine distance between two points in kilometers.
pub fn haversine_km(from: Coordinate, to: Coordinate) -> f64 {
    let lat1_rad = from.latitude.to_radians();
    let lat2_rad = to.latitude.to_radians();
    let delta_lat = (to.latitude - from.latitude).to_radians();
    let delta_lng = (to.longitude - from.longitude).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * c
}

/// Haversine-based distance matrix provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct HaversineMatrix;

impl DistanceMatrixProvider for HaversineMatrix {
    fn distance_matrix(&self, locations: &[Coordinate]) -> Vec<Vec<f64>> {
        let n = locations.len();
        let mut matrix = vec![vec![0.0; n]; n];

        // Fill the upper triangle and mirror it so the matrix is exactly symmetric.
        for i in 0..n {
            for j in (i + 1)..n {
                let km = haversine_km(locations[i], locations[j]);
                matrix[i][j] = km;
                matrix[j][i] = km;
            }
        }

        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_same_point() {
        let point = Coordinate::new(25.2854, 51.5310);
        let dist = haversine_km(point, point);
        assert!(dist < 0.001, "Same point should have ~0 distance");
    }

    #[test]
    fn test_haversine_known_distance() {
        // Doha (25.29, 51.53) to Dubai (25.20, 55.27)
        // Actual distance ~377 km
        let dist = haversine_km(Coordinate::new(25.2854, 51.5310), Coordinate::new(25.2048, 55.2708));
        assert!(dist > 360.0 && dist < 395.0, "Doha to Dubai should be ~377km, got {}", dist);
    }

    #[test]
    fn test_matrix_diagonal_is_zero() {
        let locations = vec![
            Coordinate::new(25.28, 51.53),
            Coordinate::new(25.30, 51.53),
            Coordinate::new(25.29, 51.52),
        ];
        let matrix = HaversineMatrix.distance_matrix(&locations);

        for i in 0..locations.len() {
            assert_eq!(matrix[i][i], 0.0, "Diagonal should be zero");
        }
    }

    #[test]
    fn test_matrix_symmetric() {
        let locations = vec![Coordinate::new(25.28, 51.53), Coordinate::new(25.30, 51.55)];
        let matrix = HaversineMatrix.distance_matrix(&locations);

        assert_eq!(matrix[0][1], matrix[1][0], "Matrix should be symmetric");
        assert!(matrix[0][1] > 0.0);
    }

    #[test]
    fn test_empty_locations() {
        assert!(HaversineMatrix.distance_matrix(&[]).is_empty());
    }
}
