//! Geographic helpers: great-circle distance and coordinate validation.

/// Mean Earth radius in kilometers, used for Haversine distance.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometers between two WGS84 coordinates.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Check that a latitude/longitude pair is finite and within WGS84 range.
pub fn is_valid_coordinate(lat: f64, lng: f64) -> bool {
    lat.is_finite() && lng.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_zero_distance() {
        assert!(haversine_km(51.5074, -0.1278, 51.5074, -0.1278).abs() < 1e-9);
    }

    #[test]
    fn test_haversine_known_distance() {
        // London -> Paris is roughly 344 km
        let d = haversine_km(51.5074, -0.1278, 48.8566, 2.3522);
        assert!((d - 344.0).abs() < 5.0, "got {}", d);
    }

    #[test]
    fn test_haversine_short_hop() {
        // ~0.001 deg latitude is ~111 m
        let d = haversine_km(51.5074, -0.1278, 51.5084, -0.1278);
        assert!((d - 0.111).abs() < 0.005, "got {}", d);
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(is_valid_coordinate(51.5074, -0.1278));
        assert!(!is_valid_coordinate(91.0, 0.0));
        assert!(!is_valid_coordinate(0.0, 181.0));
        assert!(!is_valid_coordinate(f64::NAN, 0.0));
    }
}
