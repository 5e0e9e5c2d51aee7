use crate::models::{BoundingBox, Profile};

/// Earth's radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Calculate the Haversine distance between two points in kilometers
///
/// # Arguments
/// * `lat1` - Latitude of first point in degrees
/// * `lon1` - Longitude of first point in degrees
/// * `lat2` - Latitude of second point in degrees
/// * `lon2` - Longitude of second point in degrees
#[inline]
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Distance between two profiles, or `None` when either has no location set
#[inline]
pub fn profile_distance(a: &Profile, b: &Profile) -> Option<f64> {
    let (lat1, lon1) = a.coordinates()?;
    let (lat2, lon2) = b.coordinates()?;
    Some(haversine_distance(lat1, lon1, lat2, lon2))
}

/// Calculate a bounding box around a center point
///
/// Only used to narrow storage queries; the filter pipeline always decides
/// with the exact great-circle distance. The box is padded so it never cuts
/// off a point that is within `radius_km`. Longitudes wrap at ±180°, so a
/// box around a point near the antimeridian comes back with
/// `min_lon > max_lon`; see [`BoundingBox::longitude_ranges`].
pub fn calculate_bounding_box(lat: f64, lon: f64, radius_km: f64) -> BoundingBox {
    // 1 degree latitude is approximately 111 km
    let lat_delta = radius_km / 111.0 * 1.01;

    // 1 degree longitude shrinks with latitude; near the poles take every longitude
    let cos_lat = lat.to_radians().cos().abs();
    let lon_delta = if cos_lat < 1e-6 {
        180.0
    } else {
        (radius_km / (111.0 * cos_lat) * 1.01).min(180.0)
    };

    let (min_lon, max_lon) = if lon_delta >= 180.0 {
        (-180.0, 180.0)
    } else {
        (wrap_longitude(lon - lon_delta), wrap_longitude(lon + lon_delta))
    };

    BoundingBox {
        min_lat: (lat - lat_delta).max(-90.0),
        max_lat: (lat + lat_delta).min(90.0),
        min_lon,
        max_lon,
    }
}

/// Bring a longitude back into `[-180, 180]`
fn wrap_longitude(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else if lon < -180.0 {
        lon + 360.0
    } else {
        lon
    }
}

/// Check if a point is within a bounding box
#[inline]
pub fn is_within_bounding_box(lat: f64, lon: f64, bbox: &BoundingBox) -> bool {
    lat >= bbox.min_lat && lat <= bbox.max_lat && bbox.contains_longitude(lon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_distance() {
        // Distance from London to Paris (approximately 344 km)
        let distance = haversine_distance(51.5074, -0.1278, 48.8566, 2.3522);
        assert!((distance - 344.0).abs() < 10.0, "Distance should be ~344km, got {}", distance);
    }

    #[test]
    fn test_haversine_is_symmetric() {
        let ab = haversine_distance(40.7128, -74.0060, 34.0522, -118.2437);
        let ba = haversine_distance(34.0522, -118.2437, 40.7128, -74.0060);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn test_bounding_box() {
        let bbox = calculate_bounding_box(40.7128, -74.0060, 10.0);

        assert!(bbox.min_lat < 40.7128);
        assert!(bbox.max_lat > 40.7128);
        assert!(bbox.min_lon < -74.0060);
        assert!(bbox.max_lon > -74.0060);

        // 20km / 111km per degree = ~0.18 degrees
        let lat_span = bbox.max_lat - bbox.min_lat;
        assert!((lat_span - 0.18).abs() < 0.02, "Lat span should be ~0.18 degrees");
    }

    #[test]
    fn test_bounding_box_contains_point_at_radius() {
        // One degree north is ~111.19km, just past the 111km approximation
        let radius = haversine_distance(10.0, 20.0, 11.0, 20.0);
        let bbox = calculate_bounding_box(10.0, 20.0, radius);
        assert!(is_within_bounding_box(11.0, 20.0, &bbox));
    }

    #[test]
    fn test_bounding_box_wraps_at_antimeridian() {
        // Fiji sits on both sides of 180°
        let bbox = calculate_bounding_box(-17.0, 179.9, 50.0);
        assert!(bbox.crosses_antimeridian());
        assert!(bbox.min_lon > 179.0 && bbox.max_lon < -179.0);
        assert_eq!(bbox.longitude_ranges().len(), 2);

        let across = haversine_distance(-17.0, 179.9, -17.0, -179.9);
        assert!(across < 50.0);
        assert!(is_within_bounding_box(-17.0, -179.9, &bbox));
        assert!(is_within_bounding_box(-17.0, 179.95, &bbox));
        assert!(!is_within_bounding_box(-17.0, 170.0, &bbox));

        let west = calculate_bounding_box(10.0, -179.95, 20.0);
        assert!(west.crosses_antimeridian());
        assert!(is_within_bounding_box(10.0, 179.99, &west));
    }

    #[test]
    fn test_polar_bounding_box_covers_every_longitude() {
        let bbox = calculate_bounding_box(90.0, 0.0, 10.0);
        assert!(!bbox.crosses_antimeridian());
        assert_eq!(bbox.longitude_ranges(), vec![(-180.0, 180.0)]);
    }

    #[test]
    fn test_point_within_bbox() {
        let bbox = calculate_bounding_box(40.7128, -74.0060, 10.0);

        assert!(is_within_bounding_box(40.7128, -74.0060, &bbox));
        assert!(is_within_bounding_box(40.71, -74.0, &bbox));
        assert!(!is_within_bounding_box(50.0, -80.0, &bbox));
    }
}
