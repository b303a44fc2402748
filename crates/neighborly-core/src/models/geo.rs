//! Geographic helpers used by the staleness policy and spatial listings.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters (IUGG).
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Meters per degree of latitude, close enough for search windows.
const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }
}

/// Axis-aligned search window sent to the server for spatial filtering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Square window of `radius_m` around `center`, clamped to valid coordinates.
    pub fn around(center: GeoPoint, radius_m: f64) -> Self {
        let dlat = radius_m / METERS_PER_DEGREE_LAT;
        // Longitude degrees shrink towards the poles; avoid dividing by ~0.
        let cos_lat = center.latitude.to_radians().cos().max(0.01);
        let dlon = radius_m / (METERS_PER_DEGREE_LAT * cos_lat);

        Self {
            min_lat: (center.latitude - dlat).max(-90.0),
            max_lat: (center.latitude + dlat).min(90.0),
            min_lon: (center.longitude - dlon).max(-180.0),
            max_lon: (center.longitude + dlon).min(180.0),
        }
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.latitude)
            && (self.min_lon..=self.max_lon).contains(&point.longitude)
    }

    /// `minLon,minLat,maxLon,maxLat` with 6 decimal places.
    pub fn to_query_string(&self) -> String {
        format!(
            "{:.6},{:.6},{:.6},{:.6}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_zero_for_same_point() {
        let p = GeoPoint::new(48.137, 11.575);
        assert!(p.distance_meters(&p) < 1e-6);
    }

    #[test]
    fn test_distance_known_pair() {
        // Munich Marienplatz to Karlsplatz (Stachus), roughly 700 m apart
        let marienplatz = GeoPoint::new(48.13743, 11.57549);
        let stachus = GeoPoint::new(48.13906, 11.56587);
        let d = marienplatz.distance_meters(&stachus);
        assert!((650.0..800.0).contains(&d), "distance was {}", d);
    }

    #[test]
    fn test_bbox_contains_center_and_formats() {
        let center = GeoPoint::new(48.0, 11.0);
        let bbox = BoundingBox::around(center, 1_000.0);
        assert!(bbox.contains(&center));
        assert!(bbox.min_lat < 48.0 && bbox.max_lat > 48.0);

        let query = bbox.to_query_string();
        assert_eq!(query.split(',').count(), 4);
        assert!(query.starts_with("10.98"));
    }

    #[test]
    fn test_bbox_clamped_near_pole() {
        let bbox = BoundingBox::around(GeoPoint::new(89.99, 179.99), 50_000.0);
        assert_eq!(bbox.max_lat, 90.0);
        assert_eq!(bbox.max_lon, 180.0);
    }
}
