//! Distance and projection helpers.
//!
//! Graph processing and crash clustering need metric distances; a local
//! equirectangular projection centred on the working area is accurate to
//! well under a percent across a metropolitan extent.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used for every great-circle distance in the crate.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine great-circle distance in metres.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi * 0.5).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda * 0.5).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// Summed haversine length of a `(lon, lat)` polyline.
pub fn polyline_length_m(coords: &[(f64, f64)]) -> f64 {
    coords
        .windows(2)
        .map(|w| haversine_m(w[0].1, w[0].0, w[1].1, w[1].0))
        .sum()
}

/// Equirectangular projection around `(origin_lon, origin_lat)`; `x`/`y`
/// are metres east/north of the origin.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct LocalMetric {
    pub origin_lon: f64,
    pub origin_lat: f64,
}

impl LocalMetric {
    pub fn new(origin_lon: f64, origin_lat: f64) -> Self {
        Self { origin_lon, origin_lat }
    }

    /// Centred on the mean of the given `(lon, lat)` points.
    pub fn centered_on<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let (mut sum_lon, mut sum_lat, mut n) = (0.0, 0.0, 0usize);
        for (lon, lat) in points {
            sum_lon += lon;
            sum_lat += lat;
            n += 1;
        }
        (n > 0).then(|| Self::new(sum_lon / n as f64, sum_lat / n as f64))
    }

    #[inline]
    fn lon_scale(&self) -> f64 {
        EARTH_RADIUS_M * self.origin_lat.to_radians().cos()
    }

    #[inline]
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let x = (lon - self.origin_lon).to_radians() * self.lon_scale();
        let y = (lat - self.origin_lat).to_radians() * EARTH_RADIUS_M;
        (x, y)
    }

    #[inline]
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let lon = self.origin_lon + (x / self.lon_scale()).to_degrees();
        let lat = self.origin_lat + (y / EARTH_RADIUS_M).to_degrees();
        (lon, lat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_one_degree_of_latitude() {
        let d = haversine_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_194.93).abs() < 0.1, "got {d}");
        assert_eq!(haversine_m(40.7, -74.0, 40.7, -74.0), 0.0);
    }

    #[test]
    fn polyline_sums_segments() {
        let coords = [(0.0, 0.0), (0.0, 1.0), (0.0, 2.0)];
        let total = polyline_length_m(&coords);
        assert!((total - 2.0 * haversine_m(0.0, 0.0, 1.0, 0.0)).abs() < 1e-6);
        assert_eq!(polyline_length_m(&coords[..1]), 0.0);
    }

    #[test]
    fn projection_roundtrip_and_scale() {
        let proj = LocalMetric::new(-73.95, 40.75);
        let (x, y) = proj.forward(-73.94, 40.76);
        let (lon, lat) = proj.inverse(x, y);
        assert!((lon + 73.94).abs() < 1e-9);
        assert!((lat - 40.76).abs() < 1e-9);

        // Planar distance agrees with haversine at city scale.
        let planar = (x * x + y * y).sqrt();
        let sphere = haversine_m(40.75, -73.95, 40.76, -73.94);
        assert!((planar - sphere).abs() / sphere < 1e-3);
    }

    #[test]
    fn centred_on_mean() {
        let proj = LocalMetric::centered_on([(0.0, 10.0), (2.0, 12.0)]).unwrap();
        assert_eq!(proj, LocalMetric::new(1.0, 11.0));
        assert!(LocalMetric::centered_on(Vec::new()).is_none());
    }
}
