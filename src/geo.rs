//! Great-circle distance on WGS84 coordinates

use linfa_nn::distance::Distance;
use ndarray::{ArrayView, Dimension};

pub const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Haversine distance in kilometres between two `(lat, lng)` pairs in degrees
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * c
}

/// Haversine metric for `linfa-nn`, operating on rows laid out as `[lat, lng]`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Haversine;

impl Distance<f64> for Haversine {
    fn distance<D: Dimension>(&self, a: ArrayView<f64, D>, b: ArrayView<f64, D>) -> f64 {
        let mut a = a.iter();
        let mut b = b.iter();
        match (a.next(), a.next(), b.next(), b.next()) {
            (Some(&lat1), Some(&lng1), Some(&lat2), Some(&lng2)) => {
                haversine_km(lat1, lng1, lat2, lng2)
            }
            _ => f64::NAN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_haversine_zero_for_same_point() {
        assert_eq!(haversine_km(39.98, 116.31, 39.98, 116.31), 0.0);
    }

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude is ~111.19 km on a 6371 km sphere
        let d = haversine_km(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111.19).abs() < 0.01, "got {}", d);
    }

    #[test]
    fn test_metric_matches_function() {
        let a = arr1(&[39.9042, 116.4074]);
        let b = arr1(&[39.9163, 116.3972]);
        let expected = haversine_km(39.9042, 116.4074, 39.9163, 116.3972);

        assert!((Haversine.distance(a.view(), b.view()) - expected).abs() < 1e-12);
        assert!((Haversine.distance(b.view(), a.view()) - expected).abs() < 1e-12);
    }
}
