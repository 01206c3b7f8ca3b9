// src/matching/geospatial.rs
use log::debug;

use crate::config::EARTH_RADIUS_METERS;
use crate::models::CandidatePair;

/// Great-circle distance in meters between two WGS84 points.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let (delta_phi, delta_lambda) = ((lat2 - lat1).to_radians(), (lon2 - lon1).to_radians());
    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` a hair above 1 for antipodal points.
    2.0 * EARTH_RADIUS_METERS * a.clamp(0.0, 1.0).sqrt().asin()
}

/// Distance between the two detections of a candidate pair.
pub fn pair_distance(pair: &CandidatePair) -> f64 {
    haversine_distance(pair.record1.lat, pair.record1.lon, pair.record2.lat, pair.record2.lon)
}

/// Keeps pairs whose detections are at most `max_distance_m` meters apart.
pub fn filter_by_distance(pairs: Vec<CandidatePair>, max_distance_m: f64) -> Vec<CandidatePair> {
    let before = pairs.len();
    let kept: Vec<CandidatePair> = pairs
        .into_iter()
        .filter(|pair| pair_distance(pair) <= max_distance_m)
        .collect();
    debug!(
        "Geospatial filter: {} -> {} pairs (max distance {}m)",
        before,
        kept.len(),
        max_distance_m
    );
    kept
}
