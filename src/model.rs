//! Stay-location clustering with DBSCAN and origin/destination trip derivation

use crate::data::LocationPing;
use crate::error::ServiceError;
use crate::geo::{haversine_km, Haversine};
use chrono::{Datelike, NaiveDateTime, Timelike};
use linfa::traits::Transformer;
use linfa::ParamGuard;
use linfa_clustering::Dbscan;
use linfa_nn::CommonNearestNeighbour;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Upper bound on pings used for the silhouette score
const SILHOUETTE_SAMPLE_SIZE: usize = 1000;

/// linfa's DBSCAN rejects `min_points < 2`
const LIBRARY_MIN_POINTS: usize = 2;

/// A stay location: a group of pings the user dwelled around
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StayCluster {
    pub label: usize,
    /// Mean latitude of member pings
    pub lat: f64,
    /// Mean longitude of member pings
    pub lng: f64,
    pub size: usize,
}

/// One move between two consecutive stay locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    pub uid: String,
    pub cluster_origin: usize,
    pub lat_origin: f64,
    pub lng_origin: f64,
    pub cluster_dest: usize,
    pub cluster_dest_lat: f64,
    pub cluster_dest_lng: f64,
    /// Last ping at the origin
    pub departure: NaiveDateTime,
    /// First ping at the destination
    pub arrival: NaiveDateTime,
    /// Seconds between departure and arrival
    pub timedelta: f64,
    pub month: u32,
    pub day: u32,
    /// 0 = Monday
    pub day_of_week: u32,
    pub hour_in_day: u32,
    pub minute_in_hour: u32,
}

/// Quality metrics for one clustering run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterScores {
    /// Mean silhouette coefficient (haversine), in [-1, 1]
    pub silhouette: f64,
    /// Davies-Bouldin index, lower is better
    pub davies_bouldin: f64,
    /// Sum of squared km distances from pings to their centroid
    pub inertia: f64,
    pub n_clusters: usize,
    pub n_noise: usize,
    pub n_trips: usize,
}

/// Everything a clustering request produces
#[derive(Debug, Clone)]
pub struct ClusteringOutcome {
    pub clusters: Vec<StayCluster>,
    /// Cluster label of each input ping; `None` for noise
    pub labels: Vec<Option<usize>>,
    pub trips: Vec<TripRecord>,
    pub scores: ClusterScores,
}

impl ClusteringOutcome {
    /// Indices of the pings assigned to `label`
    pub fn members(&self, label: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == Some(label))
            .map(|(i, _)| i)
            .collect()
    }
}

/// A contiguous run of pings inside one cluster
#[derive(Debug, Clone, Copy)]
struct Visit {
    cluster: usize,
    arrival: NaiveDateTime,
    departure: NaiveDateTime,
}

/// Cluster one user's pings into stay locations and derive trip records
///
/// # Arguments
/// * `uid` - User the pings belong to
/// * `pings` - The user's pings, ordered by timestamp
/// * `distance_km` - Neighbourhood radius in kilometres
/// * `min_k` - Minimum number of pings that make a stay location
///
/// # Returns
/// * `ClusteringOutcome` with clusters, per-ping labels, trips and scores
pub fn cluster_user(
    uid: &str,
    pings: &[LocationPing],
    distance_km: f64,
    min_k: usize,
) -> Result<ClusteringOutcome, ServiceError> {
    validate_parameters(distance_km, min_k)?;

    let labels = assign_labels(pings, distance_km, min_k)?;

    let n_clusters = labels.iter().flatten().max().map_or(0, |&max| max + 1);
    if n_clusters < 2 {
        return Err(ServiceError::Inference(format!(
            "degenerate clustering for user {}: found {} cluster(s), at least 2 are required",
            uid, n_clusters
        )));
    }

    let clusters = compute_centroids(pings, &labels, n_clusters);
    let trips = derive_trips(uid, pings, &labels, &clusters);

    let scores = ClusterScores {
        silhouette: silhouette_score(pings, &labels, n_clusters),
        davies_bouldin: davies_bouldin_index(pings, &labels, &clusters),
        inertia: compute_inertia(pings, &labels, &clusters),
        n_clusters,
        n_noise: labels.iter().filter(|l| l.is_none()).count(),
        n_trips: trips.len(),
    };

    tracing::debug!(
        uid,
        n_pings = pings.len(),
        n_clusters,
        n_trips = scores.n_trips,
        "clustered location history"
    );

    Ok(ClusteringOutcome {
        clusters,
        labels,
        trips,
        scores,
    })
}

/// Reject a non-positive radius or a zero minimum cluster size
pub fn validate_parameters(distance_km: f64, min_k: usize) -> Result<(), ServiceError> {
    if !distance_km.is_finite() || distance_km <= 0.0 {
        return Err(ServiceError::Validation(format!(
            "distance must be a positive number of kilometres, got {}",
            distance_km
        )));
    }
    if min_k == 0 {
        return Err(ServiceError::Validation(
            "min_k must be a positive integer".to_string(),
        ));
    }
    Ok(())
}

/// Run DBSCAN and, for `min_k == 1`, keep isolated pings as singleton clusters
fn assign_labels(
    pings: &[LocationPing],
    distance_km: f64,
    min_k: usize,
) -> Result<Vec<Option<usize>>, ServiceError> {
    if pings.is_empty() {
        return Ok(Vec::new());
    }

    let observations = Array2::from_shape_fn((pings.len(), 2), |(i, j)| {
        if j == 0 {
            pings[i].lat
        } else {
            pings[i].lng
        }
    });

    let memberships = Dbscan::params_with(
        min_k.max(LIBRARY_MIN_POINTS),
        Haversine,
        CommonNearestNeighbour::BallTree,
    )
    .tolerance(distance_km)
    .check()
    .map_err(|e| ServiceError::Inference(format!("invalid clustering parameters: {}", e)))?
    .transform(&observations);

    let mut labels = memberships.to_vec();

    // With min_points = 2 a ping is noise only when it has no neighbour at all,
    // so promoting noise reproduces min_points = 1 exactly.
    if min_k == 1 {
        let mut next = labels.iter().flatten().max().map_or(0, |&max| max + 1);
        for label in labels.iter_mut().filter(|l| l.is_none()) {
            *label = Some(next);
            next += 1;
        }
    }

    Ok(labels)
}

fn compute_centroids(
    pings: &[LocationPing],
    labels: &[Option<usize>],
    n_clusters: usize,
) -> Vec<StayCluster> {
    let mut sums = vec![(0.0_f64, 0.0_f64, 0_usize); n_clusters];
    for (ping, label) in pings.iter().zip(labels) {
        if let Some(label) = *label {
            let entry = &mut sums[label];
            entry.0 += ping.lat;
            entry.1 += ping.lng;
            entry.2 += 1;
        }
    }

    sums.into_iter()
        .enumerate()
        .map(|(label, (lat, lng, size))| {
            let n = size.max(1) as f64;
            StayCluster {
                label,
                lat: lat / n,
                lng: lng / n,
                size,
            }
        })
        .collect()
}

/// Collapse consecutive same-cluster pings into visits, skipping noise
fn collapse_visits(pings: &[LocationPing], labels: &[Option<usize>]) -> Vec<Visit> {
    let mut visits: Vec<Visit> = Vec::new();
    for (ping, label) in pings.iter().zip(labels) {
        let Some(cluster) = *label else { continue };
        match visits.last_mut() {
            Some(visit) if visit.cluster == cluster => visit.departure = ping.timestamp,
            _ => visits.push(Visit {
                cluster,
                arrival: ping.timestamp,
                departure: ping.timestamp,
            }),
        }
    }
    visits
}

fn derive_trips(
    uid: &str,
    pings: &[LocationPing],
    labels: &[Option<usize>],
    clusters: &[StayCluster],
) -> Vec<TripRecord> {
    collapse_visits(pings, labels)
        .windows(2)
        .map(|pair| {
            let (origin, dest) = (&pair[0], &pair[1]);
            let from = &clusters[origin.cluster];
            let to = &clusters[dest.cluster];
            let departure = origin.departure;

            TripRecord {
                uid: uid.to_string(),
                cluster_origin: from.label,
                lat_origin: from.lat,
                lng_origin: from.lng,
                cluster_dest: to.label,
                cluster_dest_lat: to.lat,
                cluster_dest_lng: to.lng,
                departure,
                arrival: dest.arrival,
                timedelta: (dest.arrival - departure).num_milliseconds() as f64 / 1000.0,
                month: departure.month(),
                day: departure.day(),
                day_of_week: departure.weekday().num_days_from_monday(),
                hour_in_day: departure.hour(),
                minute_in_hour: departure.minute(),
            }
        })
        .collect()
}

/// Mean silhouette coefficient over an evenly strided sample of clustered pings
fn silhouette_score(pings: &[LocationPing], labels: &[Option<usize>], n_clusters: usize) -> f64 {
    let clustered: Vec<(usize, usize)> = labels
        .iter()
        .enumerate()
        .filter_map(|(i, l)| l.map(|label| (i, label)))
        .collect();

    let stride = clustered.len().div_ceil(SILHOUETTE_SAMPLE_SIZE).max(1);
    let sample: Vec<(usize, usize)> = clustered.into_iter().step_by(stride).collect();
    if sample.len() < 2 {
        return 0.0;
    }

    let mut silhouette_sum = 0.0;

    for &(i, cluster_label) in &sample {
        let point = &pings[i];

        // Accumulate (sum, count) of distances per cluster
        let mut totals = vec![(0.0_f64, 0_usize); n_clusters];
        for &(j, other_label) in &sample {
            if i == j {
                continue;
            }
            let other = &pings[j];
            let distance = haversine_km(point.lat, point.lng, other.lat, other.lng);
            totals[other_label].0 += distance;
            totals[other_label].1 += 1;
        }

        let (own_sum, own_count) = totals[cluster_label];
        // Singleton clusters score 0
        if own_count == 0 {
            continue;
        }
        let a_i = own_sum / own_count as f64;

        let b_i = totals
            .iter()
            .enumerate()
            .filter(|(label, (_, count))| *label != cluster_label && *count > 0)
            .map(|(_, (sum, count))| sum / *count as f64)
            .fold(f64::INFINITY, f64::min);

        if b_i.is_finite() && a_i.max(b_i) > 0.0 {
            silhouette_sum += (b_i - a_i) / a_i.max(b_i);
        }
    }

    silhouette_sum / sample.len() as f64
}

/// Davies-Bouldin index using haversine scatter around each centroid
fn davies_bouldin_index(
    pings: &[LocationPing],
    labels: &[Option<usize>],
    clusters: &[StayCluster],
) -> f64 {
    let mut scatter = vec![0.0_f64; clusters.len()];
    for (ping, label) in pings.iter().zip(labels) {
        if let Some(label) = *label {
            let c = &clusters[label];
            scatter[label] += haversine_km(ping.lat, ping.lng, c.lat, c.lng);
        }
    }
    for (s, c) in scatter.iter_mut().zip(clusters) {
        *s /= c.size.max(1) as f64;
    }

    let total: f64 = clusters
        .iter()
        .map(|ci| {
            clusters
                .iter()
                .filter(|cj| cj.label != ci.label)
                .filter_map(|cj| {
                    let separation = haversine_km(ci.lat, ci.lng, cj.lat, cj.lng);
                    (separation > 0.0)
                        .then(|| (scatter[ci.label] + scatter[cj.label]) / separation)
                })
                .fold(0.0, f64::max)
        })
        .sum();

    total / clusters.len() as f64
}

/// Within-cluster sum of squared distances, in km²
fn compute_inertia(
    pings: &[LocationPing],
    labels: &[Option<usize>],
    clusters: &[StayCluster],
) -> f64 {
    pings
        .iter()
        .zip(labels)
        .filter_map(|(ping, label)| {
            label.map(|label| {
                let c = &clusters[label];
                haversine_km(ping.lat, ping.lng, c.lat, c.lng).powi(2)
            })
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const HOME: (f64, f64) = (39.9840, 116.3180);
    const OFFICE: (f64, f64) = (39.9990, 116.3260);
    const GYM: (f64, f64) = (39.9700, 116.3400);

    fn ping(place: (f64, f64), jitter: f64, hour: u32, minute: u32) -> LocationPing {
        LocationPing {
            uid: "000".to_string(),
            lat: place.0 + jitter,
            lng: place.1 - jitter,
            timestamp: NaiveDate::from_ymd_opt(2008, 10, 23)
                .unwrap()
                .and_hms_opt(hour, minute, 0)
                .unwrap(),
        }
    }

    /// Home -> office -> home -> gym on Thursday 2008-10-23
    fn create_test_pings() -> Vec<LocationPing> {
        vec![
            ping(HOME, 0.0, 7, 50),
            ping(HOME, 0.0001, 8, 0),
            ping(HOME, -0.0001, 8, 10),
            ping(OFFICE, 0.0, 8, 40),
            ping(OFFICE, 0.0001, 12, 0),
            ping(OFFICE, -0.0001, 17, 30),
            ping(HOME, 0.00005, 18, 5),
            ping(HOME, -0.00005, 19, 0),
            ping(GYM, 0.0, 19, 20),
            ping(GYM, 0.0001, 20, 0),
            ping(GYM, -0.0001, 20, 45),
        ]
    }

    #[test]
    fn test_cluster_user_finds_stay_locations() {
        let pings = create_test_pings();
        let outcome = cluster_user("000", &pings, 0.2, 1).unwrap();

        assert_eq!(outcome.scores.n_clusters, 3);
        assert_eq!(outcome.clusters.len(), 3);
        assert_eq!(outcome.scores.n_noise, 0);
        assert_eq!(outcome.labels.len(), pings.len());
        assert_eq!(outcome.clusters.iter().map(|c| c.size).sum::<usize>(), 11);

        // Both home visits share one label
        assert_eq!(outcome.labels[0], outcome.labels[6]);
        assert_ne!(outcome.labels[0], outcome.labels[3]);
        assert_ne!(outcome.labels[3], outcome.labels[8]);
    }

    #[test]
    fn test_centroids_within_distance_of_members() {
        let pings = create_test_pings();
        let distance = 0.2;
        let outcome = cluster_user("000", &pings, distance, 1).unwrap();

        for cluster in &outcome.clusters {
            for i in outcome.members(cluster.label) {
                let d = haversine_km(cluster.lat, cluster.lng, pings[i].lat, pings[i].lng);
                assert!(d <= distance, "ping {} is {} km from its centroid", i, d);
            }
        }
    }

    #[test]
    fn test_trips_follow_visit_order() {
        let pings = create_test_pings();
        let outcome = cluster_user("000", &pings, 0.2, 1).unwrap();

        let home = outcome.labels[0].unwrap();
        let office = outcome.labels[3].unwrap();
        let gym = outcome.labels[8].unwrap();

        let legs: Vec<(usize, usize)> = outcome
            .trips
            .iter()
            .map(|t| (t.cluster_origin, t.cluster_dest))
            .collect();
        assert_eq!(legs, vec![(home, office), (office, home), (home, gym)]);
        assert_eq!(outcome.scores.n_trips, 3);
    }

    #[test]
    fn test_trip_temporal_features() {
        let pings = create_test_pings();
        let outcome = cluster_user("000", &pings, 0.2, 1).unwrap();

        let first = &outcome.trips[0];
        // Left home at 08:10, reached the office at 08:40
        assert_eq!(first.timedelta, 1800.0);
        assert_eq!(first.month, 10);
        assert_eq!(first.day, 23);
        assert_eq!(first.day_of_week, 3);
        assert_eq!(first.hour_in_day, 8);
        assert_eq!(first.minute_in_hour, 10);
        assert_eq!(first.uid, "000");

        let home = &outcome.clusters[outcome.labels[0].unwrap()];
        assert_eq!(first.lat_origin, home.lat);
        assert_eq!(first.lng_origin, home.lng);
    }

    #[test]
    fn test_isolated_ping_is_singleton_when_min_k_is_one() {
        let mut pings = create_test_pings();
        pings.push(ping((40.0500, 116.4000), 0.0, 22, 0));

        let outcome = cluster_user("000", &pings, 0.2, 1).unwrap();
        assert_eq!(outcome.scores.n_clusters, 4);
        assert_eq!(outcome.scores.n_noise, 0);
        let last = outcome.labels[11].unwrap();
        assert_eq!(outcome.clusters[last].size, 1);
    }

    #[test]
    fn test_isolated_ping_is_noise_when_min_k_is_two() {
        let mut pings = create_test_pings();
        pings.push(ping((40.0500, 116.4000), 0.0, 22, 0));

        let outcome = cluster_user("000", &pings, 0.2, 2).unwrap();
        assert_eq!(outcome.scores.n_clusters, 3);
        assert_eq!(outcome.scores.n_noise, 1);
        assert_eq!(outcome.labels[11], None);
        assert_eq!(outcome.scores.n_trips, 3);
    }

    #[test]
    fn test_min_k_above_stay_size_is_degenerate() {
        let pings = create_test_pings();

        let result = cluster_user("000", &pings, 0.2, 10);
        assert!(matches!(result, Err(ServiceError::Inference(_))));
    }

    #[test]
    fn test_single_location_is_degenerate() {
        let pings: Vec<LocationPing> = (0..5).map(|m| ping(HOME, 0.0, 9, m)).collect();

        let err = cluster_user("000", &pings, 0.2, 1).unwrap_err();
        assert!(matches!(err, ServiceError::Inference(_)));
        assert!(err.to_string().contains("degenerate"));
    }

    #[test]
    fn test_invalid_parameters() {
        let pings = create_test_pings();

        for distance in [0.0, -0.2, f64::NAN] {
            let result = cluster_user("000", &pings, distance, 1);
            assert!(matches!(result, Err(ServiceError::Validation(_))));
        }
        let result = cluster_user("000", &pings, 0.2, 0);
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[test]
    fn test_scores_for_well_separated_clusters() {
        let pings = create_test_pings();
        let scores = cluster_user("000", &pings, 0.2, 1).unwrap().scores;

        assert!(scores.silhouette > 0.9 && scores.silhouette <= 1.0);
        assert!(scores.davies_bouldin >= 0.0 && scores.davies_bouldin < 0.1);
        assert!(scores.inertia >= 0.0 && scores.inertia.is_finite());
    }

    #[test]
    fn test_clustering_is_deterministic() {
        let pings = create_test_pings();
        let first = cluster_user("000", &pings, 0.2, 2).unwrap();
        let second = cluster_user("000", &pings, 0.2, 2).unwrap();

        assert_eq!(first.labels, second.labels);
        assert_eq!(first.trips, second.trips);
        assert_eq!(first.scores, second.scores);
    }

    #[test]
    fn test_silhouette_on_large_history_is_sampled() {
        let start = NaiveDate::from_ymd_opt(2008, 10, 23)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        // 30 alternating stays of 100 pings each
        let pings: Vec<LocationPing> = (0..3000)
            .map(|i| {
                let place = if (i / 100) % 2 == 0 { HOME } else { OFFICE };
                let jitter = ((i % 7) as f64 - 3.0) * 0.00002;
                LocationPing {
                    uid: "000".to_string(),
                    lat: place.0 + jitter,
                    lng: place.1 - jitter,
                    timestamp: start + chrono::Duration::minutes(i as i64),
                }
            })
            .collect();
        assert!(pings.len() > SILHOUETTE_SAMPLE_SIZE);

        let first = cluster_user("000", &pings, 0.2, 2).unwrap();
        let second = cluster_user("000", &pings, 0.2, 2).unwrap();

        assert_eq!(first.scores.n_clusters, 2);
        assert_eq!(first.scores.n_trips, 29);
        let silhouette = first.scores.silhouette;
        assert!(silhouette.is_finite());
        assert!((-1.0..=1.0).contains(&silhouette));
        assert!(silhouette > 0.9);
        assert_eq!(first.scores, second.scores);
    }
}
