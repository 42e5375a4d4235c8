//! Interactive client: validated form, clustering request, table and map output

use crate::api::models::ClusteringResponse;
use crate::cli::DashboardArgs;
use crate::error::ErrorResponse;
use crate::model::{ClusterScores, TripRecord};
use crate::viz::{map_center, render_cluster_map};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Users selectable from the dashboard
pub const APPROVED_UIDS: [&str; 6] = ["000", "002", "003", "004", "011", "014"];

/// Max distance between two points, in km
pub const DISTANCE_RANGE: RangeInclusive<f64> = 0.01..=0.5;

/// Min. number of observations per stay location
pub const MIN_K_RANGE: RangeInclusive<usize> = 1..=5;

/// Cluster inputs, checked against the dashboard's bounded controls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterForm {
    pub uid: String,
    pub distance: f64,
    pub min_k: usize,
}

impl ClusterForm {
    pub fn new(uid: &str, distance: f64, min_k: usize) -> crate::Result<Self> {
        if !APPROVED_UIDS.contains(&uid) {
            anyhow::bail!("User ID must be one of {:?}, got '{}'", APPROVED_UIDS, uid);
        }
        if !DISTANCE_RANGE.contains(&distance) {
            anyhow::bail!(
                "Distance must be between {} and {} km, got {}",
                DISTANCE_RANGE.start(),
                DISTANCE_RANGE.end(),
                distance
            );
        }
        if !MIN_K_RANGE.contains(&min_k) {
            anyhow::bail!(
                "Min. number of observations must be between {} and {}, got {}",
                MIN_K_RANGE.start(),
                MIN_K_RANGE.end(),
                min_k
            );
        }

        Ok(ClusterForm {
            uid: uid.to_string(),
            distance,
            min_k,
        })
    }
}

/// HTTP client for the clustering service
#[derive(Debug, Clone)]
pub struct DashboardClient {
    backend_url: String,
    http: reqwest::Client,
}

impl DashboardClient {
    pub fn new(backend_url: &str) -> Self {
        DashboardClient {
            backend_url: backend_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }

    /// Submit the form to `POST /cluster`.
    /// Non-success responses become errors carrying the service's detail message.
    pub async fn fetch_clusters(&self, form: &ClusterForm) -> crate::Result<ClusteringResponse> {
        let url = format!("{}/cluster", self.backend_url);
        let response = self
            .http
            .post(&url)
            .json(form)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ErrorResponse>()
                .await
                .map(|body| body.detail)
                .unwrap_or_else(|_| "no detail provided".to_string());
            anyhow::bail!("service returned {}: {}", status, detail);
        }

        response
            .json::<ClusteringResponse>()
            .await
            .context("malformed clustering response")
    }
}

/// One-row table of quality scores
pub fn format_scores_table(scores: &ClusterScores) -> String {
    let header = format!(
        "{:>10} | {:>14} | {:>12} | {:>10} | {:>7} | {:>7}",
        "silhouette", "davies_bouldin", "inertia", "n_clusters", "n_noise", "n_trips"
    );
    let row = format!(
        "{:>10.3} | {:>14.3} | {:>12.4} | {:>10} | {:>7} | {:>7}",
        scores.silhouette,
        scores.davies_bouldin,
        scores.inertia,
        scores.n_clusters,
        scores.n_noise,
        scores.n_trips
    );
    format!("{}\n{}\n{}\n", header, "-".repeat(76), row)
}

/// Trip records, one line each
pub fn format_trips_table(trips: &[TripRecord]) -> String {
    let mut out = format!(
        "{:>6} | {:>10} | {:>11} | {:>6} | {:>10} | {:>11} | {:>19} | {:>10}\n",
        "origin", "lat", "lng", "dest", "lat", "lng", "departure", "timedelta"
    );
    out.push_str(&"-".repeat(106));
    out.push('\n');

    for trip in trips {
        out.push_str(&format!(
            "{:>6} | {:>10.5} | {:>11.5} | {:>6} | {:>10.5} | {:>11.5} | {:>19} | {:>10.0}\n",
            trip.cluster_origin,
            trip.lat_origin,
            trip.lng_origin,
            trip.cluster_dest,
            trip.cluster_dest_lat,
            trip.cluster_dest_lng,
            trip.departure.format("%Y-%m-%d %H:%M:%S").to_string(),
            trip.timedelta
        ));
    }
    out
}

/// Validate inputs, query the service once and render the results.
/// Service and network failures are reported as warnings, not retried.
pub async fn run_dashboard(args: &DashboardArgs) -> crate::Result<()> {
    let form = ClusterForm::new(&args.uid, args.distance, args.min_k)?;
    let client = DashboardClient::new(&args.backend_url);

    println!("Clustering user {} (distance {} km, min_k {})...", form.uid, form.distance, form.min_k);

    let response = match client.fetch_clusters(&form).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("clustering request failed: {:#}", e);
            eprintln!("Error connecting to prediction service: {:#}", e);
            eprintln!(
                "Warning: make sure the backend service is running at {}",
                client.backend_url()
            );
            return Ok(());
        }
    };

    println!("\n=== Cluster Scores ===");
    print!("{}", format_scores_table(&response.scores));

    if let Some((lat, lng)) = map_center(&response.df) {
        render_cluster_map(&response.df, &args.output)?;
        println!(
            "\nMap centered at ({:.5}, {:.5}) saved to: {}",
            lat,
            lng,
            args.output.display()
        );
    }

    println!("\n=== Trips ===");
    print!("{}", format_trips_table(&response.df));

    Ok(())
}
