//! Map overlay of origin and destination clusters using Plotters

use crate::model::TripRecord;
use plotters::prelude::*;
use std::path::Path;

/// Origin clusters: large dark-blue markers
const ORIGIN_COLOR: RGBColor = RGBColor(0x06, 0x1C, 0x80);
const ORIGIN_RADIUS: i32 = 7;

/// Destination clusters: small red markers
const DEST_COLOR: RGBColor = RGBColor(0xA5, 0x1D, 0x1D);
const DEST_RADIUS: i32 = 2;

const MAP_SIZE: (u32, u32) = (1600, 600);

/// Smallest half-width of the map window, in degrees
const MIN_HALF_EXTENT: f64 = 0.005;

/// Median origin coordinate, used to center the map
pub fn map_center(trips: &[TripRecord]) -> Option<(f64, f64)> {
    let lats: Vec<f64> = trips.iter().map(|t| t.lat_origin).collect();
    let lngs: Vec<f64> = trips.iter().map(|t| t.lng_origin).collect();
    Some((median(lats)?, median(lngs)?))
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Render trip origins and destinations as two marker layers
///
/// # Arguments
/// * `trips` - Trip records returned by the clustering endpoint
/// * `output_path` - Path to save the SVG map
pub fn render_cluster_map(trips: &[TripRecord], output_path: &Path) -> crate::Result<()> {
    let (center_lat, center_lng) = map_center(trips)
        .ok_or_else(|| anyhow::anyhow!("No trips to draw on the map"))?;

    // Symmetric window around the center that holds every marker
    let points = trips.iter().flat_map(|t| {
        [
            (t.lat_origin, t.lng_origin),
            (t.cluster_dest_lat, t.cluster_dest_lng),
        ]
    });
    let (half_lat, half_lng) = points.fold((MIN_HALF_EXTENT, MIN_HALF_EXTENT), |acc, (lat, lng)| {
        (
            acc.0.max((lat - center_lat).abs() * 1.1),
            acc.1.max((lng - center_lng).abs() * 1.1),
        )
    });

    let root = SVGBackend::new(output_path, MAP_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root).margin(10).build_cartesian_2d(
        (center_lng - half_lng)..(center_lng + half_lng),
        (center_lat - half_lat)..(center_lat + half_lat),
    )?;

    chart.draw_series(trips.iter().map(|t| {
        Circle::new(
            (t.lng_origin, t.lat_origin),
            ORIGIN_RADIUS,
            ORIGIN_COLOR.filled(),
        )
    }))?;

    chart.draw_series(trips.iter().map(|t| {
        Circle::new(
            (t.cluster_dest_lng, t.cluster_dest_lat),
            DEST_RADIUS,
            DEST_COLOR.filled(),
        )
    }))?;

    root.present()?;
    tracing::info!("Cluster map saved to: {}", output_path.display());

    Ok(())
}
