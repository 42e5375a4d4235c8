//! Location history loading using Polars

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// A single GPS observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPing {
    pub uid: String,
    pub lat: f64,
    pub lng: f64,
    pub timestamp: NaiveDateTime,
}

/// Every user's pings, keyed by user id and ordered by timestamp
#[derive(Debug, Clone, Default)]
pub struct LocationHistory {
    users: BTreeMap<String, Vec<LocationPing>>,
}

impl LocationHistory {
    /// Group pings by user and sort each user's pings by time.
    /// Pings sharing a timestamp keep their input order.
    pub fn from_pings(pings: impl IntoIterator<Item = LocationPing>) -> Self {
        let mut users: BTreeMap<String, Vec<LocationPing>> = BTreeMap::new();
        for ping in pings {
            users.entry(ping.uid.clone()).or_default().push(ping);
        }
        for pings in users.values_mut() {
            pings.sort_by_key(|p| p.timestamp);
        }
        LocationHistory { users }
    }

    pub fn pings(&self, uid: &str) -> Option<&[LocationPing]> {
        self.users.get(uid).map(Vec::as_slice)
    }

    pub fn user_ids(&self) -> impl Iterator<Item = &str> {
        self.users.keys().map(String::as_str)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Total number of pings across all users
    pub fn len(&self) -> usize {
        self.users.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Load a CSV of GPS pings into a [`LocationHistory`]
///
/// # Arguments
/// * `file_path` - CSV with `uid`, `lat`, `lng` and `datetime` columns
///
/// # Returns
/// * `LocationHistory` grouped by user
pub fn load_location_history<P: AsRef<Path>>(file_path: P) -> crate::Result<LocationHistory> {
    let file_path = file_path.as_ref();

    // Every column is scanned as text so zero-padded ids like "000" survive
    let df = LazyCsvReader::new(file_path)
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .finish()
        .with_context(|| format!("failed to open dataset {}", file_path.display()))?
        .select([
            col("uid"),
            col("lat").cast(DataType::Float64),
            col("lng").cast(DataType::Float64),
            col("datetime"),
        ])
        .collect()
        .with_context(|| format!("failed to read dataset {}", file_path.display()))?;

    if df.height() == 0 {
        anyhow::bail!("No location pings found in {}", file_path.display());
    }

    let pings = extract_pings(&df)?;
    Ok(LocationHistory::from_pings(pings))
}

/// Convert the selected columns into typed pings, rejecting incomplete rows
fn extract_pings(df: &DataFrame) -> crate::Result<Vec<LocationPing>> {
    let uids = df.column("uid")?.str()?;
    let lats = df.column("lat")?.f64()?;
    let lngs = df.column("lng")?.f64()?;
    let times = df.column("datetime")?.str()?;

    let mut pings = Vec::with_capacity(df.height());
    let rows = uids.into_iter().zip(lats).zip(lngs).zip(times);

    for (row, (((uid, lat), lng), datetime)) in rows.enumerate() {
        // Header is line 1
        let line = row + 2;
        let uid = uid
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Missing uid on line {}", line))?;
        let lat = lat.ok_or_else(|| anyhow::anyhow!("Invalid lat on line {}", line))?;
        let lng = lng.ok_or_else(|| anyhow::anyhow!("Invalid lng on line {}", line))?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            anyhow::bail!("Coordinates out of range on line {}: ({}, {})", line, lat, lng);
        }
        let datetime =
            datetime.ok_or_else(|| anyhow::anyhow!("Missing datetime on line {}", line))?;
        let timestamp = parse_timestamp(datetime)
            .ok_or_else(|| anyhow::anyhow!("Invalid datetime on line {}: {}", line, datetime))?;

        pings.push(LocationPing {
            uid: uid.to_string(),
            lat,
            lng,
            timestamp,
        });
    }

    Ok(pings)
}

/// Parse `YYYY-MM-DD HH:MM:SS`, its `T`-separated form, or RFC 3339 (as UTC)
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.naive_utc())
        })
}
