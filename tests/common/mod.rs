//! Shared fixtures: a small GeoLife-style dataset and a linear model artifact

#![allow(dead_code)]

use std::io::Write;
use tempfile::NamedTempFile;

pub const HOME: (f64, f64) = (39.9840, 116.3180);
pub const OFFICE: (f64, f64) = (39.9990, 116.3260);
pub const GYM: (f64, f64) = (39.9700, 116.3400);

/// User 000 moves home -> office -> home -> gym; user 002 never leaves home
pub fn create_test_dataset() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "uid,lat,lng,altitude,datetime").unwrap();

    let visits = [
        ("000", HOME, ["07:50:00", "08:00:00", "08:10:00"]),
        ("000", OFFICE, ["08:40:00", "12:00:00", "17:30:00"]),
        ("000", HOME, ["18:05:00", "18:30:00", "19:00:00"]),
        ("000", GYM, ["19:20:00", "20:00:00", "20:45:00"]),
        ("002", HOME, ["09:00:00", "09:05:00", "09:10:00"]),
    ];
    for (uid, (lat, lng), times) in visits {
        for (i, time) in times.iter().enumerate() {
            let jitter = (i as f64 - 1.0) * 0.0001;
            writeln!(
                file,
                "{},{:.6},{:.6},150,2008-10-23 {}",
                uid,
                lat + jitter,
                lng - jitter,
                time
            )
            .unwrap();
        }
    }
    file
}

/// Predicts the destination as the origin shifted by (0.01, -0.02)
pub fn create_test_model() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    let mut coefficients = vec![vec![0.0, 0.0]; 9];
    coefficients[1] = vec![1.0, 0.0];
    coefficients[2] = vec![0.0, 1.0];

    let artifact = serde_json::json!({
        "feature_names": [
            "uid", "lat_origin", "lng_origin", "timedelta", "month",
            "day", "day_of_week", "hour_in_day", "minute_in_hour"
        ],
        "target_names": ["lat_dest", "lng_dest"],
        "estimator": {
            "kind": "linear",
            "coefficients": coefficients,
            "intercept": [0.01, -0.02]
        }
    });
    write!(file, "{}", artifact).unwrap();
    file
}
