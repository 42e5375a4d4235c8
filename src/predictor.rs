//! Pre-trained next-location model loaded from a JSON artifact
//!
//! The artifact names the features the estimator was trained on, in order.
//! Requests are projected onto that ordering before inference, so an artifact
//! may use any subset of [`FEATURE_NAMES`] in any order.

use crate::error::ServiceError;
use anyhow::Context;
use linfa_nn::distance::L2Dist;
use linfa_nn::{CommonNearestNeighbour, NearestNeighbour};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Every feature a prediction request can supply
pub const FEATURE_NAMES: [&str; 9] = [
    "uid",
    "lat_origin",
    "lng_origin",
    "timedelta",
    "month",
    "day",
    "day_of_week",
    "hour_in_day",
    "minute_in_hour",
];

/// On-disk model description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub feature_names: Vec<String>,
    pub target_names: Vec<String>,
    pub estimator: Estimator,
}

/// Estimator parameters as stored in the artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    /// `y = x · coefficients + intercept`, coefficients are `n_features × n_targets`
    Linear {
        coefficients: Vec<Vec<f64>>,
        intercept: Vec<f64>,
    },
    /// Mean target of the `k` nearest training samples
    KNeighbors {
        k: usize,
        samples: Vec<Vec<f64>>,
        targets: Vec<Vec<f64>>,
    },
}

/// Input of a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub uid: f64,
    pub lat_origin: f64,
    pub lng_origin: f64,
    pub timedelta: f64,
    pub month: u32,
    pub day: u32,
    pub day_of_week: u32,
    pub hour_in_day: u32,
    pub minute_in_hour: u32,
}

impl FeatureVector {
    /// Look a feature up by its artifact name
    pub fn value(&self, name: &str) -> Option<f64> {
        let value = match name {
            "uid" => self.uid,
            "lat_origin" => self.lat_origin,
            "lng_origin" => self.lng_origin,
            "timedelta" => self.timedelta,
            "month" => self.month as f64,
            "day" => self.day as f64,
            "day_of_week" => self.day_of_week as f64,
            "hour_in_day" => self.hour_in_day as f64,
            "minute_in_hour" => self.minute_in_hour as f64,
            _ => return None,
        };
        Some(value)
    }

    /// Check every feature lies in its calendar or coordinate range
    pub fn validate(&self) -> Result<(), ServiceError> {
        let invalid = |msg: String| Err(ServiceError::Validation(msg));

        if !self.uid.is_finite() {
            return invalid(format!("uid must be numeric, got {}", self.uid));
        }
        if !(-90.0..=90.0).contains(&self.lat_origin) {
            return invalid(format!("lat_origin out of range: {}", self.lat_origin));
        }
        if !(-180.0..=180.0).contains(&self.lng_origin) {
            return invalid(format!("lng_origin out of range: {}", self.lng_origin));
        }
        if !self.timedelta.is_finite() || self.timedelta < 0.0 {
            return invalid(format!(
                "timedelta must be a non-negative number, got {}",
                self.timedelta
            ));
        }

        let ranges = [
            ("month", self.month, 1, 12),
            ("day", self.day, 1, 31),
            ("day_of_week", self.day_of_week, 0, 6),
            ("hour_in_day", self.hour_in_day, 0, 23),
            ("minute_in_hour", self.minute_in_hour, 0, 59),
        ];
        for (name, value, min, max) in ranges {
            if !(min..=max).contains(&value) {
                return invalid(format!(
                    "{} must be between {} and {}, got {}",
                    name, min, max, value
                ));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
enum FittedEstimator {
    Linear {
        weights: Array2<f64>,
        intercept: Array1<f64>,
    },
    KNeighbors {
        k: usize,
        samples: Array2<f64>,
        targets: Array2<f64>,
    },
}

/// A validated, read-only next-location model
#[derive(Debug, Clone)]
pub struct NextLocationModel {
    feature_names: Vec<String>,
    target_names: Vec<String>,
    estimator: FittedEstimator,
}

impl NextLocationModel {
    /// Read and validate a JSON artifact
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read model artifact {}", path.display()))?;
        let artifact: ModelArtifact = serde_json::from_str(&raw)
            .with_context(|| format!("malformed model artifact {}", path.display()))?;
        Self::from_artifact(artifact)
    }

    pub fn from_artifact(artifact: ModelArtifact) -> crate::Result<Self> {
        let ModelArtifact {
            feature_names,
            target_names,
            estimator,
        } = artifact;

        if feature_names.is_empty() {
            anyhow::bail!("Model artifact must name at least one feature");
        }
        if target_names.is_empty() {
            anyhow::bail!("Model artifact must name at least one target");
        }
        let mut seen = HashSet::new();
        for name in &feature_names {
            if !FEATURE_NAMES.contains(&name.as_str()) {
                anyhow::bail!(
                    "Unknown feature '{}', expected one of {:?}",
                    name,
                    FEATURE_NAMES
                );
            }
            if !seen.insert(name.as_str()) {
                anyhow::bail!("Feature '{}' listed more than once", name);
            }
        }

        let n_features = feature_names.len();
        let n_targets = target_names.len();

        let estimator = match estimator {
            Estimator::Linear {
                coefficients,
                intercept,
            } => {
                if coefficients.len() != n_features {
                    anyhow::bail!(
                        "Linear model has {} coefficient rows for {} features",
                        coefficients.len(),
                        n_features
                    );
                }
                if intercept.len() != n_targets {
                    anyhow::bail!(
                        "Linear model has {} intercepts for {} targets",
                        intercept.len(),
                        n_targets
                    );
                }
                FittedEstimator::Linear {
                    weights: rows_to_array(&coefficients, n_targets, "coefficients")?,
                    intercept: Array1::from(intercept),
                }
            }
            Estimator::KNeighbors {
                k,
                samples,
                targets,
            } => {
                if samples.is_empty() {
                    anyhow::bail!("Neighbours model has no training samples");
                }
                if samples.len() != targets.len() {
                    anyhow::bail!(
                        "Neighbours model has {} samples but {} targets",
                        samples.len(),
                        targets.len()
                    );
                }
                if k == 0 || k > samples.len() {
                    anyhow::bail!(
                        "k must be between 1 and {} (number of samples), got {}",
                        samples.len(),
                        k
                    );
                }
                FittedEstimator::KNeighbors {
                    k,
                    samples: rows_to_array(&samples, n_features, "samples")?,
                    targets: rows_to_array(&targets, n_targets, "targets")?,
                }
            }
        };

        Ok(NextLocationModel {
            feature_names,
            target_names,
            estimator,
        })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn target_names(&self) -> &[String] {
        &self.target_names
    }

    /// Predict one row of targets for the given features
    pub fn predict(&self, features: &FeatureVector) -> Result<Vec<Vec<f64>>, ServiceError> {
        features.validate()?;

        let row = self
            .feature_names
            .iter()
            .map(|name| {
                features
                    .value(name)
                    .ok_or_else(|| ServiceError::Inference(format!("unknown feature '{}'", name)))
            })
            .collect::<Result<Vec<f64>, _>>()?;
        let input = Array2::from_shape_vec((1, row.len()), row)
            .map_err(|e| ServiceError::Inference(e.to_string()))?;

        let output = match &self.estimator {
            FittedEstimator::Linear { weights, intercept } => input.dot(weights) + intercept,
            FittedEstimator::KNeighbors {
                k,
                samples,
                targets,
            } => predict_neighbours(&input, *k, samples, targets)?,
        };

        if output.iter().any(|v| !v.is_finite()) {
            return Err(ServiceError::Inference(
                "model produced a non-finite prediction".to_string(),
            ));
        }

        Ok(output.outer_iter().map(|row| row.to_vec()).collect())
    }
}

/// The linfa-nn index borrows `samples`, so it is built per call rather than stored
fn predict_neighbours(
    input: &Array2<f64>,
    k: usize,
    samples: &Array2<f64>,
    targets: &Array2<f64>,
) -> Result<Array2<f64>, ServiceError> {
    let index = CommonNearestNeighbour::KdTree
        .from_batch(samples, L2Dist)
        .map_err(|e| ServiceError::Inference(format!("failed to index samples: {}", e)))?;

    let mut output = Array2::zeros((input.nrows(), targets.ncols()));
    for (row, mut out) in input.outer_iter().zip(output.outer_iter_mut()) {
        let neighbours = index
            .k_nearest(row, k)
            .map_err(|e| ServiceError::Inference(format!("neighbour search failed: {}", e)))?;
        let chosen: Vec<usize> = neighbours.iter().map(|(_, idx)| *idx).collect();
        let mean = targets
            .select(Axis(0), &chosen)
            .mean_axis(Axis(0))
            .ok_or_else(|| ServiceError::Inference("no neighbours found".to_string()))?;
        out.assign(&mean);
    }
    Ok(output)
}

fn rows_to_array(rows: &[Vec<f64>], width: usize, what: &str) -> crate::Result<Array2<f64>> {
    let mut flat = Vec::with_capacity(rows.len() * width);
    for (i, row) in rows.iter().enumerate() {
        if row.len() != width {
            anyhow::bail!(
                "Row {} of {} has {} values, expected {}",
                i,
                what,
                row.len(),
                width
            );
        }
        flat.extend_from_slice(row);
    }
    Ok(Array2::from_shape_vec((rows.len(), width), flat)?)
}
