//! HTTP surface of the clustering and prediction service

pub mod handlers;
pub mod models;
pub mod routes;

pub use routes::{create_router, run_server};

use crate::data::{load_location_history, LocationHistory};
use crate::error::ServiceError;
use crate::model::{cluster_user, validate_parameters, ClusteringOutcome};
use crate::predictor::{FeatureVector, NextLocationModel};
use std::path::Path;

/// Dataset and model shared by every request.
///
/// Built once before serving starts and never mutated afterwards.
#[derive(Debug)]
pub struct AppState {
    history: LocationHistory,
    model: NextLocationModel,
}

impl AppState {
    pub fn new(history: LocationHistory, model: NextLocationModel) -> Self {
        AppState { history, model }
    }

    /// Load the dataset CSV and the model artifact
    pub fn load(dataset_path: &Path, model_path: &Path) -> crate::Result<Self> {
        let history = load_location_history(dataset_path)?;
        tracing::info!(
            "Loaded {} pings for {} users from {}",
            history.len(),
            history.user_count(),
            dataset_path.display()
        );

        let model = NextLocationModel::load(model_path)?;
        tracing::info!(
            "Loaded model from {} (features: {:?})",
            model_path.display(),
            model.feature_names()
        );

        Ok(AppState::new(history, model))
    }

    pub fn history(&self) -> &LocationHistory {
        &self.history
    }

    pub fn model(&self) -> &NextLocationModel {
        &self.model
    }

    pub fn cluster(
        &self,
        uid: &str,
        distance_km: f64,
        min_k: usize,
    ) -> Result<ClusteringOutcome, ServiceError> {
        validate_parameters(distance_km, min_k)?;
        let pings = self
            .history
            .pings(uid)
            .ok_or_else(|| ServiceError::NotFound(format!("user '{}' not found in dataset", uid)))?;
        cluster_user(uid, pings, distance_km, min_k)
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<Vec<Vec<f64>>, ServiceError> {
        self.model.predict(features)
    }
}
