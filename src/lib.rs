//! GeoLife: stay-location clustering and next-location prediction
//!
//! This library groups a user's raw GPS pings into stay locations with DBSCAN,
//! derives origin/destination trip records from them, and serves both the
//! clustering and a pre-trained next-location model over HTTP.

pub mod api;
pub mod cli;
pub mod dashboard;
pub mod data;
pub mod error;
pub mod geo;
pub mod model;
pub mod predictor;
pub mod viz;

// Re-export public items for easier access
pub use api::{create_router, AppState};
pub use cli::{Args, Command};
pub use data::{load_location_history, LocationHistory, LocationPing};
pub use error::ServiceError;
pub use model::{cluster_user, ClusterScores, ClusteringOutcome, StayCluster, TripRecord};
pub use predictor::{FeatureVector, ModelArtifact, NextLocationModel};
pub use viz::render_cluster_map;

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
