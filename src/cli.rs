//! Command-line interface definitions and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stay-location clustering and next-location prediction for GeoLife traces
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the clustering and prediction HTTP service
    Serve(ServeArgs),
    /// Query the service and render clusters as a table and a map
    Dashboard(DashboardArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// CSV of GPS pings with uid, lat, lng and datetime columns
    #[arg(long, env = "GEOLIFE_DATASET", default_value = "data/geolife.csv")]
    pub dataset: PathBuf,

    /// JSON model artifact
    #[arg(long, env = "GEOLIFE_MODEL", default_value = "data/model.json")]
    pub model: PathBuf,

    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to run the HTTP server on
    #[arg(short, long, env = "PORT", default_value = "8000")]
    pub port: u16,
}

impl ServeArgs {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct DashboardArgs {
    /// Base URL of the clustering service
    #[arg(long, env = "BACKEND_URL", default_value = "http://127.0.0.1:8000")]
    pub backend_url: String,

    /// User ID to cluster
    #[arg(short, long, default_value = "000")]
    pub uid: String,

    /// Max distance between two points (in km)
    #[arg(short, long, default_value = "0.2")]
    pub distance: f64,

    /// Min. number of observations per stay location
    #[arg(short = 'k', long, default_value = "1")]
    pub min_k: usize,

    /// Output path for the SVG map
    #[arg(short, long, default_value = "cluster_map.svg")]
    pub output: PathBuf,
}
