//! GeoLife: entrypoint for the clustering/prediction service and its dashboard
//!
//! `serve` loads the dataset and model once and answers HTTP requests;
//! `dashboard` submits one clustering request and renders the result.

use anyhow::Result;
use clap::Parser;
use geolife::cli::{Args, Command, ServeArgs};
use geolife::{api, dashboard, AppState};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Parse command-line arguments
    let args = Args::parse();
    init_tracing(args.verbose);

    match &args.command {
        Command::Serve(serve) => run_service(serve).await,
        Command::Dashboard(dash) => dashboard::run_dashboard(dash).await,
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Load the immutable state, then serve until shutdown
async fn run_service(args: &ServeArgs) -> Result<()> {
    tracing::info!("Starting GeoLife next location prediction service...");

    let start_time = Instant::now();
    let state = AppState::load(&args.dataset, &args.model)?;
    tracing::info!(
        "Startup data loaded in {:.2}s",
        start_time.elapsed().as_secs_f64()
    );

    api::run_server(state, &args.bind_address()).await
}
