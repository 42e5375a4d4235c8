use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{classify::ServerErrorsFailureClass, cors::CorsLayer, trace::TraceLayer};
use tracing::Level;

use crate::api::handlers::*;
use crate::api::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(read_root))
        .route("/health", get(health_check))
        .route("/cluster", post(cluster_locations))
        .route("/predict", post(predict_next_location))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::span!(
                        Level::INFO,
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                })
                .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                    tracing::info!("request received: {} {}", request.method(), request.uri());
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::info!(
                            "response sent: status={} latency={:.2}ms",
                            response.status(),
                            latency.as_secs_f64() * 1000.0
                        );
                    },
                )
                .on_failure(
                    |error: ServerErrorsFailureClass,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::error!(
                            "request failed: {:?} latency={:.2}ms",
                            error,
                            latency.as_secs_f64() * 1000.0
                        );
                    },
                ),
        )
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Bind `addr` and serve until Ctrl-C
pub async fn run_server(state: AppState, addr: &str) -> crate::Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Starting HTTP server on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
