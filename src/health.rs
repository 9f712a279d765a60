//! Liveness endpoint on a background task.

use axum::{Router, routing::get};
use tracing::{info, warn};

/// Serve `GET /` as a plaintext liveness probe. Failures are logged; the bot
/// keeps running without the endpoint.
pub async fn serve(port: u16) {
    let app = Router::new().route("/", get(|| async { "saathi is alive" }));
    let addr = format!("0.0.0.0:{port}");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!("Failed to bind health endpoint on {addr}: {e}");
            return;
        }
    };

    info!("Health endpoint listening on {addr}");
    if let Err(e) = axum::serve(listener, app).await {
        warn!("Health endpoint stopped: {e}");
    }
}
