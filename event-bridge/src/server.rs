//! Liveness and metrics HTTP surface.

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;

pub async fn index() -> &'static str {
    "event bridge"
}

pub fn router(recorder_handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(|| std::future::ready("ok")))
        .route(
            "/metrics",
            get(move || std::future::ready(recorder_handle.render())),
        )
}

/// Bind a `TcpListener` on the provided bind address to serve a `Router` on it.
pub async fn serve(router: Router, bind: &str) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, router).await?;

    Ok(())
}
