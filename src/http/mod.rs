//! HTTP binding of the upload coordinator's control plane.

use std::future::Future;
use std::net::{SocketAddr, TcpListener};

use axum::http::header::{self, HeaderValue};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::{self, TraceLayer};

mod errors;
pub use errors::{Error, Result};

mod videos;

use crate::coordinator::UploadCoordinator;

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({}))
}

/// Returns an [`axum::Router`] serving the control plane under `/video`.
pub fn router(coordinator: UploadCoordinator) -> Router {
    Router::new()
        .route("/", get(version))
        .nest("/video", videos::router())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().include_headers(true))
                .on_response(trace::DefaultOnResponse::new())
                .on_request(trace::DefaultOnRequest::new()),
        )
        // presigned URLs must never be served from a cache
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(coordinator)
}

/// Binds `listen_address` and serves until `shutdown` resolves.
pub async fn serve(
    listen_address: &str,
    coordinator: UploadCoordinator,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let address: SocketAddr = listen_address.parse()?;
    let listener = TcpListener::bind(address).map_err(crate::Error::from)?;
    serve_on(listener, coordinator, shutdown).await
}

pub async fn serve_on(
    listener: TcpListener,
    coordinator: UploadCoordinator,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let address = listener.local_addr().map_err(crate::Error::from)?;
    tracing::info!(%address, "listening");
    axum::Server::from_tcp(listener)?
        .serve(router(coordinator).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("server stopped");
    Ok(())
}
