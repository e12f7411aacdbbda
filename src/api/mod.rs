//! HTTP surface for the admin security core.
//!
//! Flow Overview:
//! 1) `router` wires the handlers with the shared [`Security`] facade as an
//!    `Extension`, plus request-id and trace layers.
//! 2) `new` binds the listener, starts the limiter cleanup task and serves
//!    with `ConnectInfo` so handlers can fall back to the peer address.

use anyhow::Result;
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

use crate::security::Security;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

/// Build the application router around `security`.
#[must_use]
pub fn router(security: Arc<Security>) -> Router {
    Router::new()
        .route("/health", get(handlers::health).options(handlers::health))
        .route("/admin/login", post(handlers::admin::login))
        .route("/admin/profile", get(handlers::admin::profile))
        .route(
            "/admin/change-password",
            post(handlers::admin::change_password),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(security)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, security: Arc<Security>) -> Result<()> {
    let limiter = security.rate_limiter().clone();
    let cleanup = if limiter.config().enabled() {
        Some(limiter.spawn_cleanup(limiter.config().window()))
    } else {
        None
    };

    let app = router(security);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {err}");
        }
        info!("Gracefully shutdown");
    })
    .await?;

    if let Some(task) = cleanup {
        task.abort();
    }

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
