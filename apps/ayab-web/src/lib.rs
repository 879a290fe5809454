#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::Result;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::daemon_bridge::DaemonBridge;

pub mod adapter;
pub mod config;
pub mod daemon_bridge;

pub const SERVICE_NAME: &str = "ayab-web";
const ROUTE_HEALTHZ: &str = "/healthz";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub bridge: Arc<DaemonBridge>,
}

impl AppState {
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        let bridge = DaemonBridge::new(config.daemon_endpoint(), config.bridge_timeouts());
        Self {
            config: Arc::new(config),
            bridge: Arc::new(bridge),
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
    service: &'static str,
}

pub fn build_router(config: Config) -> Router {
    build_router_with_state(AppState::from_config(config))
}

/// Health is answered locally; every other path is a candidate for the daemon.
pub fn build_router_with_state(state: AppState) -> Router {
    Router::new()
        .route(ROUTE_HEALTHZ, get(healthz))
        .fallback(adapter::forward)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http()),
        )
}

pub async fn serve(config: Config) -> Result<()> {
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(
        service = SERVICE_NAME,
        bind_addr = %config.bind_addr,
        mount_path = %config.mount_path,
        daemon = %config.daemon_endpoint(),
        "ayab bridge listening"
    );
    axum::serve(listener, build_router(config)).await?;
    Ok(())
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        service: SERVICE_NAME,
    })
}
