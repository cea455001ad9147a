//! Control API
//!
//! A thin HTTP surface over the daemon, the result store and the proxy pool.

mod response;
mod routes;

pub use response::{ApiError, ApiResponse, ApiResult, Code};
pub use routes::{create_router, GoodsParams, ProxyView, StartRequest};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::WebConfig;
use crate::crawler::Daemon;
use crate::proxy::ProxyPool;
use crate::store::ProductStore;
use crate::CirrusError;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub daemon: Daemon,
    pub store: Arc<dyn ProductStore>,
    pub proxies: Option<Arc<ProxyPool>>,
}

/// Builds the router with request tracing
pub fn build_router(state: AppState) -> Router {
    create_router(state).layer(TraceLayer::new_for_http())
}

/// Serves the control API until `shutdown` fires
///
/// # Arguments
///
/// * `web` - Binding address and port
/// * `state` - Handler state
/// * `shutdown` - Lifetime token
pub async fn serve(
    web: &WebConfig,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), CirrusError> {
    let addr: SocketAddr = format!("{}:{}", web.binding, web.port)
        .parse()
        .map_err(|e| {
            crate::ConfigError::Validation(format!(
                "Invalid web binding '{}:{}': {}",
                web.binding, web.port, e
            ))
        })?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Control API listening on {}", addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Control API shutdown complete");
    Ok(())
}
