//! Control API routes and handlers

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::response::{ApiError, ApiResponse, ApiResult};
use super::AppState;
use crate::crawler::TaskView;
use crate::proxy::{Balance, Endpoint};
use crate::store::{ProductPage, ProductQuery};

/// Body of the start action
#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub root: String,
}

/// Query string of the goods listing
#[derive(Debug, Default, Deserialize)]
pub struct GoodsParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
    /// RFC 3339 lower bound
    pub start: Option<DateTime<Utc>>,
    /// RFC 3339 upper bound
    pub end: Option<DateTime<Utc>>,
}

impl From<GoodsParams> for ProductQuery {
    fn from(params: GoodsParams) -> Self {
        let defaults = ProductQuery::default();
        Self {
            page: params.page.unwrap_or(defaults.page),
            size: params.size.unwrap_or(defaults.size),
            start: params.start,
            end: params.end,
        }
    }
}

/// Snapshot of the proxy pool
#[derive(Debug, Serialize)]
pub struct ProxyView {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub refill_halted: bool,
    pub deficit: usize,
    pub endpoints: Vec<Endpoint>,
    /// Absent when the pool is disabled or the provider could not be reached
    pub balance: Option<Balance>,
}

impl ProxyView {
    fn disabled() -> Self {
        Self {
            enabled: false,
            provider: None,
            refill_halted: false,
            deficit: 0,
            endpoints: Vec::new(),
            balance: None,
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Task endpoints
        .route("/api/v1/task", get(get_task))
        .route("/api/v1/task/action/start", post(start_task))
        .route("/api/v1/task/action/pause", post(pause_task))
        .route("/api/v1/task/action/resume", post(resume_task))
        // Result endpoints
        .route("/api/v1/goods", get(list_goods))
        // Proxy endpoints
        .route("/api/v1/proxy", get(get_proxy))
        .route("/api/v1/proxy/action/resume", post(resume_proxy_refill))
        .with_state(state)
}

async fn get_task(State(state): State<AppState>) -> ApiResult<TaskView> {
    Ok(ApiResponse::ok(state.daemon.view().await))
}

async fn start_task(
    State(state): State<AppState>,
    request: Result<Json<StartRequest>, JsonRejection>,
) -> ApiResult<TaskView> {
    let Json(request) = request.map_err(|e| ApiError::bad_request(e.body_text()))?;
    state.daemon.start(&request.root).await?;
    Ok(ApiResponse::accepted(state.daemon.view().await))
}

async fn pause_task(State(state): State<AppState>) -> ApiResult<TaskView> {
    state.daemon.pause()?;
    Ok(ApiResponse::accepted(state.daemon.view().await))
}

async fn resume_task(State(state): State<AppState>) -> ApiResult<TaskView> {
    state.daemon.resume()?;
    Ok(ApiResponse::accepted(state.daemon.view().await))
}

async fn list_goods(
    State(state): State<AppState>,
    params: Result<Query<GoodsParams>, QueryRejection>,
) -> ApiResult<ProductPage> {
    let Query(params) = params.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let query = ProductQuery::from(params);
    query.validate()?;

    let page = state.store.query(&query)?;
    Ok(ApiResponse::ok(page))
}

async fn get_proxy(State(state): State<AppState>) -> ApiResult<ProxyView> {
    let pool = match &state.proxies {
        Some(pool) => pool,
        None => return Ok(ApiResponse::ok(ProxyView::disabled())),
    };

    let balance = match pool.balance().await {
        Ok(balance) => Some(balance),
        Err(e) => {
            tracing::warn!("Balance query failed: {}", e);
            None
        }
    };

    Ok(ApiResponse::ok(ProxyView {
        enabled: true,
        provider: Some(pool.provider_name().to_string()),
        refill_halted: pool.is_refill_halted(),
        deficit: pool.deficit(),
        endpoints: pool.endpoints().await,
        balance,
    }))
}

async fn resume_proxy_refill(State(state): State<AppState>) -> ApiResult<bool> {
    match &state.proxies {
        Some(pool) => {
            let was_halted = pool.is_refill_halted();
            pool.resume_refill();
            Ok(ApiResponse::accepted(was_halted))
        }
        None => Err(ApiError::conflict("proxy pool is disabled")),
    }
}
