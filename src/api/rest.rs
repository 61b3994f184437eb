// =============================================================================
// REST API Endpoints (Axum 0.7)
// =============================================================================
//
// All endpoints live under `/api/v1/`. CORS is configured permissively for
// the browser front end.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::aggregation::calendar::{metric_series, MonthCursor};
use crate::app_state::{select_symbol, AppState};
use crate::export::buckets_to_csv;
use crate::types::{Metric, Timeframe};

type ApiError = (StatusCode, Json<serde_json::Value>);

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/calendar", get(calendar))
        .route("/api/v1/chart", get(chart))
        .route("/api/v1/detail", get(detail))
        .route("/api/v1/indicators", get(indicators))
        .route("/api/v1/orderbook", get(orderbook))
        .route("/api/v1/export.csv", get(export_csv))
        .route("/api/v1/symbols", get(symbols))
        .route("/api/v1/symbol", post(set_symbol))
        .route("/api/v1/range", post(set_range))
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

fn api_error(status: StatusCode, message: String) -> ApiError {
    (status, Json(serde_json::json!({ "error": message })))
}

fn bad_request(message: String) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, message)
}

/// Resolve an optional `timeframe` query value, falling back to the config.
fn resolve_timeframe(state: &AppState, raw: Option<&str>) -> Result<Timeframe, ApiError> {
    match raw {
        Some(s) => s.parse().map_err(|e: anyhow::Error| bad_request(e.to_string())),
        None => Ok(state.config.read().default_timeframe),
    }
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    symbol: String,
    streaming: Option<String>,
    candles: usize,
    state_version: u64,
    uptime_secs: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        symbol: state.selection().symbol,
        streaming: state.streaming_symbol(),
        candles: state.candle_count(),
        state_version: state.current_state_version(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

// =============================================================================
// Calendar
// =============================================================================

#[derive(Deserialize)]
struct CalendarQuery {
    timeframe: Option<String>,
    year: Option<i32>,
    month: Option<u32>,
}

async fn calendar(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CalendarQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let timeframe = resolve_timeframe(&state, query.timeframe.as_deref())?;

    let month = match (query.year, query.month) {
        (Some(year), Some(month)) => Some(
            MonthCursor::new(year, month)
                .ok_or_else(|| bad_request(format!("invalid month: {month}")))?,
        ),
        (None, None) => None,
        _ => return Err(bad_request("year and month must be given together".into())),
    };

    let cells = state.calendar(timeframe, month);
    Ok(Json(serde_json::json!({
        "symbol": state.selection().symbol,
        "timeframe": timeframe,
        "month": month.map(|m| m.to_string()),
        "prev": month.map(|m| m.prev().to_string()),
        "next": month.map(|m| m.next().to_string()),
        "cells": cells,
    })))
}

// =============================================================================
// Chart series
// =============================================================================

#[derive(Deserialize)]
struct ChartQuery {
    timeframe: Option<String>,
    metric: Option<String>,
}

async fn chart(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChartQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let timeframe = resolve_timeframe(&state, query.timeframe.as_deref())?;
    let metric = match query.metric.as_deref() {
        Some(s) => s
            .parse::<Metric>()
            .map_err(|e| bad_request(e.to_string()))?,
        None => Metric::default(),
    };

    let points = metric_series(&state.buckets(timeframe), metric);
    Ok(Json(serde_json::json!({
        "timeframe": timeframe,
        "metric": metric,
        "points": points,
    })))
}

// =============================================================================
// Detail / indicators / order book
// =============================================================================

#[derive(Deserialize)]
struct DetailQuery {
    time: i64,
    timeframe: Option<String>,
}

/// Selected cell, indicator snapshot and order book in one payload.
async fn detail(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DetailQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let timeframe = resolve_timeframe(&state, query.timeframe.as_deref())?;
    state.detail(query.time, timeframe).map(Json).ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            format!("no {timeframe} bucket contains time {}", query.time),
        )
    })
}

async fn indicators(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.indicator_view())
}

async fn orderbook(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.order_book_view())
}

// =============================================================================
// Export
// =============================================================================

#[derive(Deserialize)]
struct ExportQuery {
    timeframe: Option<String>,
}

async fn export_csv(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let timeframe = resolve_timeframe(&state, query.timeframe.as_deref())?;
    let body = buckets_to_csv(&state.buckets(timeframe)).map_err(|e| {
        error!(error = %e, "CSV export failed");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("export failed: {e}"))
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"market-data.csv\"",
            ),
        ],
        body,
    ))
}

// =============================================================================
// Symbol selection
// =============================================================================

async fn symbols(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "selected": state.selection().symbol,
        "symbols": state.config.read().symbols.clone(),
    }))
}

#[derive(Deserialize)]
struct SymbolRequest {
    symbol: String,
}

/// Exchange symbols are short upper-case alphanumerics (e.g. BTCUSDT).
fn validate_symbol(raw: &str) -> Option<String> {
    let sym = raw.trim().to_uppercase();
    let ok = (2..=20).contains(&sym.len()) && sym.chars().all(|c| c.is_ascii_alphanumeric());
    ok.then_some(sym)
}

async fn set_symbol(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SymbolRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let symbol = validate_symbol(&req.symbol)
        .ok_or_else(|| bad_request(format!("invalid symbol: '{}'", req.symbol)))?;
    if !state.config.read().offers(&symbol) {
        return Err(bad_request(format!("symbol not offered: {symbol}")));
    }

    info!(symbol = %symbol, "symbol switch requested via API");
    select_symbol(&state, &symbol).await;

    Ok(Json(serde_json::json!({
        "symbol": symbol,
        "candles": state.candle_count(),
    })))
}

// =============================================================================
// Range selection
// =============================================================================

#[derive(Deserialize)]
struct RangeRequest {
    #[serde(default)]
    time: Option<i64>,
    #[serde(default)]
    clear: bool,
}

async fn set_range(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RangeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let range = {
        let mut range = state.range.write();
        match (req.clear, req.time) {
            (true, _) => range.clear(),
            (false, Some(t)) => range.select(t),
            (false, None) => return Err(bad_request("either time or clear is required".into())),
        }
        *range
    };
    state.increment_version();
    Ok(Json(range))
}
