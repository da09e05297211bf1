use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use ironmaker_engine::{EngineContext, MetricsSnapshot, QuoteSnapshot};
use ironmaker_exchange::{BreakerSnapshot, LimiterStats};
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub dry_run: bool,
    pub markets: usize,
    pub ws_connected: bool,
    pub circuit_breaker: BreakerSnapshot,
    pub wallet_fetched_at: DateTime<Utc>,
    #[serde(flatten)]
    pub metrics: MetricsSnapshot,
}

/// Liveness and readiness combined. Returns 503 while the circuit
/// breaker is open or price data has stopped flowing, so a supervisor
/// can restart the process.
pub async fn health(
    State(ctx): State<Arc<EngineContext>>,
) -> (StatusCode, Json<HealthResponse>) {
    let healthy = ctx.is_healthy();
    let response = HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        dry_run: ctx.config.trading.dry_run,
        markets: ctx.markets.len(),
        ws_connected: ctx.ws_connected.load(Ordering::Relaxed),
        circuit_breaker: ctx.breaker.snapshot(),
        wallet_fetched_at: ctx.wallet.read().await.fetched_at,
        metrics: ctx.metrics.snapshot(),
    };
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(response))
}

#[derive(Serialize)]
pub struct QuotesResponse {
    pub quotes: Vec<QuoteSnapshot>,
}

/// Last published quote per market, sorted for stable output.
pub async fn quotes(State(ctx): State<Arc<EngineContext>>) -> Json<QuotesResponse> {
    let mut quotes: Vec<QuoteSnapshot> = ctx.quotes.read().await.values().cloned().collect();
    quotes.sort_by(|a, b| a.market.as_str().cmp(b.market.as_str()));
    Json(QuotesResponse { quotes })
}

#[derive(Serialize)]
pub struct MetricsResponse {
    #[serde(flatten)]
    pub metrics: MetricsSnapshot,
    pub rate_limiter: LimiterStats,
}

pub async fn metrics(State(ctx): State<Arc<EngineContext>>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        metrics: ctx.metrics.snapshot(),
        rate_limiter: ctx.limiter.stats(),
    })
}
