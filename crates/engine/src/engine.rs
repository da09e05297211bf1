use crate::alerts::AlertManager;
use crate::allocator::CapitalAllocator;
use crate::metrics::Metrics;
use crate::price_model::PriceModel;
use crate::spread::SpreadCalculator;
use crate::worker::{self, Trigger};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ironmaker_core::{
    AlertCode, AppConfig, DesiredQuote, ExchangeClient, LiveOrder, Market, MarketId,
    WalletSnapshot,
};
use ironmaker_exchange::{
    endpoint_to_ws, BlockyClient, BlockyWebSocket, CircuitBreaker, DryRunExchange,
    ExchangeGateway, RequestLimiter,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::MissedTickBehavior;

/// Last published pipeline output for one market, exposed on the
/// monitoring API.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteSnapshot {
    pub market: MarketId,
    pub fair_price: f64,
    pub stale: bool,
    pub desired: DesiredQuote,
    pub live: Vec<LiveOrder>,
    pub updated_at: DateTime<Utc>,
}

/// Shared state handed to every worker and to the web API.
pub struct EngineContext {
    pub config: AppConfig,
    pub exchange: Arc<dyn ExchangeClient>,
    pub breaker: Arc<CircuitBreaker>,
    pub limiter: Arc<RequestLimiter>,
    pub price_model: PriceModel,
    pub spread: SpreadCalculator,
    pub allocator: CapitalAllocator,
    pub metrics: Metrics,
    pub alerts: AlertManager,
    pub markets: Vec<Market>,
    /// One authoritative wallet read per periodic cycle; workers only read.
    pub wallet: RwLock<WalletSnapshot>,
    pub quotes: RwLock<HashMap<MarketId, QuoteSnapshot>>,
    pub ws_connected: AtomicBool,
}

impl EngineContext {
    pub fn new(
        config: AppConfig,
        exchange: Arc<dyn ExchangeClient>,
        breaker: Arc<CircuitBreaker>,
        limiter: Arc<RequestLimiter>,
        markets: Vec<Market>,
    ) -> Self {
        let price_model = PriceModel::new(exchange.clone(), &config.price_model);
        let spread = SpreadCalculator::new(config.dynamic_spread.clone(), config.trading.spread);
        let allocator = CapitalAllocator::new(
            config.capital_allocation.clone(),
            config.trading.target_value,
        );
        let alerts = AlertManager::new(&config.alerts);

        Self {
            config,
            exchange,
            breaker,
            limiter,
            price_model,
            spread,
            allocator,
            metrics: Metrics::new(),
            alerts,
            markets,
            wallet: RwLock::new(WalletSnapshot::default()),
            quotes: RwLock::new(HashMap::new()),
            ws_connected: AtomicBool::new(false),
        }
    }

    /// Healthy means the breaker is not open and price data is flowing.
    pub fn is_healthy(&self) -> bool {
        self.breaker.state() != ironmaker_exchange::BreakerState::Open
            && self.price_model.is_healthy()
    }
}

/// Selects tradable markets: the enabled list (when non-empty) minus the
/// disabled list, restricted to markets with a configured base price, with
/// priority flags applied.
#[must_use]
pub fn filter_markets(all: Vec<Market>, config: &AppConfig) -> Vec<Market> {
    let trading = &config.trading;
    all.into_iter()
        .filter(|m| {
            trading.enabled_markets.is_empty()
                || trading.enabled_markets.contains(&m.id.to_string())
        })
        .filter(|m| !trading.disabled_markets.contains(&m.id.to_string()))
        .filter(|m| {
            let priced = config.price_model.base_prices.contains_key(m.id.as_str());
            if !priced {
                tracing::debug!(market = %m.id, "skipping market without a base price");
            }
            priced
        })
        .map(|mut m| {
            m.priority = config
                .capital_allocation
                .priority_markets
                .contains(&m.id.to_string());
            m
        })
        .collect()
}

/// Orchestrates the whole system: per-market workers, the periodic
/// reconciliation tick, the WebSocket event feed, wallet and fill polling,
/// and ordered shutdown.
pub struct Engine {
    ctx: Arc<EngineContext>,
}

impl Engine {
    /// Builds the production stack: REST client behind the gateway
    /// (breaker + limiter), dry-run wrapper when configured, and the
    /// filtered market set.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built, the market
    /// list cannot be fetched, or no tradable market remains.
    pub async fn connect(config: AppConfig) -> Result<Self> {
        let breaker = Arc::new(CircuitBreaker::new(&config.circuit_breaker));
        let limiter = Arc::new(RequestLimiter::new(&config.rate_limit));

        let client = BlockyClient::new(&config.api)?;
        let gateway = ExchangeGateway::new(client, limiter.clone(), breaker.clone());
        let exchange: Arc<dyn ExchangeClient> = if config.trading.dry_run {
            tracing::info!("dry-run mode: orders will be logged, not placed");
            Arc::new(DryRunExchange::new(gateway))
        } else {
            Arc::new(gateway)
        };

        let all = exchange.list_markets().await.context("listing markets")?;
        let markets = filter_markets(all, &config);
        anyhow::ensure!(!markets.is_empty(), "no tradable markets after filtering");
        tracing::info!(count = markets.len(), "markets selected");

        Ok(Self {
            ctx: Arc::new(EngineContext::new(
                config, exchange, breaker, limiter, markets,
            )),
        })
    }

    #[must_use]
    pub fn context(&self) -> Arc<EngineContext> {
        self.ctx.clone()
    }

    /// Runs until the shutdown signal flips to `true`.
    ///
    /// # Errors
    /// Returns an error if startup cleanup fails; runtime failures are
    /// retried on later cycles instead of aborting.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let ctx = self.ctx.clone();
        ctx.alerts.info(
            AlertCode::Startup,
            format!("engine starting with {} markets", ctx.markets.len()),
        );

        // start from a clean book so the reconciler owns every order
        ctx.exchange
            .cancel_all_orders()
            .await
            .context("cancelling stale orders at startup")?;

        for market in &ctx.markets {
            let hours = ctx.config.dynamic_spread.volatility_window;
            match ctx.exchange.candles(&market.id, hours).await {
                Ok(candles) => ctx.spread.seed_candles(&market.id, &candles),
                Err(err) => {
                    tracing::warn!(market = %market.id, error = %err, "volatility seed failed");
                }
            }
        }

        Self::refresh_wallet(&ctx).await;

        let mut triggers: HashMap<MarketId, mpsc::Sender<Trigger>> = HashMap::new();
        let mut handles = Vec::new();
        for market in ctx.markets.clone() {
            let (tx, handle) = worker::spawn(market.clone(), ctx.clone());
            triggers.insert(market.id, tx);
            handles.push(handle);
        }

        let ws_handle = tokio::spawn(Self::websocket_task(ctx.clone(), triggers.clone()));

        let mut interval = tokio::time::interval(Duration::from_secs(
            ctx.config.trading.refresh_interval.max(1),
        ));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_trade_id: Option<u64> = None;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    Self::refresh_wallet(&ctx).await;
                    Self::poll_fills(&ctx, &mut last_trade_id).await;
                    for (market, tx) in &triggers {
                        if tx.try_send(Trigger::Periodic).is_err() {
                            tracing::debug!(%market, "worker busy, periodic trigger coalesced");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("shutting down");
        ws_handle.abort();
        drop(triggers);
        for handle in handles {
            if tokio::time::timeout(Duration::from_secs(10), handle)
                .await
                .is_err()
            {
                tracing::warn!("worker did not stop within timeout");
            }
        }

        if let Err(err) = ctx.exchange.cancel_all_orders().await {
            tracing::error!("failed to cancel open orders on shutdown: {err}");
        }

        let snapshot = ctx.metrics.snapshot();
        tracing::info!(
            orders_placed = snapshot.orders_placed,
            orders_cancelled = snapshot.orders_cancelled,
            total_trades = snapshot.total_trades,
            realized_pnl = snapshot.realized_pnl,
            "final metrics"
        );
        ctx.alerts.info(AlertCode::Shutdown, "engine stopped");
        Ok(())
    }

    async fn refresh_wallet(ctx: &Arc<EngineContext>) {
        match ctx.exchange.wallet_balances().await {
            Ok(snapshot) => {
                *ctx.wallet.write().await = snapshot;
            }
            Err(err) => {
                // keep the previous snapshot; workers tolerate a stale wallet
                tracing::warn!("wallet refresh failed: {err}");
            }
        }
    }

    /// Polls recent fills and records new ones for P&L. The first poll
    /// only establishes the baseline so historical trades are not
    /// re-counted across restarts.
    async fn poll_fills(ctx: &EngineContext, last_trade_id: &mut Option<u64>) {
        let fills = match ctx.exchange.recent_trades(50).await {
            Ok(fills) => fills,
            Err(err) => {
                tracing::warn!("fill poll failed: {err}");
                return;
            }
        };
        let max_id = fills.iter().map(|f| f.trade_id).max();

        match *last_trade_id {
            None => *last_trade_id = Some(max_id.unwrap_or(0)),
            Some(seen) => {
                // newest first on the wire; record oldest first
                for fill in fills.iter().filter(|f| f.trade_id > seen).rev() {
                    tracing::info!(
                        market = %fill.market,
                        side = %fill.side,
                        price = fill.price,
                        quantity = fill.quantity,
                        "fill"
                    );
                    ctx.metrics.record_fill(fill);
                }
                if let Some(max_id) = max_id {
                    *last_trade_id = Some(seen.max(max_id));
                }
            }
        }
    }

    async fn websocket_task(
        ctx: Arc<EngineContext>,
        triggers: HashMap<MarketId, mpsc::Sender<Trigger>>,
    ) {
        let mut ws = BlockyWebSocket::new(endpoint_to_ws(&ctx.config.api.endpoint));
        loop {
            if let Err(err) = ws.connect().await {
                ctx.ws_connected.store(false, Ordering::Relaxed);
                tracing::warn!("WebSocket unavailable: {err}, retrying in 30s");
                tokio::time::sleep(Duration::from_secs(30)).await;
                continue;
            }

            let mut subscribed = true;
            for market in triggers.keys() {
                if let Err(err) = ws.subscribe_market(market).await {
                    tracing::warn!(%market, "subscribe failed: {err}");
                    subscribed = false;
                    break;
                }
            }
            if !subscribed {
                continue;
            }
            ctx.ws_connected.store(true, Ordering::Relaxed);

            loop {
                match ws.next_event().await {
                    Ok(Some(event)) => {
                        if let Some(tx) = triggers.get(event.market()) {
                            // full channel means a rerun is already pending
                            let _ = tx.try_send(Trigger::Event);
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        tracing::warn!("WebSocket stream error: {err}");
                        break;
                    }
                }
            }
            ctx.ws_connected.store(false, Ordering::Relaxed);
        }
    }
}
