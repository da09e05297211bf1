use crate::engine::EngineContext;
use async_trait::async_trait;
use chrono::Utc;
use ironmaker_core::{
    AppConfig, Candle, ExchangeClient, ExchangeError, ExchangeResult, LiveOrder, Market, MarketId,
    OrderRequest, SupplyMetric, Ticker, TradeFill, WalletSnapshot,
};
use ironmaker_exchange::{CircuitBreaker, RequestLimiter};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// In-memory exchange for pipeline tests. Orders placed against it show
/// up in subsequent `open_orders` calls, so reconciliation can be driven
/// through several cycles.
pub struct MockExchange {
    markets: Mutex<Vec<Market>>,
    wallet: Mutex<WalletSnapshot>,
    tickers: Mutex<HashMap<MarketId, Ticker>>,
    supplies: Mutex<HashMap<MarketId, SupplyMetric>>,
    candles: Mutex<HashMap<MarketId, Vec<Candle>>>,
    orders: Mutex<Vec<LiveOrder>>,
    fills: Mutex<Vec<TradeFill>>,
    next_order_id: AtomicU64,
    supply_call_count: AtomicU32,
    supply_failing: AtomicBool,
    place_error_code: Mutex<Option<i64>>,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            markets: Mutex::new(Vec::new()),
            wallet: Mutex::new(WalletSnapshot::default()),
            tickers: Mutex::new(HashMap::new()),
            supplies: Mutex::new(HashMap::new()),
            candles: Mutex::new(HashMap::new()),
            orders: Mutex::new(Vec::new()),
            fills: Mutex::new(Vec::new()),
            next_order_id: AtomicU64::new(1),
            supply_call_count: AtomicU32::new(0),
            supply_failing: AtomicBool::new(false),
            place_error_code: Mutex::new(None),
        }
    }

    pub fn set_supply(&self, market: &MarketId, total: f64, remaining: f64) {
        lock(&self.supplies).insert(market.clone(), SupplyMetric { total, remaining });
    }

    pub fn fail_supply(&self, failing: bool) {
        self.supply_failing.store(failing, Ordering::SeqCst);
    }

    pub fn supply_calls(&self) -> u32 {
        self.supply_call_count.load(Ordering::SeqCst)
    }

    pub fn set_place_error(&self, code: Option<i64>) {
        *lock(&self.place_error_code) = code;
    }

    pub fn push_order(&self, order: LiveOrder) {
        lock(&self.orders).push(order);
    }

    pub fn push_fill(&self, fill: TradeFill) {
        lock(&self.fills).push(fill);
    }

    pub fn orders(&self) -> Vec<LiveOrder> {
        lock(&self.orders).clone()
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn list_markets(&self) -> ExchangeResult<Vec<Market>> {
        Ok(lock(&self.markets).clone())
    }

    async fn wallet_balances(&self) -> ExchangeResult<WalletSnapshot> {
        Ok(lock(&self.wallet).clone())
    }

    async fn ticker(&self, market: &MarketId) -> ExchangeResult<Ticker> {
        Ok(lock(&self.tickers).get(market).cloned().unwrap_or_default())
    }

    async fn supply_metric(&self, market: &MarketId) -> ExchangeResult<SupplyMetric> {
        self.supply_call_count.fetch_add(1, Ordering::SeqCst);
        if self.supply_failing.load(Ordering::SeqCst) {
            return Err(ExchangeError::Transport("supply metrics down".into()));
        }
        lock(&self.supplies)
            .get(market)
            .copied()
            .ok_or_else(|| ExchangeError::Stale(format!("no supply for {market}")))
    }

    async fn candles(&self, market: &MarketId, _hours: u32) -> ExchangeResult<Vec<Candle>> {
        Ok(lock(&self.candles).get(market).cloned().unwrap_or_default())
    }

    async fn place_order(&self, order: &OrderRequest) -> ExchangeResult<u64> {
        if let Some(code) = *lock(&self.place_error_code) {
            return Err(ExchangeError::Business {
                code,
                message: "rejected".into(),
            });
        }
        let order_id = self.next_order_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.orders).push(LiveOrder {
            market: order.market.clone(),
            side: order.side,
            price: order.price,
            quantity: order.quantity,
            order_id,
        });
        Ok(order_id)
    }

    async fn cancel_order(&self, order_id: u64) -> ExchangeResult<()> {
        let mut orders = lock(&self.orders);
        let before = orders.len();
        orders.retain(|o| o.order_id != order_id);
        if orders.len() == before {
            return Err(ExchangeError::Business {
                code: ironmaker_core::CODE_ORDER_NOT_OPEN,
                message: "order is not open".into(),
            });
        }
        Ok(())
    }

    async fn cancel_all_orders(&self) -> ExchangeResult<()> {
        lock(&self.orders).clear();
        Ok(())
    }

    async fn open_orders(&self, market: Option<&MarketId>) -> ExchangeResult<Vec<LiveOrder>> {
        Ok(lock(&self.orders)
            .iter()
            .filter(|o| market.map_or(true, |m| o.market == *m))
            .cloned()
            .collect())
    }

    async fn recent_trades(&self, limit: u32) -> ExchangeResult<Vec<TradeFill>> {
        let fills = lock(&self.fills);
        Ok(fills.iter().rev().take(limit as usize).cloned().collect())
    }
}

/// Builds an `EngineContext` over the mock with default config and the
/// given tradable markets.
pub fn context_with(mock: Arc<MockExchange>, market_names: &[&str]) -> Arc<EngineContext> {
    let mut config = AppConfig::default();
    config.trading.dry_run = true;
    config.alerts.webhook_url = None;

    let markets: Vec<Market> = market_names
        .iter()
        .map(|name| Market::new(MarketId::new(*name)))
        .collect();
    let breaker = Arc::new(CircuitBreaker::new(&config.circuit_breaker));
    let limiter = Arc::new(RequestLimiter::new(&config.rate_limit));

    Arc::new(EngineContext::new(config, mock, breaker, limiter, markets))
}

/// Wallet snapshot literal for tests.
pub fn wallet(balances: &[(&str, f64)]) -> WalletSnapshot {
    WalletSnapshot {
        balances: balances
            .iter()
            .map(|(name, amount)| ((*name).to_string(), *amount))
            .collect(),
        fetched_at: Utc::now(),
    }
}
