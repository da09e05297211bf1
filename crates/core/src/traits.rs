use crate::errors::ExchangeResult;
use crate::types::{
    Candle, LiveOrder, Market, MarketId, OrderRequest, SupplyMetric, Ticker, TradeFill,
    WalletSnapshot,
};
use async_trait::async_trait;

/// The full exchange surface the engine depends on. The production
/// implementation goes through the rate limiter and circuit breaker; tests
/// substitute an in-memory mock.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Lists every market the exchange currently offers.
    async fn list_markets(&self) -> ExchangeResult<Vec<Market>>;

    /// Reads the authoritative wallet balances.
    async fn wallet_balances(&self) -> ExchangeResult<WalletSnapshot>;

    async fn ticker(&self, market: &MarketId) -> ExchangeResult<Ticker>;

    async fn supply_metric(&self, market: &MarketId) -> ExchangeResult<SupplyMetric>;

    /// Hourly candles covering roughly the last `hours` hours.
    async fn candles(&self, market: &MarketId, hours: u32) -> ExchangeResult<Vec<Candle>>;

    /// Places a limit order and returns its exchange-assigned id.
    async fn place_order(&self, order: &OrderRequest) -> ExchangeResult<u64>;

    async fn cancel_order(&self, order_id: u64) -> ExchangeResult<()>;

    /// Cancels every open order owned by this account.
    async fn cancel_all_orders(&self) -> ExchangeResult<()>;

    /// Open orders, optionally filtered to one market.
    async fn open_orders(&self, market: Option<&MarketId>) -> ExchangeResult<Vec<LiveOrder>>;

    /// Most recent fills for this account, newest first.
    async fn recent_trades(&self, limit: u32) -> ExchangeResult<Vec<TradeFill>>;
}
