use crate::circuit_breaker::CircuitBreaker;
use crate::rate_limiter::RequestLimiter;
use async_trait::async_trait;
use ironmaker_core::{
    Candle, ExchangeClient, ExchangeResult, LiveOrder, Market, MarketId, OrderRequest,
    SupplyMetric, Ticker, TradeFill, WalletSnapshot,
};
use std::future::Future;
use std::sync::Arc;

/// Wraps a raw exchange client with the shared circuit breaker and rate
/// limiter. Order of operations per call: breaker admission first (fail
/// fast while open), then rate-limit back-pressure, then the request.
pub struct ExchangeGateway<C> {
    client: C,
    limiter: Arc<RequestLimiter>,
    breaker: Arc<CircuitBreaker>,
}

impl<C: ExchangeClient> ExchangeGateway<C> {
    pub fn new(client: C, limiter: Arc<RequestLimiter>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            client,
            limiter,
            breaker,
        }
    }

    async fn guarded<T, F>(&self, fut: F) -> ExchangeResult<T>
    where
        F: Future<Output = ExchangeResult<T>> + Send,
    {
        self.breaker.try_acquire()?;
        self.limiter.acquire().await;

        match fut.await {
            Ok(value) => {
                self.breaker.record_success();
                Ok(value)
            }
            Err(err) => {
                // A business rejection proves the exchange is reachable.
                if err.is_transport() {
                    self.breaker.record_failure();
                } else {
                    self.breaker.record_success();
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl<C: ExchangeClient> ExchangeClient for ExchangeGateway<C> {
    async fn list_markets(&self) -> ExchangeResult<Vec<Market>> {
        self.guarded(self.client.list_markets()).await
    }

    async fn wallet_balances(&self) -> ExchangeResult<WalletSnapshot> {
        self.guarded(self.client.wallet_balances()).await
    }

    async fn ticker(&self, market: &MarketId) -> ExchangeResult<Ticker> {
        self.guarded(self.client.ticker(market)).await
    }

    async fn supply_metric(&self, market: &MarketId) -> ExchangeResult<SupplyMetric> {
        self.guarded(self.client.supply_metric(market)).await
    }

    async fn candles(&self, market: &MarketId, hours: u32) -> ExchangeResult<Vec<Candle>> {
        self.guarded(self.client.candles(market, hours)).await
    }

    async fn place_order(&self, order: &OrderRequest) -> ExchangeResult<u64> {
        self.guarded(self.client.place_order(order)).await
    }

    async fn cancel_order(&self, order_id: u64) -> ExchangeResult<()> {
        self.guarded(self.client.cancel_order(order_id)).await
    }

    async fn cancel_all_orders(&self) -> ExchangeResult<()> {
        self.guarded(self.client.cancel_all_orders()).await
    }

    async fn open_orders(&self, market: Option<&MarketId>) -> ExchangeResult<Vec<LiveOrder>> {
        self.guarded(self.client.open_orders(market)).await
    }

    async fn recent_trades(&self, limit: u32) -> ExchangeResult<Vec<TradeFill>> {
        self.guarded(self.client.recent_trades(limit)).await
    }
}
