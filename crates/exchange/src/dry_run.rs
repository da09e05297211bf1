use async_trait::async_trait;
use ironmaker_core::{
    Candle, ExchangeClient, ExchangeResult, LiveOrder, Market, MarketId, OrderRequest,
    SupplyMetric, Ticker, TradeFill, WalletSnapshot,
};
use std::sync::atomic::{AtomicU64, Ordering};

/// Exchange wrapper that reads real market data but only logs mutations.
/// Placements return synthetic ids so the reconciler's bookkeeping still
/// works; nothing ever reaches the exchange's order endpoints.
pub struct DryRunExchange<C> {
    inner: C,
    next_order_id: AtomicU64,
}

impl<C: ExchangeClient> DryRunExchange<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            // high base so synthetic ids never collide with real ones
            next_order_id: AtomicU64::new(1_000_000_000_000),
        }
    }
}

#[async_trait]
impl<C: ExchangeClient> ExchangeClient for DryRunExchange<C> {
    async fn list_markets(&self) -> ExchangeResult<Vec<Market>> {
        self.inner.list_markets().await
    }

    async fn wallet_balances(&self) -> ExchangeResult<WalletSnapshot> {
        self.inner.wallet_balances().await
    }

    async fn ticker(&self, market: &MarketId) -> ExchangeResult<Ticker> {
        self.inner.ticker(market).await
    }

    async fn supply_metric(&self, market: &MarketId) -> ExchangeResult<SupplyMetric> {
        self.inner.supply_metric(market).await
    }

    async fn candles(&self, market: &MarketId, hours: u32) -> ExchangeResult<Vec<Candle>> {
        self.inner.candles(market, hours).await
    }

    async fn place_order(&self, order: &OrderRequest) -> ExchangeResult<u64> {
        let id = self.next_order_id.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            market = %order.market,
            side = %order.side,
            price = order.price,
            quantity = order.quantity,
            order_id = id,
            "[dry-run] place order"
        );
        Ok(id)
    }

    async fn cancel_order(&self, order_id: u64) -> ExchangeResult<()> {
        tracing::info!(order_id, "[dry-run] cancel order");
        Ok(())
    }

    async fn cancel_all_orders(&self) -> ExchangeResult<()> {
        tracing::info!("[dry-run] cancel all orders");
        Ok(())
    }

    async fn open_orders(&self, market: Option<&MarketId>) -> ExchangeResult<Vec<LiveOrder>> {
        self.inner.open_orders(market).await
    }

    async fn recent_trades(&self, limit: u32) -> ExchangeResult<Vec<TradeFill>> {
        self.inner.recent_trades(limit).await
    }
}
