use ironmaker_core::{
    ExchangeClient, ExchangeError, ExchangeResult, MarketId, PriceModelConfig, SupplyMetric,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Scarcity multipliers beyond this are treated as estimation error in the
/// total-supply figure rather than genuine scarcity.
const MAX_SCARCITY_MULTIPLIER: f64 = 20.0;

/// Metrics failures in a row before the model reports unhealthy.
const UNHEALTHY_FAILURES: u32 = 3;

#[derive(Debug, Clone, Copy)]
pub struct FairPrice {
    pub price: f64,
    /// True when the backing supply metric is past its TTL and a refetch
    /// failed, so the price was computed from the last known value.
    pub stale: bool,
}

#[derive(Default)]
struct CacheEntry {
    metric: Option<SupplyMetric>,
    fetched_at: Option<Instant>,
}

/// Fair-price model: `base_price × (total / remaining)` from supply
/// scarcity, with a per-market TTL cache.
///
/// Each market's cache entry sits behind its own async mutex, so workers
/// racing on the same expired entry coalesce into a single refetch while
/// other markets proceed independently.
pub struct PriceModel {
    exchange: Arc<dyn ExchangeClient>,
    base_prices: HashMap<String, f64>,
    cache_ttl: Duration,
    entries: std::sync::Mutex<HashMap<MarketId, Arc<Mutex<CacheEntry>>>>,
    consecutive_failures: AtomicU32,
}

impl PriceModel {
    pub fn new(exchange: Arc<dyn ExchangeClient>, config: &PriceModelConfig) -> Self {
        Self {
            exchange,
            base_prices: config.base_prices.clone(),
            cache_ttl: Duration::from_secs(config.cache_ttl),
            entries: std::sync::Mutex::new(HashMap::new()),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    fn entry(&self, market: &MarketId) -> Arc<Mutex<CacheEntry>> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries
            .entry(market.clone())
            .or_insert_with(|| Arc::new(Mutex::new(CacheEntry::default())))
            .clone()
    }

    /// Computes the fair price for a market, refetching the supply metric
    /// when the cached one has expired.
    ///
    /// # Errors
    /// Returns `ExchangeError::Stale` when the market has no configured
    /// base price, or the refetch error itself when there is no cached
    /// metric to fall back on.
    pub async fn fair_price(&self, market: &MarketId) -> ExchangeResult<FairPrice> {
        let base = *self
            .base_prices
            .get(market.as_str())
            .ok_or_else(|| ExchangeError::Stale(format!("no base price for {market}")))?;

        let entry = self.entry(market);
        let mut entry = entry.lock().await;

        let fresh = entry
            .fetched_at
            .is_some_and(|at| at.elapsed() < self.cache_ttl);
        let mut stale = false;

        if !fresh {
            match self.exchange.supply_metric(market).await {
                Ok(metric) => {
                    entry.metric = Some(metric);
                    entry.fetched_at = Some(Instant::now());
                    self.consecutive_failures.store(0, Ordering::Relaxed);
                }
                Err(err) => {
                    self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                    if entry.metric.is_some() {
                        tracing::warn!(%market, error = %err, "supply refetch failed, serving cached metric");
                        stale = true;
                    } else {
                        return Err(err);
                    }
                }
            }
        }

        let Some(metric) = entry.metric else {
            return Err(ExchangeError::Stale(format!("no supply metric for {market}")));
        };

        Ok(FairPrice {
            price: Self::compute(base, metric),
            stale,
        })
    }

    fn compute(base: f64, metric: SupplyMetric) -> f64 {
        let remaining = metric.remaining.max(1.0);
        let multiplier = (metric.total / remaining).min(MAX_SCARCITY_MULTIPLIER);
        base * multiplier
    }

    /// False once metrics fetches have failed several times in a row.
    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures.load(Ordering::Relaxed) < UNHEALTHY_FAILURES
    }
}
