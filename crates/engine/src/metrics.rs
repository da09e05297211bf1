use ironmaker_core::{MarketId, Side, TradeFill};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default, Clone, Copy)]
struct PnlBook {
    position: f64,
    avg_cost: f64,
    realized: f64,
}

impl PnlBook {
    /// Average-cost accounting. Sells beyond the tracked position realize
    /// nothing for the untracked part (inventory acquired before startup).
    fn apply(&mut self, side: Side, price: f64, quantity: f64) {
        match side {
            Side::Buy => {
                let new_position = self.position + quantity;
                if new_position > 0.0 {
                    self.avg_cost =
                        (self.avg_cost * self.position.max(0.0) + price * quantity) / new_position;
                }
                self.position = new_position;
            }
            Side::Sell => {
                let closed = quantity.min(self.position.max(0.0));
                self.realized += (price - self.avg_cost) * closed;
                self.position -= quantity;
            }
        }
    }
}

/// Cumulative engine counters plus realized P&L per market.
#[derive(Default)]
pub struct Metrics {
    orders_placed: AtomicU64,
    orders_cancelled: AtomicU64,
    trades: AtomicU64,
    cycles: AtomicU64,
    errors: AtomicU64,
    pnl: std::sync::Mutex<HashMap<MarketId, PnlBook>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub orders_placed: u64,
    pub orders_cancelled: u64,
    pub total_trades: u64,
    pub cycles: u64,
    pub errors: u64,
    pub realized_pnl: f64,
    pub pnl_by_market: HashMap<String, f64>,
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_orders_placed(&self) {
        self.orders_placed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_orders_cancelled(&self) {
        self.orders_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cycles(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fill(&self, fill: &TradeFill) {
        self.trades.fetch_add(1, Ordering::Relaxed);
        let mut pnl = self
            .pnl
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        pnl.entry(fill.market.clone())
            .or_default()
            .apply(fill.side, fill.price, fill.quantity);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let pnl = self
            .pnl
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let pnl_by_market: HashMap<String, f64> = pnl
            .iter()
            .map(|(market, book)| (market.to_string(), book.realized))
            .collect();

        MetricsSnapshot {
            orders_placed: self.orders_placed.load(Ordering::Relaxed),
            orders_cancelled: self.orders_cancelled.load(Ordering::Relaxed),
            total_trades: self.trades.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            realized_pnl: pnl.values().map(|b| b.realized).sum(),
            pnl_by_market,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fill(side: Side, price: f64, quantity: f64) -> TradeFill {
        TradeFill {
            trade_id: 0,
            market: MarketId::new("diam_iron"),
            side,
            price,
            quantity,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn buy_then_sell_realizes_the_difference() {
        let metrics = Metrics::new();
        metrics.record_fill(&fill(Side::Buy, 48.0, 2.0));
        metrics.record_fill(&fill(Side::Sell, 52.0, 2.0));

        let snap = metrics.snapshot();
        assert_eq!(snap.total_trades, 2);
        assert!((snap.realized_pnl - 8.0).abs() < 1e-9);
    }

    #[test]
    fn average_cost_blends_multiple_buys() {
        let metrics = Metrics::new();
        metrics.record_fill(&fill(Side::Buy, 40.0, 1.0));
        metrics.record_fill(&fill(Side::Buy, 60.0, 1.0));
        metrics.record_fill(&fill(Side::Sell, 55.0, 2.0));

        // avg cost 50, sold 2 at 55
        let snap = metrics.snapshot();
        assert!((snap.realized_pnl - 10.0).abs() < 1e-9);
    }

    #[test]
    fn selling_untracked_inventory_realizes_nothing() {
        let metrics = Metrics::new();
        metrics.record_fill(&fill(Side::Sell, 55.0, 3.0));
        let snap = metrics.snapshot();
        assert!((snap.realized_pnl - 0.0).abs() < 1e-9);
    }
}
