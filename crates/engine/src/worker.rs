use crate::allocator::CapitalAllocator;
use crate::engine::{EngineContext, QuoteSnapshot};
use crate::pennying::{self, PennyInputs};
use crate::reconciler::{self, DiffTolerance};
use crate::spread::SpreadInputs;
use chrono::Utc;
use ironmaker_core::{
    round_tick, AlertCode, DesiredQuote, ExchangeError, ExchangeResult, LiveOrder, Market,
    QuoteSide, Side, TICK,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Placement failures in a row before an alert fires.
const PLACEMENT_FAILURE_ALERT: u32 = 3;

/// Why a market cycle was started. Periodic ticks and WebSocket events
/// run the same pipeline; the distinction only matters for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Periodic,
    Event,
}

/// Spawns the worker task for one market.
///
/// The capacity-1 channel is the serialization point: at most one cycle
/// runs at a time, at most one rerun is parked, and any further triggers
/// coalesce into the parked one. Dropping the sender stops the worker.
pub fn spawn(market: Market, ctx: Arc<EngineContext>) -> (mpsc::Sender<Trigger>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Trigger>(1);

    let handle = tokio::spawn(async move {
        let mut placement_failures: u32 = 0;
        while let Some(trigger) = rx.recv().await {
            tracing::debug!(market = %market.id, ?trigger, "cycle start");
            match run_cycle(&market, &ctx, &mut placement_failures).await {
                Ok(()) => {}
                Err(ExchangeError::CircuitOpen { retry_in }) => {
                    tracing::debug!(market = %market.id, ?retry_in, "cycle blocked, circuit open");
                    ctx.alerts.warning(
                        AlertCode::CircuitOpen,
                        format!("circuit breaker open, retrying in {retry_in:?}"),
                        Some(market.id.clone()),
                    );
                }
                Err(ExchangeError::Stale(reason)) => {
                    tracing::warn!(market = %market.id, reason, "cycle skipped, stale data");
                }
                Err(err) => {
                    ctx.metrics.inc_errors();
                    tracing::warn!(market = %market.id, error = %err, "cycle failed");
                }
            }
        }
        tracing::debug!(market = %market.id, "worker stopped");
    });

    (tx, handle)
}

/// One full decision-and-execution cycle for a market: fair price, spread,
/// pennying, allocation, diff, then cancels before placements.
pub(crate) async fn run_cycle(
    market: &Market,
    ctx: &EngineContext,
    placement_failures: &mut u32,
) -> ExchangeResult<()> {
    ctx.metrics.inc_cycles();
    let trading = &ctx.config.trading;

    let fair = ctx.price_model.fair_price(&market.id).await?;
    if fair.stale {
        ctx.alerts.warning(
            AlertCode::StaleData,
            "serving fair price from an expired supply metric",
            Some(market.id.clone()),
        );
    }

    let wallet = ctx.wallet.read().await.clone();
    let all_open = ctx.exchange.open_orders(None).await?;

    // Iron committed to resting bids in any market still counts as capital
    let locked_iron: f64 = all_open
        .iter()
        .filter(|o| o.side == Side::Buy)
        .map(|o| o.price * o.quantity)
        .sum();
    let total_capital = wallet.iron() + locked_iron;

    let live: Vec<LiveOrder> = all_open
        .into_iter()
        .filter(|o| o.market == market.id)
        .collect();

    let desired = match ctx
        .allocator
        .order_value(total_capital, ctx.markets.len(), market)
    {
        Some(value) => {
            build_quote(market, ctx, fair.price, value, &wallet, &live).await?
        }
        None => {
            tracing::debug!(market = %market.id, "allocation below floor, standing down");
            DesiredQuote {
                market: market.id.clone(),
                buy: None,
                sell: None,
            }
        }
    };

    let plan = reconciler::diff(
        &desired,
        &live,
        &DiffTolerance {
            price: trading.min_spread_ticks,
            quantity: trading.quantity_tolerance,
        },
    );

    for order in &plan.cancels {
        match ctx.exchange.cancel_order(order.order_id).await {
            Ok(()) => ctx.metrics.inc_orders_cancelled(),
            Err(err) if err.is_order_not_open() => {
                tracing::debug!(order_id = order.order_id, "cancel raced with a fill");
            }
            // unconfirmed cancel: placing now could double exposure
            Err(err) => return Err(err),
        }
    }

    // funds freed by cancelled bids are spendable again this cycle
    let freed: f64 = plan
        .cancels
        .iter()
        .filter(|o| o.side == Side::Buy)
        .map(|o| o.price * o.quantity)
        .sum();
    let mut available = wallet.iron() + freed;

    for request in &plan.places {
        if request.side == Side::Buy {
            let cost = request.price * request.quantity;
            if cost > available {
                tracing::debug!(
                    market = %request.market,
                    cost,
                    available,
                    "bid skipped, not enough free Iron"
                );
                continue;
            }
            available -= cost;
        }
        match ctx.exchange.place_order(request).await {
            Ok(order_id) => {
                ctx.metrics.inc_orders_placed();
                *placement_failures = 0;
                tracing::info!(
                    market = %request.market,
                    side = %request.side,
                    price = request.price,
                    quantity = request.quantity,
                    order_id,
                    "order placed"
                );
            }
            Err(err) if err.is_insufficient_funds() => {
                ctx.alerts.warning(
                    AlertCode::InsufficientFunds,
                    format!("placement rejected: {err}"),
                    Some(market.id.clone()),
                );
                break;
            }
            Err(err) => {
                *placement_failures += 1;
                if *placement_failures >= PLACEMENT_FAILURE_ALERT {
                    ctx.alerts.error(
                        AlertCode::PlacementFailure,
                        format!("{} placements failed in a row: {err}", *placement_failures),
                        Some(market.id.clone()),
                    );
                }
                return Err(err);
            }
        }
    }

    ctx.quotes.write().await.insert(
        market.id.clone(),
        QuoteSnapshot {
            market: market.id.clone(),
            fair_price: fair.price,
            stale: fair.stale,
            desired,
            live,
            updated_at: Utc::now(),
        },
    );

    Ok(())
}

/// Runs the pricing pipeline for one market and returns the quote the
/// book should converge to.
async fn build_quote(
    market: &Market,
    ctx: &EngineContext,
    fair_price: f64,
    order_value: f64,
    wallet: &ironmaker_core::WalletSnapshot,
    live: &[LiveOrder],
) -> ExchangeResult<DesiredQuote> {
    let trading = &ctx.config.trading;
    // inventory committed to our own resting asks is still ours
    let locked_base: f64 = live
        .iter()
        .filter(|o| o.side == Side::Sell)
        .map(|o| o.quantity)
        .sum();
    let held = wallet.balance(market.id.base()) + locked_base;
    let neutral_target = order_value / fair_price;

    let (buy_spread, sell_spread) = ctx.spread.spread(
        &market.id,
        &SpreadInputs {
            held_inventory: held,
            neutral_target,
        },
    );
    let mut buy_price = round_tick(fair_price * (1.0 - buy_spread));
    let mut sell_price = round_tick(fair_price * (1.0 + sell_spread));

    let ticker = ctx.exchange.ticker(&market.id).await?;
    if let Some(last) = ticker.last {
        ctx.spread.record_close(&market.id, Utc::now(), last);
    }

    let own_best_bid = live
        .iter()
        .filter(|o| o.side == Side::Buy)
        .map(|o| o.price)
        .fold(None, |best: Option<f64>, p| Some(best.map_or(p, |b| b.max(p))));
    let own_best_ask = live
        .iter()
        .filter(|o| o.side == Side::Sell)
        .map(|o| o.price)
        .fold(None, |best: Option<f64>, p| Some(best.map_or(p, |b| b.min(p))));

    (buy_price, sell_price) = pennying::adjust(
        buy_price,
        sell_price,
        &PennyInputs {
            fair_price,
            best_bid: ticker.bid,
            best_ask: ticker.ask,
            own_best_bid,
            own_best_ask,
        },
        TICK,
        trading.min_margin_ratio,
    );
    (buy_price, sell_price) =
        pennying::enforce_min_spread(buy_price, sell_price, trading.min_spread_ticks, TICK);

    let buy = CapitalAllocator::quantity(order_value, buy_price, trading.max_quantity).map(
        |quantity| QuoteSide {
            price: buy_price,
            quantity,
        },
    );

    let sell = CapitalAllocator::quantity(order_value, sell_price, trading.max_quantity)
        .map(|quantity| round_tick(quantity.min(held)))
        .filter(|quantity| *quantity >= ironmaker_core::MIN_UNIT)
        .map(|quantity| QuoteSide {
            price: sell_price,
            quantity,
        });

    Ok(DesiredQuote {
        market: market.id.clone(),
        buy,
        sell,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{context_with, wallet, MockExchange};
    use ironmaker_core::MarketId;

    fn diam() -> Market {
        Market::new(MarketId::new("diam_iron"))
    }

    async fn seeded_context() -> (Arc<MockExchange>, Arc<EngineContext>) {
        let mock = Arc::new(MockExchange::new());
        let ctx = context_with(mock.clone(), &["diam_iron"]);
        // base 50, half depleted: fair price 100
        mock.set_supply(&diam().id, 1000.0, 500.0);
        *ctx.wallet.write().await = wallet(&[("iron", 500.0), ("diam", 10.0)]);
        (mock, ctx)
    }

    /// Mirrors the exchange ledger: Iron and items committed to resting
    /// orders are moved out of the free balances.
    async fn lock_resting_funds(
        mock: &MockExchange,
        ctx: &EngineContext,
        initial: &[(&str, f64)],
    ) {
        let mut snapshot = wallet(initial);
        for order in mock.orders() {
            match order.side {
                Side::Buy => {
                    *snapshot.balances.entry("iron".to_string()).or_default() -=
                        order.price * order.quantity;
                }
                Side::Sell => {
                    *snapshot
                        .balances
                        .entry(order.market.base().to_string())
                        .or_default() -= order.quantity;
                }
            }
        }
        *ctx.wallet.write().await = snapshot;
    }

    fn ids(orders: &[LiveOrder]) -> Vec<u64> {
        orders.iter().map(|o| o.order_id).collect()
    }

    #[tokio::test]
    async fn cycle_places_a_two_sided_quote() {
        let (mock, ctx) = seeded_context().await;
        let mut failures = 0;

        run_cycle(&diam(), &ctx, &mut failures).await.unwrap();

        let orders = mock.orders();
        assert_eq!(orders.len(), 2);
        let buy = orders.iter().find(|o| o.side == Side::Buy).unwrap();
        let sell = orders.iter().find(|o| o.side == Side::Sell).unwrap();
        assert!(buy.price < 100.0);
        assert!(sell.price > 100.0);
        assert!(sell.price > buy.price);
        // sell side is bounded by held inventory
        assert!(sell.quantity <= 10.0);
        assert_eq!(ctx.metrics.snapshot().orders_placed, 2);
    }

    #[tokio::test]
    async fn converged_book_is_left_alone() {
        let (mock, ctx) = seeded_context().await;
        let mut failures = 0;

        run_cycle(&diam(), &ctx, &mut failures).await.unwrap();
        let before = mock.orders();
        lock_resting_funds(&mock, &ctx, &[("iron", 500.0), ("diam", 10.0)]).await;

        run_cycle(&diam(), &ctx, &mut failures).await.unwrap();

        assert_eq!(ids(&before), ids(&mock.orders()));
        assert_eq!(ctx.metrics.snapshot().orders_cancelled, 0);
    }

    #[tokio::test]
    async fn converged_books_across_markets_are_left_alone() {
        let mock = Arc::new(MockExchange::new());
        let ctx = context_with(mock.clone(), &["diam_iron", "gold_iron"]);
        let gold = Market::new(MarketId::new("gold_iron"));
        mock.set_supply(&diam().id, 1000.0, 500.0);
        mock.set_supply(&gold.id, 1000.0, 500.0);
        let initial = [("iron", 500.0), ("diam", 10.0), ("gold", 50.0)];
        *ctx.wallet.write().await = wallet(&initial);

        let mut failures = 0;
        run_cycle(&diam(), &ctx, &mut failures).await.unwrap();
        lock_resting_funds(&mock, &ctx, &initial).await;
        run_cycle(&gold, &ctx, &mut failures).await.unwrap();
        lock_resting_funds(&mock, &ctx, &initial).await;

        let before = mock.orders();
        assert_eq!(before.len(), 4);

        // every market sees the same total capital it saw before, so the
        // second pass must not touch a single order
        run_cycle(&diam(), &ctx, &mut failures).await.unwrap();
        run_cycle(&gold, &ctx, &mut failures).await.unwrap();

        assert_eq!(ids(&before), ids(&mock.orders()));
        assert_eq!(ctx.metrics.snapshot().orders_cancelled, 0);
    }

    #[tokio::test]
    async fn resting_sell_survives_base_being_locked() {
        let (mock, ctx) = seeded_context().await;
        let mut failures = 0;

        run_cycle(&diam(), &ctx, &mut failures).await.unwrap();
        let before: Vec<LiveOrder> = mock
            .orders()
            .into_iter()
            .filter(|o| o.side == Side::Sell)
            .collect();
        assert_eq!(before.len(), 1);

        // the exchange debits diam held by the resting ask
        lock_resting_funds(&mock, &ctx, &[("iron", 500.0), ("diam", 10.0)]).await;
        run_cycle(&diam(), &ctx, &mut failures).await.unwrap();

        let after: Vec<LiveOrder> = mock
            .orders()
            .into_iter()
            .filter(|o| o.side == Side::Sell)
            .collect();
        assert_eq!(before[0].order_id, after[0].order_id);
        assert!((before[0].quantity - after[0].quantity).abs() < 1e-9);
    }

    #[tokio::test]
    async fn starved_allocation_cancels_everything() {
        let mock = Arc::new(MockExchange::new());
        let ctx = context_with(mock.clone(), &["diam_iron"]);
        mock.set_supply(&diam().id, 1000.0, 500.0);
        *ctx.wallet.write().await = wallet(&[("iron", 0.05)]);
        mock.push_order(LiveOrder {
            market: diam().id,
            side: Side::Sell,
            price: 101.0,
            quantity: 2.0,
            order_id: 9,
        });

        let mut failures = 0;
        run_cycle(&diam(), &ctx, &mut failures).await.unwrap();
        assert!(mock.orders().is_empty());
        assert_eq!(ctx.metrics.snapshot().orders_cancelled, 1);
    }

    #[tokio::test]
    async fn insufficient_funds_is_not_a_cycle_error() {
        let (mock, ctx) = seeded_context().await;
        mock.set_place_error(Some(ironmaker_core::CODE_INSUFFICIENT_FUNDS));
        let mut failures = 0;

        run_cycle(&diam(), &ctx, &mut failures).await.unwrap();
        assert!(mock.orders().is_empty());
        assert_eq!(failures, 0);
    }

    #[tokio::test]
    async fn transport_failures_on_placement_count_up() {
        let (mock, ctx) = seeded_context().await;
        mock.set_place_error(Some(502));
        let mut failures = 0;

        assert!(run_cycle(&diam(), &ctx, &mut failures).await.is_err());
        assert_eq!(failures, 1);
    }

    #[tokio::test]
    async fn flooded_triggers_coalesce_into_one_pending_cycle() {
        let (mock, ctx) = seeded_context().await;
        let (tx, handle) = spawn(diam(), ctx.clone());

        // current-thread runtime: the worker task has not run yet, so the
        // capacity-1 channel admits one trigger and drops the rest
        let accepted = (0..10).filter(|_| tx.try_send(Trigger::Event).is_ok()).count();
        assert_eq!(accepted, 1);

        drop(tx);
        handle.await.unwrap();

        assert_eq!(ctx.metrics.snapshot().cycles, 1);
        assert_eq!(mock.orders().len(), 2);
    }

    #[tokio::test]
    async fn quotes_snapshot_is_published() {
        let (_mock, ctx) = seeded_context().await;
        let mut failures = 0;
        run_cycle(&diam(), &ctx, &mut failures).await.unwrap();

        let quotes = ctx.quotes.read().await;
        let snap = quotes.get(&diam().id).unwrap();
        assert!((snap.fair_price - 100.0).abs() < 1e-9);
        assert!(snap.desired.buy.is_some());
        assert!(snap.desired.sell.is_some());
    }
}
