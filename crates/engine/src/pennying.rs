//! Price-improvement ("pennying") adjustments applied after the spread
//! quote, plus the final minimum-spread guard.
//!
//! All functions here are pure; the worker wires them into the pipeline.

use ironmaker_core::round_tick;

/// Order book context for one pennying pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct PennyInputs {
    pub fair_price: f64,
    /// Best competing bid on the book, if any.
    pub best_bid: Option<f64>,
    /// Best competing ask on the book, if any.
    pub best_ask: Option<f64>,
    /// Our own best resting bid, used to recognize ourselves on the book.
    pub own_best_bid: Option<f64>,
    /// Our own best resting ask.
    pub own_best_ask: Option<f64>,
}

fn is_own(best: f64, own: Option<f64>, tick: f64) -> bool {
    own.is_some_and(|o| (o - best).abs() < tick / 2.0)
}

/// Improves on strictly better competing quotes by one tick while
/// preserving the margin floor around the fair price. A competitor tied
/// with our quote is left alone.
///
/// If the improved pair would invert or close below one tick, the whole
/// adjustment is skipped and the spread-derived prices stand: never
/// quoting crossed is worth more than winning queue position. A best
/// quote that is our own resting order is snapped to, not pennied, so we
/// do not undercut ourselves into a cancel/replace loop.
#[must_use]
pub fn adjust(
    buy: f64,
    sell: f64,
    inputs: &PennyInputs,
    tick: f64,
    min_margin_ratio: f64,
) -> (f64, f64) {
    let max_buy = inputs.fair_price * (1.0 - min_margin_ratio);
    let min_sell = inputs.fair_price * (1.0 + min_margin_ratio);

    let mut new_buy = buy;
    if let Some(bid) = inputs.best_bid {
        if is_own(bid, inputs.own_best_bid, tick) {
            new_buy = bid;
        } else if bid > new_buy {
            new_buy = (bid + tick).min(max_buy);
        }
    }

    let mut new_sell = sell;
    if let Some(ask) = inputs.best_ask {
        if is_own(ask, inputs.own_best_ask, tick) {
            new_sell = ask;
        } else if ask < new_sell {
            new_sell = (ask - tick).max(min_sell);
        }
    }

    let new_buy = round_tick(new_buy);
    let new_sell = round_tick(new_sell);

    if new_sell - new_buy < tick - 1e-9 {
        return (round_tick(buy), round_tick(sell));
    }
    (new_buy, new_sell)
}

/// Final guard: guarantees `sell − buy >= min_gap` by lowering the buy
/// first, then raising the sell if the buy hit its floor of one tick.
#[must_use]
pub fn enforce_min_spread(buy: f64, sell: f64, min_gap: f64, tick: f64) -> (f64, f64) {
    if sell - buy >= min_gap - 1e-9 {
        return (buy, sell);
    }
    let mut new_buy = round_tick(sell - min_gap);
    let mut new_sell = sell;
    if new_buy < tick {
        new_buy = tick;
        new_sell = round_tick(new_buy + min_gap);
    }
    (new_buy, new_sell)
}
