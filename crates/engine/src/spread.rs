use chrono::{DateTime, Duration, Utc};
use ironmaker_core::{Candle, DynamicSpreadConfig, MarketId};
use std::collections::{HashMap, VecDeque};

/// Inventory context for one spread calculation.
#[derive(Debug, Clone, Copy)]
pub struct SpreadInputs {
    /// Units of the base asset currently held.
    pub held_inventory: f64,
    /// Inventory considered neutral, normally one allocated order's worth.
    pub neutral_target: f64,
}

/// Close prices within the volatility window, oldest first.
#[derive(Debug)]
struct VolatilityWindow {
    span: Duration,
    samples: VecDeque<(DateTime<Utc>, f64)>,
}

impl VolatilityWindow {
    fn new(hours: u32) -> Self {
        Self {
            span: Duration::hours(i64::from(hours.max(1))),
            samples: VecDeque::new(),
        }
    }

    fn record(&mut self, at: DateTime<Utc>, close: f64) {
        if close <= 0.0 {
            return;
        }
        self.samples.push_back((at, close));
        let cutoff = at - self.span;
        while self.samples.front().is_some_and(|(t, _)| *t < cutoff) {
            self.samples.pop_front();
        }
    }

    /// Coefficient of variation of the windowed closes; 0 with fewer than
    /// two samples.
    fn coefficient_of_variation(&self) -> f64 {
        let n = self.samples.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.samples.iter().map(|(_, c)| c).sum::<f64>() / n as f64;
        if mean <= 0.0 {
            return 0.0;
        }
        let variance = self
            .samples
            .iter()
            .map(|(_, c)| (c - mean).powi(2))
            .sum::<f64>()
            / n as f64;
        variance.sqrt() / mean
    }
}

/// Dynamic spread calculator.
///
/// `spread = base_spread + volatility_multiplier × cv ± inventory_adj`,
/// each side clamped to `[min_spread, max_spread]`. Overstock widens the
/// buy side and tightens the sell side; understock mirrors that.
pub struct SpreadCalculator {
    config: DynamicSpreadConfig,
    fallback_spread: f64,
    windows: std::sync::Mutex<HashMap<MarketId, VolatilityWindow>>,
}

impl SpreadCalculator {
    pub fn new(config: DynamicSpreadConfig, fallback_spread: f64) -> Self {
        Self {
            config,
            fallback_spread,
            windows: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn record_close(&self, market: &MarketId, at: DateTime<Utc>, close: f64) {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        windows
            .entry(market.clone())
            .or_insert_with(|| VolatilityWindow::new(self.config.volatility_window))
            .record(at, close);
    }

    /// Seeds the volatility window from historical candles at startup.
    pub fn seed_candles(&self, market: &MarketId, candles: &[Candle]) {
        for candle in candles {
            self.record_close(market, candle.timestamp, candle.close);
        }
    }

    /// Returns `(buy_spread, sell_spread)` as price ratios.
    pub fn spread(&self, market: &MarketId, inputs: &SpreadInputs) -> (f64, f64) {
        if !self.config.enabled {
            return (self.fallback_spread, self.fallback_spread);
        }

        let cv = {
            let windows = self
                .windows
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            windows
                .get(market)
                .map_or(0.0, VolatilityWindow::coefficient_of_variation)
        };

        let vol_adj = cv * self.config.volatility_multiplier;
        let imbalance = if inputs.neutral_target > 0.0 {
            (inputs.held_inventory / inputs.neutral_target - 1.0).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let inv_adj = imbalance * self.config.inventory_impact;

        let clamp = |s: f64| s.clamp(self.config.min_spread, self.config.max_spread);
        let buy = clamp(self.config.base_spread + vol_adj + inv_adj);
        let sell = clamp(self.config.base_spread + vol_adj - inv_adj);

        tracing::debug!(
            %market,
            cv,
            imbalance,
            buy_spread = buy,
            sell_spread = sell,
            "dynamic spread"
        );
        (buy, sell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator(enabled: bool) -> SpreadCalculator {
        SpreadCalculator::new(
            DynamicSpreadConfig {
                enabled,
                ..DynamicSpreadConfig::default()
            },
            0.05,
        )
    }

    fn neutral() -> SpreadInputs {
        SpreadInputs {
            held_inventory: 10.0,
            neutral_target: 10.0,
        }
    }

    #[test]
    fn disabled_returns_the_fixed_spread() {
        let calc = calculator(false);
        let (buy, sell) = calc.spread(&MarketId::new("diam_iron"), &neutral());
        assert!((buy - 0.05).abs() < 1e-9);
        assert!((sell - 0.05).abs() < 1e-9);
    }

    #[test]
    fn no_samples_means_base_spread_only() {
        let calc = calculator(true);
        let (buy, sell) = calc.spread(&MarketId::new("diam_iron"), &neutral());
        assert!((buy - 0.03).abs() < 1e-9);
        assert!((sell - 0.03).abs() < 1e-9);
    }

    #[test]
    fn volatility_widens_both_sides() {
        let calc = calculator(true);
        let market = MarketId::new("diam_iron");
        let now = Utc::now();
        for (i, close) in [50.0, 70.0, 40.0, 65.0].iter().enumerate() {
            calc.record_close(&market, now + Duration::minutes(i as i64), *close);
        }
        let (buy, sell) = calc.spread(&market, &neutral());
        assert!(buy > 0.03);
        assert!(sell > 0.03);
        assert!(buy <= 0.15 && sell <= 0.15);
    }

    #[test]
    fn overstock_widens_buy_and_tightens_sell() {
        let calc = calculator(true);
        let market = MarketId::new("diam_iron");
        let (buy, sell) = calc.spread(
            &market,
            &SpreadInputs {
                held_inventory: 30.0,
                neutral_target: 10.0,
            },
        );
        // imbalance clamps to +1: buy = base + impact, sell = base - impact
        assert!((buy - 0.05).abs() < 1e-9);
        assert!((sell - 0.01).abs() < 1e-9);
        assert!(buy > sell);
    }

    #[test]
    fn old_samples_are_evicted() {
        let calc = calculator(true);
        let market = MarketId::new("diam_iron");
        let now = Utc::now();
        calc.record_close(&market, now - Duration::hours(48), 10.0);
        calc.record_close(&market, now, 50.0);
        // the 48h-old sample fell out, one sample left, so cv is 0
        let (buy, _) = calc.spread(&market, &neutral());
        assert!((buy - 0.03).abs() < 1e-9);
    }
}
