use ironmaker_core::{round_tick, CapitalAllocationConfig, Market, MIN_UNIT};

/// Splits deployable Iron across markets with a dynamic reserve.
///
/// `reserve_ratio = clamp(base + n/100, base, max)` so every ten markets
/// add one percent of reserve. Priority markets draw a boosted share.
pub struct CapitalAllocator {
    config: CapitalAllocationConfig,
    /// Flat per-market value used when allocation is disabled.
    flat_target: f64,
}

impl CapitalAllocator {
    pub fn new(config: CapitalAllocationConfig, flat_target: f64) -> Self {
        Self {
            config,
            flat_target,
        }
    }

    #[must_use]
    pub fn reserve_ratio(&self, num_markets: usize) -> f64 {
        let dynamic = self.config.base_reserve_ratio + num_markets as f64 / 100.0;
        dynamic.clamp(
            self.config.base_reserve_ratio,
            self.config.max_reserve_ratio,
        )
    }

    /// Iron value to deploy per order in `market`, or `None` when the
    /// share falls below the minimum order value and the market should be
    /// skipped this cycle.
    #[must_use]
    pub fn order_value(
        &self,
        total_capital: f64,
        num_markets: usize,
        market: &Market,
    ) -> Option<f64> {
        if !self.config.enabled {
            return Some(self.flat_target);
        }
        if total_capital <= 0.0 || num_markets == 0 {
            return None;
        }

        let deployable = total_capital * (1.0 - self.reserve_ratio(num_markets));
        let mut value = deployable / num_markets as f64;
        if market.priority || self.config.priority_markets.contains(&market.id.to_string()) {
            value *= self.config.priority_boost;
        }

        (value >= self.config.min_order_value).then_some(value)
    }

    /// Converts an Iron value into an order quantity at `price`, capped at
    /// `max_quantity` and floored at the minimum tradable unit.
    #[must_use]
    pub fn quantity(value: f64, price: f64, max_quantity: f64) -> Option<f64> {
        if price <= 0.0 {
            return None;
        }
        let quantity = round_tick((value / price).min(max_quantity));
        (quantity >= MIN_UNIT).then_some(quantity)
    }
}
