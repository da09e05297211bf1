use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub trading: TradingConfig,
    pub dynamic_spread: DynamicSpreadConfig,
    pub capital_allocation: CapitalAllocationConfig,
    pub price_model: PriceModelConfig,
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub alerts: AlertsConfig,
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://craft.blocky.com.br/api/v1".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub dry_run: bool,
    pub enabled_markets: Vec<String>,
    pub disabled_markets: Vec<String>,
    /// Fixed spread ratio used when dynamic spread is disabled.
    pub spread: f64,
    /// Minimum sell − buy gap, in price units.
    pub min_spread_ticks: f64,
    /// Quantity difference tolerated before an order is re-placed.
    pub quantity_tolerance: f64,
    /// Minimum profit margin from fair price preserved when pennying.
    pub min_margin_ratio: f64,
    /// Flat per-market order value when capital allocation is disabled.
    pub target_value: f64,
    pub max_quantity: f64,
    /// Seconds between full periodic reconciliation passes.
    pub refresh_interval: u64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            enabled_markets: Vec::new(),
            disabled_markets: Vec::new(),
            spread: 0.05,
            min_spread_ticks: 0.01,
            quantity_tolerance: 0.01,
            min_margin_ratio: 0.01,
            target_value: 10.0,
            max_quantity: 6400.0,
            refresh_interval: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicSpreadConfig {
    pub enabled: bool,
    pub base_spread: f64,
    pub volatility_multiplier: f64,
    pub inventory_impact: f64,
    pub min_spread: f64,
    pub max_spread: f64,
    /// Hours of close-price samples retained for volatility.
    pub volatility_window: u32,
}

impl Default for DynamicSpreadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_spread: 0.03,
            volatility_multiplier: 2.0,
            inventory_impact: 0.02,
            min_spread: 0.01,
            max_spread: 0.15,
            volatility_window: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapitalAllocationConfig {
    pub enabled: bool,
    pub base_reserve_ratio: f64,
    pub max_reserve_ratio: f64,
    pub min_order_value: f64,
    pub priority_markets: Vec<String>,
    pub priority_boost: f64,
}

impl Default for CapitalAllocationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_reserve_ratio: 0.10,
            max_reserve_ratio: 0.30,
            min_order_value: 0.10,
            priority_markets: Vec::new(),
            priority_boost: 1.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceModelConfig {
    /// Seconds a supply metric stays fresh before refetch.
    pub cache_ttl: u64,
    /// Per-market intrinsic value at zero depletion.
    pub base_prices: HashMap<String, f64>,
}

impl Default for PriceModelConfig {
    fn default() -> Self {
        let base_prices = [
            ("diam_iron", 50.0),
            ("gold_iron", 5.0),
            ("lapi_iron", 2.0),
            ("redd_iron", 1.0),
            ("coal_iron", 0.5),
            ("ston_iron", 0.1),
            ("cobl_iron", 0.05),
            ("dirt_iron", 0.01),
            ("sand_iron", 0.05),
            ("olog_iron", 0.45),
            ("obsn_iron", 2.5),
            ("slme_iron", 5.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            cache_ttl: 60,
            base_prices,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_seconds: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window_seconds: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: f64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    /// `discord`, `slack`, or `custom`.
    pub webhook_type: String,
    pub min_level: String,
    /// Seconds between repeats of the same alert code.
    pub rate_limit_seconds: f64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook_url: None,
            webhook_type: "discord".to_string(),
            min_level: "warning".to_string(),
            rate_limit_seconds: 60.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    pub addr: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl AppConfig {
    /// Checks the invariants that must hold before the engine starts.
    /// Violations are fatal at startup only; nothing here can fail mid-run.
    ///
    /// # Errors
    /// Returns an error describing the first invalid setting found.
    pub fn validate(&self) -> Result<()> {
        if !self.trading.dry_run && self.api.api_key.as_deref().unwrap_or("").is_empty() {
            bail!("api.api_key is required unless trading.dry_run is set");
        }
        if self.trading.refresh_interval == 0 {
            bail!("trading.refresh_interval must be at least 1 second");
        }
        if self.trading.min_spread_ticks <= 0.0 {
            bail!("trading.min_spread_ticks must be positive");
        }
        if self.dynamic_spread.min_spread > self.dynamic_spread.max_spread {
            bail!(
                "dynamic_spread.min_spread ({}) exceeds max_spread ({})",
                self.dynamic_spread.min_spread,
                self.dynamic_spread.max_spread
            );
        }
        if self.capital_allocation.base_reserve_ratio > self.capital_allocation.max_reserve_ratio {
            bail!("capital_allocation.base_reserve_ratio exceeds max_reserve_ratio");
        }
        if self.rate_limit.max_requests == 0 {
            bail!("rate_limit.max_requests must be at least 1");
        }
        if self.rate_limit.window_seconds <= 0.0 {
            bail!("rate_limit.window_seconds must be positive");
        }
        if self.circuit_breaker.failure_threshold == 0 {
            bail!("circuit_breaker.failure_threshold must be at least 1");
        }
        for (market, price) in &self.price_model.base_prices {
            if !market.contains('_') {
                bail!("price_model.base_prices key '{market}' is not a market id");
            }
            if *price <= 0.0 {
                bail!("price_model.base_prices['{market}'] must be positive");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dry_run_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.trading.dry_run = true;
        config
    }

    #[test]
    fn default_config_validates_in_dry_run() {
        assert!(dry_run_config().validate().is_ok());
    }

    #[test]
    fn live_mode_requires_api_key() {
        let config = AppConfig::default();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.api.api_key = Some("k".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bad_base_price_mapping_is_fatal() {
        let mut config = dry_run_config();
        config
            .price_model
            .base_prices
            .insert("notamarket".to_string(), 1.0);
        assert!(config.validate().is_err());

        let mut config = dry_run_config();
        config
            .price_model
            .base_prices
            .insert("diam_iron".to_string(), -1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_spread_bounds_are_fatal() {
        let mut config = dry_run_config();
        config.dynamic_spread.min_spread = 0.2;
        config.dynamic_spread.max_spread = 0.1;
        assert!(config.validate().is_err());
    }
}
