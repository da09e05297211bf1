use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Minimum price increment recognized by the exchange.
pub const TICK: f64 = 0.01;

/// Smallest tradable quantity.
pub const MIN_UNIT: f64 = 0.01;

/// Rounds a price or quantity to the exchange's two-decimal grid.
#[must_use]
pub fn round_tick(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Market identifier in `base_quote` form, e.g. `diam_iron`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketId(String);

impl MarketId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base asset symbol (the traded item).
    #[must_use]
    pub fn base(&self) -> &str {
        self.0.split_once('_').map_or(self.0.as_str(), |(b, _)| b)
    }

    /// Quote asset symbol (the pricing currency, normally `iron`).
    #[must_use]
    pub fn quote(&self) -> &str {
        self.0.split_once('_').map_or("iron", |(_, q)| q)
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MarketId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A tradable market with its runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    pub enabled: bool,
    pub priority: bool,
}

impl Market {
    #[must_use]
    pub fn new(id: MarketId) -> Self {
        Self {
            id,
            enabled: true,
            priority: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Best bid/ask snapshot for a market.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ticker {
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last: Option<f64>,
}

/// One OHLCV sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Supply scarcity reading for a market's base asset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SupplyMetric {
    pub total: f64,
    pub remaining: f64,
}

/// An order resting on the exchange, mirrored locally by the reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveOrder {
    pub market: MarketId,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub order_id: u64,
}

/// A cancel/place intent sent to the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub market: MarketId,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
}

/// One side of a desired quote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteSide {
    pub price: f64,
    pub quantity: f64,
}

/// The pipeline's output for one market and one cycle. A side is `None`
/// when funds or inventory do not cover it this cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesiredQuote {
    pub market: MarketId,
    pub buy: Option<QuoteSide>,
    pub sell: Option<QuoteSide>,
}

impl DesiredQuote {
    #[must_use]
    pub const fn side(&self, side: Side) -> Option<QuoteSide> {
        match side {
            Side::Buy => self.buy,
            Side::Sell => self.sell,
        }
    }
}

/// A fill reported by the exchange (our order traded).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeFill {
    pub trade_id: u64,
    pub market: MarketId,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub timestamp: DateTime<Utc>,
}

/// Wallet balances as of one authoritative read. Treated as a snapshot for
/// the cycle; never read-modify-written against the exchange ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub balances: HashMap<String, f64>,
    pub fetched_at: DateTime<Utc>,
}

impl Default for WalletSnapshot {
    fn default() -> Self {
        Self {
            balances: HashMap::new(),
            fetched_at: Utc::now(),
        }
    }
}

impl WalletSnapshot {
    #[must_use]
    pub fn balance(&self, instrument: &str) -> f64 {
        self.balances.get(instrument).copied().unwrap_or(0.0)
    }

    /// Balance of the quote currency shared across all markets.
    #[must_use]
    pub fn iron(&self) -> f64 {
        self.balance("iron")
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_id_splits_base_and_quote() {
        let m = MarketId::new("diam_iron");
        assert_eq!(m.base(), "diam");
        assert_eq!(m.quote(), "iron");
    }

    #[test]
    fn market_id_without_separator_defaults_quote_to_iron() {
        let m = MarketId::new("diam");
        assert_eq!(m.base(), "diam");
        assert_eq!(m.quote(), "iron");
    }

    #[test]
    fn round_tick_snaps_to_two_decimals() {
        assert!((round_tick(1.005) - 1.01).abs() < 1e-9);
        assert!((round_tick(0.014_999) - 0.01).abs() < 1e-9);
    }

    #[test]
    fn wallet_snapshot_missing_instrument_is_zero() {
        let w = WalletSnapshot::default();
        assert!((w.iron() - 0.0).abs() < f64::EPSILON);
    }
}
