pub mod config;
pub mod config_loader;
pub mod errors;
pub mod events;
pub mod traits;
pub mod types;

pub use config::{
    AlertsConfig, ApiConfig, AppConfig, CapitalAllocationConfig, CircuitBreakerConfig,
    DynamicSpreadConfig, HealthConfig, PriceModelConfig, RateLimitConfig, TradingConfig,
};
pub use config_loader::ConfigLoader;
pub use errors::{ExchangeError, ExchangeResult, CODE_INSUFFICIENT_FUNDS, CODE_ORDER_NOT_OPEN};
pub use events::{AlertCode, AlertEvent, AlertSeverity, MarketEvent};
pub use traits::ExchangeClient;
pub use types::{
    round_tick, Candle, DesiredQuote, LiveOrder, Market, MarketId, OrderRequest, QuoteSide, Side,
    SupplyMetric, Ticker, TradeFill, WalletSnapshot, MIN_UNIT, TICK,
};
