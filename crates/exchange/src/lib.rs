pub mod circuit_breaker;
pub mod client;
pub mod dry_run;
pub mod gateway;
pub mod rate_limiter;
pub mod supply;
pub mod websocket;

pub use circuit_breaker::{BreakerSnapshot, BreakerState, CircuitBreaker};
pub use client::BlockyClient;
pub use dry_run::DryRunExchange;
pub use gateway::ExchangeGateway;
pub use rate_limiter::{LimiterStats, RequestLimiter};
pub use websocket::{endpoint_to_ws, BlockyWebSocket};
